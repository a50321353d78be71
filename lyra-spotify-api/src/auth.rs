//! Refresh-token exchange against the Spotify accounts service.

use crate::config::SpotifyProviderConfig;
use crate::error::{Result, SpotifyError};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use lyra_core::{RefreshError, RefreshedToken, TokenRefresher};
use serde::Deserialize;
use tracing::{info, warn};

const LOG_TARGET: &str = "lyra::spotify::auth";

/// Response from the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Present when Spotify rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Wall-clock expiry, when the response carries a lifetime
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

impl From<TokenResponse> for RefreshedToken {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        }
    }
}

/// Error body returned by the accounts service
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges a refresh token for a new access token
pub struct SpotifyTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl SpotifyTokenRefresher {
    /// Create a refresher from provider config
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SpotifyProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            token_url: format!("{}/api/token", config.accounts_url.trim_end_matches('/')),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_token_response(status.as_u16(), &body)
    }
}

/// Interpret a token endpoint response
///
/// # Errors
///
/// Returns [`SpotifyError::AuthFailed`] for error statuses and
/// [`SpotifyError::Json`] for malformed success bodies.
pub fn parse_token_response(status: u16, body: &str) -> Result<TokenResponse> {
    if status >= 400 {
        let reason = serde_json::from_str::<TokenErrorResponse>(body).map_or_else(
            |_| format!("HTTP {status}"),
            |e| match e.error_description {
                Some(description) => format!("{}: {description}", e.error),
                None => e.error,
            },
        );
        return Err(SpotifyError::AuthFailed { reason });
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl TokenRefresher for SpotifyTokenRefresher {
    async fn refresh(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedToken, RefreshError> {
        match self.exchange(refresh_token).await {
            Ok(response) => {
                match response.expires_at(Utc::now()) {
                    Some(expires_at) => info!(
                        target: LOG_TARGET,
                        "Refreshed Spotify access token (valid until {})",
                        expires_at.format("%H:%M:%S")
                    ),
                    None => info!(target: LOG_TARGET, "Refreshed Spotify access token"),
                }
                Ok(response.into())
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Spotify token refresh failed: {}", e);
                Err(e.into())
            }
        }
    }
}
