//! Spotify provider configuration.

use const_format::concatcp;
use lyra_core::{CoreError, ProvidersConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "spotify";

/// Environment variable that overrides `refresh_token`
pub const REFRESH_TOKEN_ENV: &str = "LYRA_SPOTIFY_REFRESH_TOKEN";

/// Default Spotify Web API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Default Spotify accounts service URL
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Spotify-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProviderConfig {
    /// Spotify OAuth client ID
    pub client_id: String,
    /// Spotify OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token obtained from the authorization flow
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    /// Transport timeout for every Spotify request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}

fn default_accounts_url() -> String {
    DEFAULT_ACCOUNTS_URL.into()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

impl SpotifyProviderConfig {
    /// Extract Spotify config from the dynamic providers config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Option<Self>, CoreError> {
        providers.get(PROVIDER_NAME)
    }

    /// Validate that required fields are present.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.client_id.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_id".into(),
            });
        }
        if self.client_secret.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_secret".into(),
            });
        }
        Ok(())
    }

    /// Refresh token from the environment, falling back to the config file.
    /// Empty values count as absent.
    #[must_use]
    pub fn resolve_refresh_token(&self) -> Option<String> {
        Self::pick_refresh_token(
            std::env::var(REFRESH_TOKEN_ENV).ok(),
            self.refresh_token.as_deref(),
        )
    }

    fn pick_refresh_token(from_env: Option<String>, from_config: Option<&str>) -> Option<String> {
        from_env
            .filter(|token| !token.trim().is_empty())
            .or_else(|| {
                from_config
                    .filter(|token| !token.trim().is_empty())
                    .map(str::to_string)
            })
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Config template for Spotify provider.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.spotify]
# Required: Get these from https://developer.spotify.com/dashboard
client_id = ""
client_secret = ""
# Refresh token from the authorization flow (or set "#,
    REFRESH_TOKEN_ENV,
    r#")
# refresh_token = ""
# api_base_url = ""#,
    DEFAULT_API_BASE_URL,
    "\"\n# request_timeout_ms = 10000\n\n"
);
