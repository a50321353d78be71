//! Playback source and credential refresh traits.

use crate::session::Session;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a playback fetch did not produce a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The access token was rejected
    #[error("access token rejected")]
    Unauthorized,

    /// The source asked us to back off
    #[error("rate limited, retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Network failure or unexpected response
    #[error("transport error: {0}")]
    Transport(String),
}

/// Why a credential refresh failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The session holds no refresh credential
    #[error("no refresh credential in session")]
    MissingCredential,

    #[error("token refresh failed: {0}")]
    Failed(String),
}

/// Result of a successful credential refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Replacement refresh credential, when the server rotates it
    pub refresh_token: Option<String>,
}

impl RefreshedToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }
}

/// Remote "now playing" state.
///
/// Implementations perform a single request per call and own any transport
/// timeout; the polling engine never aborts a call in flight.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Fetch the current playback state.
    ///
    /// Returns `Ok(None)` when nothing is playing.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] classifying the failure.
    async fn fetch_current(&self, session: &Session) -> Result<Option<Snapshot>, FetchError>;
}

/// Exchanges a long-lived credential for a fresh access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RefreshError::Failed`] if the exchange is rejected or the
    /// request fails.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError>;
}
