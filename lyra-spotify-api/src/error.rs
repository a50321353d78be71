use lyra_core::{FetchError, RefreshError};
use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Spotify-related operations.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// The token exchange was rejected.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// The access token is missing or was rejected.
    #[error("Spotify access token rejected")]
    Unauthorized,

    /// Spotify API returned a rate limit response.
    #[error("Spotify API rate limited, retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Any other error status.
    #[error("Spotify API error {status}")]
    Status { status: u16 },

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to parse JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for FetchError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Unauthorized => Self::Unauthorized,
            SpotifyError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<SpotifyError> for RefreshError {
    fn from(error: SpotifyError) -> Self {
        Self::Failed(error.to_string())
    }
}
