//! Credential context shared between the poller and the playback source.

use tokio::sync::RwLock;
use tracing::info;

const LOG_TARGET: &str = "lyra::session";

/// Access token and refresh credential for one signed-in user.
///
/// Created by the orchestrator and shared by `Arc`; cleared only through
/// [`logout`](Self::logout).
#[derive(Debug, Default)]
pub struct Session {
    access_token: RwLock<Option<String>>,
    refresh_token: RwLock<Option<String>>,
}

impl Session {
    /// Create an empty (signed-out) session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session from a long-lived refresh credential.
    /// The access token is obtained lazily on the first `Unauthorized`.
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: RwLock::new(None),
            refresh_token: RwLock::new(Some(refresh_token.into())),
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.refresh_token.read().await.clone()
    }

    pub async fn set_refresh_token(&self, token: impl Into<String>) {
        *self.refresh_token.write().await = Some(token.into());
    }

    /// Whether a refresh credential is present
    pub async fn is_signed_in(&self) -> bool {
        self.refresh_token.read().await.is_some()
    }

    /// Forget both credentials
    pub async fn logout(&self) {
        *self.access_token.write().await = None;
        *self.refresh_token.write().await = None;
        info!(target: LOG_TARGET, "Session cleared");
    }
}
