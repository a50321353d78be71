//! lyrics.ovh provider. Plain text only, used as a fallback.

use async_trait::async_trait;
use lyra_core::{CoreError, Lyrics, LyricsProvider, LyricsQuery, LyricsSource};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "lyra::lyrics::ovh";

const LYRICS_OVH_API_URL: &str = "https://api.lyrics.ovh/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Deserialize)]
struct OvhResponse {
    #[serde(default)]
    lyrics: Option<String>,
}

/// api.lyrics.ovh lyrics provider
pub struct LyricsOvhProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LyricsOvhProvider {
    /// Create a new provider with a 10-second timeout and 2 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: LYRICS_OVH_API_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LyricsProvider for LyricsOvhProvider {
    fn name(&self) -> &'static str {
        "lyrics_ovh"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError> {
        let url = lyrics_url(&self.base_url, query);
        info!(
            target: LOG_TARGET,
            "Fetching lyrics from lyrics.ovh for: {} - {}", query.artist, query.title
        );
        debug!(target: LOG_TARGET, "lyrics.ovh GET: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("lyrics.ovh returned status: {}", response.status()),
            });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

fn lyrics_url(base_url: &str, query: &LyricsQuery) -> String {
    format!(
        "{}/{}/{}",
        base_url,
        urlencoding::encode(&query.artist),
        urlencoding::encode(&query.title)
    )
}

/// Extract lyrics from a response body; an empty or missing `lyrics` field yields `None`
///
/// # Errors
///
/// Returns [`CoreError::LyricsProviderFailed`] if the body is not JSON.
pub fn parse_response(body: &str) -> Result<Option<Lyrics>, CoreError> {
    let response: OvhResponse =
        serde_json::from_str(body).map_err(|e| CoreError::LyricsProviderFailed {
            provider: "lyrics_ovh".into(),
            reason: format!("malformed response: {e}"),
        })?;

    Ok(response
        .lyrics
        .filter(|text| !text.trim().is_empty())
        .map(|text| Lyrics::plain(text, LyricsSource::LyricsOvh)))
}
