use async_trait::async_trait;
use lyra_core::{CoreError, Lyrics, LyricsProvider, LyricsQuery, LyricsSource};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyra::lyrics::lrclib";

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Penalty that ranks plain-only results behind any synced result
const PLAIN_ONLY_PENALTY: f64 = 1_000_000.0;
/// Penalty for results whose duration cannot be compared
const UNKNOWN_DURATION_PENALTY: f64 = 50.0;

/// Response from LRCLIB API.
/// Unused fields (trackName, albumName) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LrclibResponse {
    pub id: i64,
    #[serde(default)]
    pub artist_name: String,
    pub duration: Option<f64>,
    #[serde(default)]
    pub instrumental: bool,
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

impl LrclibResponse {
    fn has_synced(&self) -> bool {
        self.synced_lyrics.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    fn has_plain(&self) -> bool {
        self.plain_lyrics.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!(
                "Lyra/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/lyra-sync/lyra)"
            ))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: LRCLIB_API_URL.to_string(),
        })
    }

    /// Point the provider at a different LRCLIB instance
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Exact match on artist, track and (when known) duration
    async fn get_exact(&self, query: &LyricsQuery) -> Result<Option<LrclibResponse>, CoreError> {
        let url = get_url(&self.base_url, query);
        debug!(target: LOG_TARGET, "LRCLIB GET (exact match): {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.status_error(response.status()));
        }
        Ok(Some(response.json().await?))
    }

    /// Search by artist and track, then pick the best candidate
    async fn search(&self, query: &LyricsQuery) -> Result<Option<LrclibResponse>, CoreError> {
        let url = search_url(&self.base_url, query);
        debug!(target: LOG_TARGET, "LRCLIB GET (search): {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.status_error(response.status()));
        }

        let results: Vec<LrclibResponse> = response.json().await?;
        debug!(target: LOG_TARGET, "LRCLIB search returned {} results", results.len());
        Ok(select_best(results, query.duration_ms))
    }

    fn status_error(&self, status: reqwest::StatusCode) -> CoreError {
        warn!(target: LOG_TARGET, "LRCLIB returned status: {}", status);
        CoreError::LyricsProviderFailed {
            provider: self.name().to_string(),
            reason: format!("LRCLIB returned status: {status}"),
        }
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError> {
        info!(
            target: LOG_TARGET,
            "Fetching lyrics from LRCLIB for: {} - {} (duration: {:?}ms)",
            query.artist, query.title, query.duration_ms
        );

        let found = match self.get_exact(query).await? {
            Some(result) => Some(result),
            None => {
                info!(target: LOG_TARGET, "LRCLIB exact match not found, searching");
                self.search(query).await?
            }
        };

        Ok(found.and_then(into_lyrics))
    }
}

/// Track duration in whole seconds as LRCLIB expects it
fn duration_secs(duration_ms: u64) -> Option<u32> {
    u32::try_from(duration_ms / 1000).ok().filter(|secs| *secs > 0)
}

fn get_url(base_url: &str, query: &LyricsQuery) -> String {
    let mut url = format!(
        "{}/get?artist_name={}&track_name={}",
        base_url,
        urlencoding::encode(&query.artist),
        urlencoding::encode(&query.title)
    );
    if let Some(secs) = query.duration_ms.and_then(duration_secs) {
        let _ = write!(url, "&duration={secs}");
    }
    url
}

fn search_url(base_url: &str, query: &LyricsQuery) -> String {
    format!(
        "{}/search?artist_name={}&track_name={}",
        base_url,
        urlencoding::encode(&query.artist),
        urlencoding::encode(&query.title)
    )
}

/// Ranking score (lower is better): synced before plain, then closest duration
fn score(result: &LrclibResponse, expected_secs: Option<f64>) -> f64 {
    let sync_penalty = if result.has_synced() { 0.0 } else { PLAIN_ONLY_PENALTY };
    let duration_penalty = match (result.duration, expected_secs) {
        (Some(actual), Some(expected)) => (actual - expected).abs(),
        _ => UNKNOWN_DURATION_PENALTY,
    };
    sync_penalty + duration_penalty
}

/// Pick the best search result that has any lyrics at all
#[must_use]
pub fn select_best(
    results: Vec<LrclibResponse>,
    duration_ms: Option<u64>,
) -> Option<LrclibResponse> {
    let expected_secs = duration_ms.and_then(duration_secs).map(f64::from);
    results
        .into_iter()
        .filter(|r| !r.instrumental && (r.has_synced() || r.has_plain()))
        .min_by(|a, b| score(a, expected_secs).total_cmp(&score(b, expected_secs)))
}

/// Convert an LRCLIB record; instrumental tracks and empty records yield `None`
#[must_use]
pub fn into_lyrics(result: LrclibResponse) -> Option<Lyrics> {
    if result.instrumental {
        debug!(target: LOG_TARGET, "Track is instrumental (lrclib id: {})", result.id);
        return None;
    }
    if !result.has_synced() && !result.has_plain() {
        return None;
    }

    debug!(
        target: LOG_TARGET,
        "Got lyrics from {} (lrclib id: {}, synced: {})",
        result.artist_name,
        result.id,
        result.has_synced()
    );

    let synced = result.synced_lyrics.filter(|s| !s.trim().is_empty());
    let lyrics = Lyrics::plain(result.plain_lyrics.unwrap_or_default(), LyricsSource::Lrclib);
    Some(match synced {
        Some(synced) => lyrics.with_synced(synced),
        None => lyrics,
    })
}
