//! Spotify "now playing" source.

use crate::config::SpotifyProviderConfig;
use crate::error::{Result, SpotifyError};
use async_trait::async_trait;
use lyra_core::{DurationExt, FetchError, PlaybackSource, Session, Snapshot};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

const LOG_TARGET: &str = "lyra::spotify";

/// Used when a 429 response carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct CurrentPlayback {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<PlayableItem>,
}

/// A track or a podcast episode
#[derive(Debug, Deserialize)]
struct PlayableItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<Named>,
    #[serde(default)]
    album: Option<Album>,
    #[serde(default)]
    show: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

/// Playback source backed by `GET /me/player`
pub struct SpotifyPlaybackSource {
    client: reqwest::Client,
    base_url: String,
}

impl SpotifyPlaybackSource {
    /// Create a playback source from provider config
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SpotifyProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api_base_url))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, access_token: &str) -> Result<Option<Snapshot>> {
        let request_start = Instant::now();

        let response = self
            .client
            .get(format!("{}/me/player", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let request_latency = request_start.elapsed();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !classify_status(response.status(), retry_after.as_deref())? {
            return Ok(None);
        }

        let body = response.text().await?;
        // Assume the position was sampled halfway through the request
        parse_playback(&body, request_latency / 2).map(Some)
    }
}

#[async_trait]
impl PlaybackSource for SpotifyPlaybackSource {
    fn name(&self) -> &'static str {
        "spotify"
    }

    async fn fetch_current(
        &self,
        session: &Session,
    ) -> std::result::Result<Option<Snapshot>, FetchError> {
        let Some(access_token) = session.access_token().await else {
            return Err(FetchError::Unauthorized);
        };
        self.fetch(&access_token).await.map_err(FetchError::from)
    }
}

/// Map a response status to an outcome.
///
/// `Ok(true)` means a playback body follows, `Ok(false)` means nothing is
/// playing.
///
/// # Errors
///
/// Returns the classified failure for 401, 429 and any other status >= 400.
pub fn classify_status(status: StatusCode, retry_after: Option<&str>) -> Result<bool> {
    match status {
        StatusCode::NO_CONTENT => Ok(false),
        StatusCode::UNAUTHORIZED => Err(SpotifyError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(SpotifyError::RateLimited {
            retry_after: parse_retry_after(retry_after),
        }),
        s if s.is_client_error() || s.is_server_error() => Err(SpotifyError::Status {
            status: s.as_u16(),
        }),
        _ => Ok(true),
    }
}

/// `Retry-After` in whole seconds, one second when absent or malformed
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs)
}

/// Build a snapshot from a `/me/player` body.
///
/// Missing fields fall back to empty/zero; `latency_compensation` is added
/// to the reported progress.
///
/// # Errors
///
/// Returns [`SpotifyError::Json`] if the body is not a playback object.
pub fn parse_playback(body: &str, latency_compensation: Duration) -> Result<Snapshot> {
    let playback: CurrentPlayback = serde_json::from_str(body)?;
    let progress_ms = playback
        .progress_ms
        .unwrap_or(0)
        .saturating_add(latency_compensation.as_millis_u64());

    let Some(item) = playback.item else {
        debug!(target: LOG_TARGET, "Player active without an item");
        return Ok(Snapshot {
            progress_ms,
            is_playing: playback.is_playing,
            ..Snapshot::default()
        });
    };

    let artist = if item.artists.is_empty() {
        item.show.map(|show| show.name).unwrap_or_default()
    } else {
        item.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let cover_url = item
        .album
        .and_then(|album| album.images.into_iter().next())
        .map(|image| image.url);

    Ok(Snapshot {
        track_id: item.id.unwrap_or_default(),
        track_name: item.name,
        artist,
        progress_ms,
        duration_ms: item.duration_ms,
        is_playing: playback.is_playing,
        cover_url,
    })
}
