use crate::error::CoreError;
use crate::lrc::SyncedLyrics;
use async_trait::async_trait;
use std::fmt;

/// Query parameters for fetching lyrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    /// Artist name
    pub artist: String,
    /// Track name
    pub title: String,
    /// Track duration in milliseconds (for matching)
    pub duration_ms: Option<u64>,
}

impl LyricsQuery {
    /// Create a new lyrics query
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            duration_ms: None,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Where a lyrics result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LyricsSource {
    Lrclib,
    LyricsOvh,
}

impl LyricsSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lrclib => "lrclib",
            Self::LyricsOvh => "lyrics.ovh",
        }
    }
}

impl fmt::Display for LyricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lyrics returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lyrics {
    /// Untimed text, empty when the provider only had synced lyrics
    pub plain: String,
    /// Timed text in `[mm:ss.xx] text` format
    pub synced: Option<String>,
    pub source: LyricsSource,
}

impl Lyrics {
    pub fn plain(plain: impl Into<String>, source: LyricsSource) -> Self {
        Self {
            plain: plain.into(),
            synced: None,
            source,
        }
    }

    #[must_use]
    pub fn with_synced(mut self, synced: impl Into<String>) -> Self {
        self.synced = Some(synced.into());
        self
    }

    /// Whether there is any text to show
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.plain.trim().is_empty()
            || self
                .synced
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced.is_some()
    }

    /// Parse the synced text, if any
    #[must_use]
    pub fn synced_lyrics(&self) -> Option<SyncedLyrics> {
        self.synced.as_deref().map(SyncedLyrics::parse)
    }
}

/// Trait for lyrics providers
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Fetch lyrics for a query.
    ///
    /// Returns `Ok(None)` when the provider has nothing for this track.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError>;
}
