pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod lrc;
pub mod paths;
pub mod poller;
pub mod progress;
pub mod provider;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod sync;
pub mod time;

pub use config::{
    build_config_template, DisplayConfig, LoggingConfig, LyraConfig, LyricsConfig,
    LyricsProviderType, PollingConfig, ProvidersConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use events::{diff, EventSink, PlaybackEvent, PlaybackEvents};
pub use fetcher::{LyricsFetcher, TrackLyrics};
pub use lrc::{active_index, parse as parse_synced_lyrics, LyricLine, SyncedLyrics};
pub use paths::{
    config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME,
};
pub use poller::{BackoffState, PollError, PollingEngine};
pub use progress::{Baseline, ProgressEstimator, ProgressReader};
pub use provider::{Lyrics, LyricsProvider, LyricsQuery, LyricsSource};
pub use session::Session;
pub use snapshot::Snapshot;
pub use source::{FetchError, PlaybackSource, RefreshError, RefreshedToken, TokenRefresher};
pub use sync::{ActiveLine, LyricSyncEngine};
pub use time::{apply_offset_ms, DurationExt};
