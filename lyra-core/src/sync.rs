//! Render-side lyric synchronization.
//!
//! [`LyricSyncEngine`] reads the progress clock and the current lyrics on
//! every frame and reports the active line whenever it changes. It never
//! touches the network and never waits on the polling loop.

use crate::fetcher::TrackLyrics;
use crate::lrc::LyricLine;
use crate::progress::ProgressReader;
use crate::time::apply_offset_ms;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const LOG_TARGET: &str = "lyra::sync";

/// Active line reported after a change
#[derive(Debug, Clone)]
pub struct ActiveLine {
    /// Lyrics the index refers to
    pub lyrics: Option<Arc<TrackLyrics>>,
    /// Index into the synced lines, `None` before the first line
    pub index: Option<usize>,
    /// Estimated position (offset applied) used for the lookup
    pub position_ms: Option<u64>,
}

impl ActiveLine {
    /// The active line, if any
    #[must_use]
    pub fn line(&self) -> Option<&LyricLine> {
        let lyrics = self.lyrics.as_ref()?;
        lyrics.synced.line(self.index?)
    }

    /// Text of the active line
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.line().map(|line| line.text.as_str())
    }
}

pub struct LyricSyncEngine {
    progress: ProgressReader,
    lyrics: watch::Receiver<Option<Arc<TrackLyrics>>>,
    offset_ms: i64,
    shown_lyrics: Option<Arc<TrackLyrics>>,
    shown_index: Option<usize>,
}

impl LyricSyncEngine {
    #[must_use]
    pub const fn new(
        progress: ProgressReader,
        lyrics: watch::Receiver<Option<Arc<TrackLyrics>>>,
    ) -> Self {
        Self {
            progress,
            lyrics,
            offset_ms: 0,
            shown_lyrics: None,
            shown_index: None,
        }
    }

    /// Shift the estimated position before lookup (positive = earlier lines)
    #[must_use]
    pub const fn with_offset_ms(mut self, offset_ms: i64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    /// Compute the active line at `now`.
    ///
    /// Returns `Some` only when the lyrics document or the active index
    /// differs from what was last reported.
    pub fn tick(&mut self, now: Instant) -> Option<ActiveLine> {
        let lyrics = self.lyrics.borrow().clone();
        let position_ms = self
            .progress
            .estimate(now)
            .map(|progress| apply_offset_ms(progress, self.offset_ms));

        let index = match (&lyrics, position_ms) {
            (Some(track), Some(position)) => track.synced.active_index(position),
            _ => None,
        };

        let same_lyrics = match (&self.shown_lyrics, &lyrics) {
            (Some(shown), Some(current)) => Arc::ptr_eq(shown, current),
            (None, None) => true,
            _ => false,
        };
        if same_lyrics && self.shown_index == index {
            return None;
        }

        self.shown_lyrics.clone_from(&lyrics);
        self.shown_index = index;

        Some(ActiveLine {
            lyrics,
            index,
            position_ms,
        })
    }

    /// Drive [`tick`](Self::tick) every `frame_interval` until cancelled.
    ///
    /// Missed frames are skipped rather than replayed.
    pub async fn run<F>(
        &mut self,
        frame_interval: Duration,
        cancel_token: &CancellationToken,
        mut on_change: F,
    )
    where
        F: FnMut(&ActiveLine),
    {
        info!(
            target: LOG_TARGET,
            "Starting render loop ({}ms per frame)",
            frame_interval.as_millis()
        );

        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(active) = self.tick(Instant::now()) {
                        debug!(target: LOG_TARGET, "Active line: {:?}", active.index);
                        on_change(&active);
                    }
                }
            }
        }

        info!(target: LOG_TARGET, "Render loop stopped");
    }
}
