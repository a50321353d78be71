//! Continuous progress clock interpolated between sparse snapshots.
//!
//! The polling loop writes a new [`Baseline`] for every snapshot; render
//! loops read it through a [`ProgressReader`]. The baseline travels through a
//! `watch` channel, so every write replaces the whole record at once and
//! readers never observe a half-updated baseline.

use crate::snapshot::Snapshot;
use crate::time::DurationExt;
use tokio::sync::watch;
use tokio::time::Instant;

/// Progress observed at a known local instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    /// Progress reported by the snapshot (milliseconds)
    pub progress_ms: u64,
    /// Track duration reported by the snapshot (milliseconds, 0 = unknown)
    pub duration_ms: u64,
    /// Whether the player was playing when observed
    pub is_playing: bool,
    /// Local time the snapshot was observed
    pub synced_at: Instant,
}

impl Baseline {
    #[must_use]
    pub const fn from_snapshot(snapshot: &Snapshot, synced_at: Instant) -> Self {
        Self {
            progress_ms: snapshot.progress_ms,
            duration_ms: snapshot.duration_ms,
            is_playing: snapshot.is_playing,
            synced_at,
        }
    }

    /// Estimated progress at `now`.
    ///
    /// Advances with the local clock while playing and stays frozen while
    /// paused. Not clamped: between snapshots the value may run past the
    /// end of the track until the next snapshot corrects it.
    #[must_use]
    pub fn estimate(&self, now: Instant) -> u64 {
        if !self.is_playing {
            return self.progress_ms;
        }

        let elapsed = now.saturating_duration_since(self.synced_at);
        self.progress_ms.saturating_add(elapsed.as_millis_u64())
    }

    /// Like [`estimate`](Self::estimate), but never past the track duration.
    /// An unknown (zero) duration disables the clamp.
    #[must_use]
    pub fn estimate_clamped(&self, now: Instant) -> u64 {
        let estimate = self.estimate(now);
        if self.duration_ms == 0 {
            estimate
        } else {
            estimate.min(self.duration_ms)
        }
    }
}

/// Owner of the shared baseline. Only the polling loop writes to it.
#[derive(Debug)]
pub struct ProgressEstimator {
    tx: watch::Sender<Option<Baseline>>,
}

impl ProgressEstimator {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the baseline with one built from `snapshot` observed at `now`
    pub fn update(&self, snapshot: &Snapshot, now: Instant) {
        self.tx.send_replace(Some(Baseline::from_snapshot(snapshot, now)));
    }

    /// Drop the baseline, e.g. after logout
    pub fn reset(&self) {
        self.tx.send_replace(None);
    }

    /// Current baseline, if any snapshot has been observed
    #[must_use]
    pub fn baseline(&self) -> Option<Baseline> {
        *self.tx.borrow()
    }

    /// Unclamped estimate at `now`
    #[must_use]
    pub fn estimate(&self, now: Instant) -> Option<u64> {
        self.baseline().map(|b| b.estimate(now))
    }

    /// Create a read handle for a render loop
    #[must_use]
    pub fn reader(&self) -> ProgressReader {
        ProgressReader {
            rx: self.tx.subscribe(),
            clamp_to_duration: false,
        }
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the progress clock
#[derive(Debug, Clone)]
pub struct ProgressReader {
    rx: watch::Receiver<Option<Baseline>>,
    clamp_to_duration: bool,
}

impl ProgressReader {
    /// Enable or disable clamping estimates to the track duration
    #[must_use]
    pub const fn with_clamping(mut self, clamp_to_duration: bool) -> Self {
        self.clamp_to_duration = clamp_to_duration;
        self
    }

    /// Latest baseline, if any
    #[must_use]
    pub fn baseline(&self) -> Option<Baseline> {
        *self.rx.borrow()
    }

    /// Estimated progress at `now`, `None` before the first snapshot
    #[must_use]
    pub fn estimate(&self, now: Instant) -> Option<u64> {
        self.baseline().map(|b| {
            if self.clamp_to_duration {
                b.estimate_clamped(now)
            } else {
                b.estimate(now)
            }
        })
    }
}
