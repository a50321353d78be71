//! Playback events and the typed channel that delivers them.

use crate::snapshot::Snapshot;
use tokio::sync::broadcast;

/// Default capacity of the [`PlaybackEvents`] broadcast buffer
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Semantic change detected between two consecutive snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A different track is now loaded
    TrackChanged(Snapshot),
    /// Playback started or resumed
    PlaybackResumed(Snapshot),
    /// Playback was paused
    PlaybackPaused(Snapshot),
    /// A fresh progress reading is available
    ProgressUpdated(Snapshot),
}

impl PlaybackEvent {
    /// The snapshot that triggered this event
    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        match self {
            Self::TrackChanged(s)
            | Self::PlaybackResumed(s)
            | Self::PlaybackPaused(s)
            | Self::ProgressUpdated(s) => s,
        }
    }

    /// Stable event name, used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TrackChanged(_) => "track_changed",
            Self::PlaybackResumed(_) => "playback_resumed",
            Self::PlaybackPaused(_) => "playback_paused",
            Self::ProgressUpdated(_) => "progress_updated",
        }
    }
}

/// Compute the events produced by moving from `previous` to `current`.
///
/// With no previous observation only the initial play state is announced,
/// and only when playing. Otherwise events come out in a fixed order:
/// track change, then play/pause toggle, then an unconditional progress
/// update.
#[must_use]
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<PlaybackEvent> {
    let Some(previous) = previous else {
        return if current.is_playing {
            vec![PlaybackEvent::PlaybackResumed(current.clone())]
        } else {
            Vec::new()
        };
    };

    let mut events = Vec::with_capacity(3);

    if current.has_track_changed(previous) {
        events.push(PlaybackEvent::TrackChanged(current.clone()));
    }

    if current.has_playback_toggled(previous) {
        if current.is_playing {
            events.push(PlaybackEvent::PlaybackResumed(current.clone()));
        } else {
            events.push(PlaybackEvent::PlaybackPaused(current.clone()));
        }
    }

    events.push(PlaybackEvent::ProgressUpdated(current.clone()));
    events
}

/// Receiver of playback notifications.
///
/// All methods are one-way: nothing they return is consulted, and the
/// polling loop calls them synchronously, in order, within one evaluation
/// cycle.
pub trait EventSink: Send + Sync {
    fn track_changed(&self, snapshot: &Snapshot);

    fn playback_resumed(&self, snapshot: &Snapshot);

    fn playback_paused(&self, snapshot: &Snapshot);

    fn progress_updated(&self, snapshot: &Snapshot);

    /// Route a typed event to the matching notification
    fn dispatch(&self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::TrackChanged(s) => self.track_changed(s),
            PlaybackEvent::PlaybackResumed(s) => self.playback_resumed(s),
            PlaybackEvent::PlaybackPaused(s) => self.playback_paused(s),
            PlaybackEvent::ProgressUpdated(s) => self.progress_updated(s),
        }
    }
}

/// Explicitly constructed event channel.
///
/// Implements [`EventSink`] by publishing every notification to a
/// broadcast channel; each subscriber observes events in emission order.
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    tx: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackEvents {
    /// Create a channel with the default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a channel buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to playback events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: PlaybackEvent) {
        // No subscribers is not an error; events are fire-and-forget
        let _ = self.tx.send(event);
    }
}

impl Default for PlaybackEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for PlaybackEvents {
    fn track_changed(&self, snapshot: &Snapshot) {
        self.publish(PlaybackEvent::TrackChanged(snapshot.clone()));
    }

    fn playback_resumed(&self, snapshot: &Snapshot) {
        self.publish(PlaybackEvent::PlaybackResumed(snapshot.clone()));
    }

    fn playback_paused(&self, snapshot: &Snapshot) {
        self.publish(PlaybackEvent::PlaybackPaused(snapshot.clone()));
    }

    fn progress_updated(&self, snapshot: &Snapshot) {
        self.publish(PlaybackEvent::ProgressUpdated(snapshot.clone()));
    }
}
