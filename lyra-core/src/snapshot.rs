/// One point-in-time observation of the remote player.
///
/// Snapshots are plain values: a fresh one is built for every successful
/// fetch and compared field by field against the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Source-specific track ID. Empty when the source could not identify
    /// the item (e.g. local files or ads).
    pub track_id: String,
    /// Track name
    pub track_name: String,
    /// Artist name(s), comma separated
    pub artist: String,
    /// Reported playback position in milliseconds
    pub progress_ms: u64,
    /// Total track duration in milliseconds
    pub duration_ms: u64,
    /// Whether the remote player is currently playing
    pub is_playing: bool,
    /// Cover art URL, if the source provides one
    pub cover_url: Option<String>,
}

impl Snapshot {
    /// Create a new snapshot without cover art
    pub fn new(
        track_id: impl Into<String>,
        track_name: impl Into<String>,
        artist: impl Into<String>,
        progress_ms: u64,
        duration_ms: u64,
        is_playing: bool,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            track_name: track_name.into(),
            artist: artist.into(),
            progress_ms,
            duration_ms,
            is_playing,
            cover_url: None,
        }
    }

    /// Attach a cover art URL
    #[must_use]
    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    /// Whether the source identified the playing item
    #[must_use]
    pub fn is_identified(&self) -> bool {
        !self.track_id.is_empty()
    }

    /// Check if the track differs from `other`
    #[must_use]
    pub fn has_track_changed(&self, other: &Self) -> bool {
        self.track_id != other.track_id
    }

    /// Check if playback toggled (playing <-> paused) relative to `other`
    #[must_use]
    pub const fn has_playback_toggled(&self, other: &Self) -> bool {
        self.is_playing != other.is_playing
    }

    /// Check if the reported position differs from `other`
    #[must_use]
    pub const fn has_progress_changed(&self, other: &Self) -> bool {
        self.progress_ms != other.progress_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(track_id: &str, progress_ms: u64, is_playing: bool) -> Snapshot {
        Snapshot::new(track_id, "Song", "Artist", progress_ms, 180_000, is_playing)
    }

    #[test]
    fn test_snapshot_default_is_unidentified() {
        let snapshot = Snapshot::default();
        assert!(!snapshot.is_identified());
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.progress_ms, 0);
        assert!(snapshot.cover_url.is_none());
    }

    #[test]
    fn test_with_cover_url() {
        let snapshot = snapshot("a", 0, true).with_cover_url("https://i.scdn.co/image/x");
        assert_eq!(
            snapshot.cover_url.as_deref(),
            Some("https://i.scdn.co/image/x")
        );
    }

    #[test]
    fn test_track_changed() {
        assert!(snapshot("a", 0, true).has_track_changed(&snapshot("b", 0, true)));
        assert!(!snapshot("a", 0, true).has_track_changed(&snapshot("a", 5_000, false)));
    }

    #[test]
    fn test_track_changed_from_unidentified() {
        assert!(snapshot("", 0, true).has_track_changed(&snapshot("a", 0, true)));
        assert!(!snapshot("", 0, true).has_track_changed(&snapshot("", 0, true)));
    }

    #[test]
    fn test_playback_toggled() {
        assert!(snapshot("a", 0, true).has_playback_toggled(&snapshot("a", 0, false)));
        assert!(!snapshot("a", 0, true).has_playback_toggled(&snapshot("a", 0, true)));
    }

    #[test]
    fn test_progress_changed() {
        assert!(snapshot("a", 0, true).has_progress_changed(&snapshot("a", 1, true)));
        assert!(!snapshot("a", 7, true).has_progress_changed(&snapshot("a", 7, false)));
    }

    #[test]
    fn test_equality_is_field_wise() {
        assert_eq!(snapshot("a", 10, true), snapshot("a", 10, true));
        assert_ne!(snapshot("a", 10, true), snapshot("a", 11, true));
    }
}
