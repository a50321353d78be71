//! Lyrics fetcher that orchestrates multiple lyrics providers.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{PlaybackEvent, PlaybackEvents};
use crate::lrc::SyncedLyrics;
use crate::provider::{Lyrics, LyricsProvider, LyricsQuery};
use crate::snapshot::Snapshot;

const LOG_TARGET: &str = "lyra::lyrics";

/// Lyrics resolved for one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLyrics {
    pub track_id: String,
    pub lyrics: Lyrics,
    /// Parsed synced lines, empty when only plain text was found
    pub synced: SyncedLyrics,
}

impl TrackLyrics {
    #[must_use]
    pub fn new(track_id: impl Into<String>, lyrics: Lyrics) -> Self {
        let synced = lyrics.synced_lyrics().unwrap_or_default();
        Self {
            track_id: track_id.into(),
            lyrics,
            synced,
        }
    }
}

/// Lyrics fetcher that listens for track changes and fetches lyrics
pub struct LyricsFetcher {
    providers: Vec<Box<dyn LyricsProvider>>,
    current: watch::Sender<Option<Arc<TrackLyrics>>>,
    cancel_token: CancellationToken,
}

impl LyricsFetcher {
    /// Create a new lyrics fetcher
    ///
    /// # Arguments
    /// * `providers` - List of lyrics providers to try in order
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        providers: Vec<Box<dyn LyricsProvider>>,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            providers,
            current,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Watch the lyrics of the current track.
    /// Holds `None` while nothing is loaded or nothing was found.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<TrackLyrics>>> {
        self.current.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<TrackLyrics>> {
        self.current.borrow().clone()
    }

    /// Try each provider in order and return the first usable result.
    ///
    /// Provider errors and empty results move on to the next provider;
    /// `None` means every provider came up empty.
    pub async fn get_lyrics(&self, artist: &str, title: &str) -> Option<Lyrics> {
        self.fetch_first(&LyricsQuery::new(artist, title)).await
    }

    /// Like [`get_lyrics`](Self::get_lyrics) with a full query
    pub async fn fetch_first(&self, query: &LyricsQuery) -> Option<Lyrics> {
        for provider in &self.providers {
            debug!(target: LOG_TARGET, "Trying provider: {}", provider.name());
            match provider.fetch(query).await {
                Ok(Some(lyrics)) if lyrics.is_usable() => {
                    info!(
                        target: LOG_TARGET,
                        "Found {} lyrics from {}",
                        if lyrics.is_synced() { "synced" } else { "plain" },
                        provider.name()
                    );
                    return Some(lyrics);
                }
                Ok(_) => {
                    info!(target: LOG_TARGET, "Provider {} returned no lyrics", provider.name());
                }
                Err(e) => {
                    warn!(
                        target: LOG_TARGET,
                        "Provider {} failed with error: {}",
                        provider.name(),
                        e
                    );
                }
            }
        }

        let provider_names: Vec<_> = self.providers.iter().map(|p| p.name()).collect();
        info!(
            target: LOG_TARGET,
            "No lyrics found for {} - {} (tried {:?})", query.artist, query.title, provider_names
        );
        None
    }

    /// Start the lyrics fetcher in a background task.
    ///
    /// Subscribes before spawning so no event emitted after this call is missed.
    #[must_use]
    pub fn start(self: Arc<Self>, events: &PlaybackEvents) -> tokio::task::JoinHandle<()> {
        let rx = events.subscribe();
        tokio::spawn(async move {
            self.run(rx).await;
        })
    }

    /// Fetch lyrics whenever the observed track changes.
    ///
    /// Events keep being received while a lookup is in flight; an event for
    /// a different track abandons the pending lookup so stale lyrics are
    /// never published.
    pub async fn run(&self, mut rx: broadcast::Receiver<PlaybackEvent>) {
        info!(target: LOG_TARGET, "Initializing lyrics fetching handler");

        let mut loaded_for: Option<String> = None;
        let mut pending = None;

        'events: loop {
            let received = match pending.take() {
                Some(received) => received,
                None => tokio::select! {
                    () = self.cancel_token.cancelled() => break,
                    received = rx.recv() => received,
                },
            };

            let snapshot = match received {
                Ok(event) => event.snapshot().clone(),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: LOG_TARGET, "Lyrics fetcher lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if loaded_for.as_deref() == Some(snapshot.track_id.as_str()) {
                continue;
            }
            loaded_for = Some(snapshot.track_id.clone());
            self.current.send_replace(None);

            let load = self.load(&snapshot);
            tokio::pin!(load);

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel_token.cancelled() => break 'events,
                    () = &mut load => break,
                    received = rx.recv() => match received {
                        Ok(event) if event.snapshot().track_id == snapshot.track_id => {}
                        Ok(event) => {
                            debug!(
                                target: LOG_TARGET,
                                "Track changed during lookup for {}, abandoning it",
                                snapshot.track_id
                            );
                            pending = Some(Ok(event));
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                target: LOG_TARGET,
                                "Lyrics fetcher lagged, skipped {} events", skipped
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            // Let the lookup finish, then stop
                            tokio::select! {
                                () = self.cancel_token.cancelled() => {}
                                () = &mut load => {}
                            }
                            break 'events;
                        }
                    },
                }
            }
        }

        info!(target: LOG_TARGET, "Lyrics fetcher shutting down");
    }

    async fn load(&self, snapshot: &Snapshot) {
        if !snapshot.is_identified() || snapshot.track_name.is_empty() {
            debug!(target: LOG_TARGET, "Skipping lyrics lookup for unidentified item");
            return;
        }

        info!(
            target: LOG_TARGET,
            "Fetching lyrics for: {} - {}", snapshot.artist, snapshot.track_name
        );

        let mut query = LyricsQuery::new(&snapshot.artist, &snapshot.track_name);
        if snapshot.duration_ms > 0 {
            query = query.with_duration_ms(snapshot.duration_ms);
        }

        if let Some(lyrics) = self.fetch_first(&query).await {
            let track = TrackLyrics::new(&snapshot.track_id, lyrics);
            debug!(target: LOG_TARGET, "Publishing {} synced lines", track.synced.len());
            self.current.send_replace(Some(Arc::new(track)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::events::EventSink;
    use crate::provider::LyricsSource;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Behavior {
        Found(Lyrics),
        Empty,
        Fail,
    }

    struct FakeProvider {
        name: &'static str,
        behavior: Behavior,
        queries: Mutex<Vec<LyricsQuery>>,
    }

    impl FakeProvider {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            Self {
                name,
                behavior,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LyricsProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError> {
            self.queries.lock().unwrap().push(query.clone());
            match &self.behavior {
                Behavior::Found(lyrics) => Ok(Some(lyrics.clone())),
                Behavior::Empty => Ok(None),
                Behavior::Fail => Err(CoreError::LyricsProviderFailed {
                    provider: self.name.into(),
                    reason: "boom".into(),
                }),
            }
        }
    }

    #[async_trait]
    impl LyricsProvider for Arc<FakeProvider> {
        fn name(&self) -> &'static str {
            self.as_ref().name()
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError> {
            self.as_ref().fetch(query).await
        }
    }

    /// Takes ten seconds to answer for titles starting with "Slow"
    struct DelayedProvider;

    #[async_trait]
    impl LyricsProvider for DelayedProvider {
        fn name(&self) -> &'static str {
            "delayed"
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<Lyrics>, CoreError> {
            if query.title.starts_with("Slow") {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            Ok(Some(Lyrics::plain(
                format!("lyrics for {}", query.title),
                LyricsSource::Lrclib,
            )))
        }
    }

    fn synced() -> Lyrics {
        Lyrics::plain("hello", LyricsSource::Lrclib).with_synced("[00:01.00]hello")
    }

    fn ovh() -> Lyrics {
        Lyrics::plain("hello", LyricsSource::LyricsOvh)
    }

    #[tokio::test]
    async fn test_primary_wins() {
        let fetcher = LyricsFetcher::new(
            vec![
                Box::new(FakeProvider::new("primary", Behavior::Found(synced()))),
                Box::new(FakeProvider::new("secondary", Behavior::Found(ovh()))),
            ],
            None,
        );
        assert_eq!(fetcher.get_lyrics("Artist", "Title").await, Some(synced()));
    }

    #[tokio::test]
    async fn test_falls_back_on_error() {
        let fetcher = LyricsFetcher::new(
            vec![
                Box::new(FakeProvider::new("primary", Behavior::Fail)),
                Box::new(FakeProvider::new("secondary", Behavior::Found(ovh()))),
            ],
            None,
        );
        assert_eq!(fetcher.get_lyrics("Artist", "Title").await, Some(ovh()));
    }

    #[tokio::test]
    async fn test_falls_back_on_empty_text() {
        let fetcher = LyricsFetcher::new(
            vec![
                Box::new(FakeProvider::new(
                    "primary",
                    Behavior::Found(Lyrics::plain("", LyricsSource::Lrclib)),
                )),
                Box::new(FakeProvider::new("secondary", Behavior::Found(ovh()))),
            ],
            None,
        );
        assert_eq!(fetcher.get_lyrics("Artist", "Title").await, Some(ovh()));
    }

    #[tokio::test]
    async fn test_all_failing_yields_none() {
        let fetcher = LyricsFetcher::new(
            vec![
                Box::new(FakeProvider::new("primary", Behavior::Empty)),
                Box::new(FakeProvider::new("secondary", Behavior::Fail)),
            ],
            None,
        );
        assert!(fetcher.get_lyrics("Artist", "Title").await.is_none());
        assert!(LyricsFetcher::new(Vec::new(), None)
            .get_lyrics("Artist", "Title")
            .await
            .is_none());
    }

    fn snapshot(track_id: &str, is_playing: bool) -> Snapshot {
        Snapshot::new(track_id, "Title", "Artist", 0, 180_000, is_playing)
    }

    async fn wait_for_lyrics(
        rx: &mut watch::Receiver<Option<Arc<TrackLyrics>>>,
    ) -> Arc<TrackLyrics> {
        loop {
            if let Some(track) = rx.borrow_and_update().clone() {
                return track;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_loads_lyrics_on_track_change() {
        let events = PlaybackEvents::new();
        let fetcher = Arc::new(LyricsFetcher::new(
            vec![Box::new(FakeProvider::new("primary", Behavior::Found(synced())))],
            None,
        ));
        let mut rx = fetcher.subscribe();
        let handle = Arc::clone(&fetcher).start(&events);

        events.playback_resumed(&snapshot("a", true));

        let track = wait_for_lyrics(&mut rx).await;
        assert_eq!(track.track_id, "a");
        assert_eq!(track.synced.len(), 1);

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fetches_once_per_track() {
        let events = PlaybackEvents::new();
        let provider = Arc::new(FakeProvider::new("primary", Behavior::Found(synced())));
        let fetcher = Arc::new(LyricsFetcher::new(
            vec![Box::new(Arc::clone(&provider))],
            None,
        ));
        let mut rx = fetcher.subscribe();
        let handle = Arc::clone(&fetcher).start(&events);

        events.playback_resumed(&snapshot("a", true));
        events.progress_updated(&snapshot("a", true));
        events.playback_paused(&snapshot("a", false));
        events.track_changed(&snapshot("b", false));

        loop {
            rx.changed().await.unwrap();
            let loaded = rx.borrow_and_update().as_ref().map(|t| t.track_id.clone());
            if loaded.as_deref() == Some("b") {
                break;
            }
        }

        assert_eq!(provider.queries.lock().unwrap().len(), 2);
        assert_eq!(
            provider.queries.lock().unwrap()[0],
            LyricsQuery::new("Artist", "Title").with_duration_ms(180_000)
        );

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_skips_unidentified_items() {
        let events = PlaybackEvents::new();
        let provider = Arc::new(FakeProvider::new("primary", Behavior::Found(synced())));
        let fetcher = LyricsFetcher::new(vec![Box::new(Arc::clone(&provider))], None);
        let rx = events.subscribe();

        events.playback_resumed(&snapshot("", true));
        drop(events);

        fetcher.run(rx).await;
        assert!(fetcher.current().is_none());
        assert!(provider.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_track_change_clears_previous_lyrics() {
        let events = PlaybackEvents::new();
        let fetcher = LyricsFetcher::new(
            vec![Box::new(FakeProvider::new("primary", Behavior::Empty))],
            None,
        );
        fetcher
            .current
            .send_replace(Some(Arc::new(TrackLyrics::new("a", synced()))));
        let rx = events.subscribe();

        events.track_changed(&snapshot("b", true));
        drop(events);

        fetcher.run(rx).await;
        assert!(fetcher.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_track_abandons_pending_lookup() {
        let events = PlaybackEvents::new();
        let fetcher = Arc::new(LyricsFetcher::new(vec![Box::new(DelayedProvider)], None));
        let mut rx = fetcher.subscribe();
        let handle = Arc::clone(&fetcher).start(&events);

        events.playback_resumed(&Snapshot::new("a", "Slow", "Artist", 0, 180_000, true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        events.track_changed(&Snapshot::new("b", "Fast", "Artist", 0, 180_000, true));

        let track = wait_for_lyrics(&mut rx).await;
        assert_eq!(track.track_id, "b");
        assert_eq!(track.lyrics.plain, "lyrics for Fast");

        // Long after the slow lookup would have finished
        tokio::time::sleep(Duration::from_secs(30)).await;
        let current = fetcher.current().map(|t| t.track_id.clone());
        assert_eq!(current.as_deref(), Some("b"));

        fetcher.cancel_token().cancel();
        handle.await.unwrap();
    }
}
