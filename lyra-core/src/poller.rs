//! Resilient playback polling loop.
//!
//! One [`PollingEngine`] drives a [`PlaybackSource`] on a fixed cadence,
//! honours rate-limit backoff, refreshes credentials once per rejected
//! request, and turns successive snapshots into [`PlaybackEvent`]s.

use crate::config::PollingConfig;
use crate::events::{diff, EventSink, PlaybackEvent};
use crate::progress::ProgressEstimator;
use crate::session::Session;
use crate::snapshot::Snapshot;
use crate::source::{FetchError, PlaybackSource, RefreshError, RefreshedToken, TokenRefresher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "lyra::poller";

/// Used when `now + retry_after` does not fit in an `Instant`
const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("poller is already running")]
    AlreadyRunning,

    #[error("giving up after {attempts} consecutive failed token refreshes")]
    RefreshExhausted { attempts: u32 },
}

/// Rate-limit window. Only ever extended, never shortened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    until: Option<Instant>,
}

impl BackoffState {
    /// End of the current window, if one was ever set
    #[must_use]
    pub const fn until(&self) -> Option<Instant> {
        self.until
    }

    /// Push the window out to `now + retry_after` unless it already ends later.
    /// Returns the resulting end of the window.
    pub fn extend(&mut self, now: Instant, retry_after: Duration) -> Instant {
        let candidate = now
            .checked_add(retry_after)
            .unwrap_or_else(|| now + MAX_BACKOFF);
        let until = self.until.map_or(candidate, |current| current.max(candidate));
        self.until = Some(until);
        until
    }

    /// Time left in the window at `now`, `None` once it has elapsed
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }
}

/// Outcome of the fetch step, including the one-shot refresh and retry
enum Attempt {
    Fetched {
        result: Result<Option<Snapshot>, FetchError>,
        refreshed: bool,
    },
    RefreshFailed(RefreshError),
    /// Stop was requested while a request was in flight
    Cancelled,
}

/// Clears the running flag when the loop exits or its future is dropped
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Playback polling engine
pub struct PollingEngine {
    source: Arc<dyn PlaybackSource>,
    refresher: Arc<dyn TokenRefresher>,
    session: Arc<Session>,
    sink: Arc<dyn EventSink>,
    estimator: Arc<ProgressEstimator>,
    poll_interval: Duration,
    max_refresh_failures: Option<u32>,
    cancel_token: CancellationToken,
    running: AtomicBool,
}

impl PollingEngine {
    /// Create a new polling engine
    ///
    /// # Arguments
    /// * `source` - Remote playback state to poll
    /// * `refresher` - Credential exchange used after an `Unauthorized` response
    /// * `session` - Credentials shared with the source
    /// * `sink` - Receiver of playback events, called in emission order
    /// * `config` - Poll interval and refresh failure policy
    pub fn new(
        source: Arc<dyn PlaybackSource>,
        refresher: Arc<dyn TokenRefresher>,
        session: Arc<Session>,
        sink: Arc<dyn EventSink>,
        config: &PollingConfig,
    ) -> Self {
        Self {
            source,
            refresher,
            session,
            sink,
            estimator: Arc::new(ProgressEstimator::new()),
            poll_interval: config.interval(),
            max_refresh_failures: config.max_consecutive_refresh_failures,
            cancel_token: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Publish baselines to an existing estimator
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<ProgressEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Use an external cancellation token for graceful shutdown
    #[must_use]
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Estimator receiving a new baseline for every snapshot
    #[must_use]
    pub fn estimator(&self) -> Arc<ProgressEstimator> {
        Arc::clone(&self.estimator)
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Whether the loop is currently running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request the loop to stop.
    ///
    /// A request already in flight completes, but its result is discarded.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Start polling in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<Result<(), PollError>> {
        tokio::spawn(async move {
            let result = self.run().await;
            if let Err(ref e) = result {
                error!(target: LOG_TARGET, "Poller stopped with error: {}", e);
            }
            result
        })
    }

    /// Run the polling loop until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::AlreadyRunning`] if another `run` is active on
    /// this engine, or [`PollError::RefreshExhausted`] when the configured
    /// number of consecutive refresh failures is reached.
    pub async fn run(&self) -> Result<(), PollError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(PollError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        info!(
            target: LOG_TARGET,
            "Starting {} poller (interval: {}ms)",
            self.source.name(),
            self.poll_interval.as_millis()
        );

        let mut previous: Option<Snapshot> = None;
        let mut backoff = BackoffState::default();
        let mut refresh_failures: u32 = 0;

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            if let Some(remaining) = backoff.remaining(Instant::now()) {
                debug!(
                    target: LOG_TARGET,
                    "Rate limit window open, waiting {}ms",
                    remaining.as_millis()
                );
                if !self.pause(remaining).await {
                    break;
                }
                continue;
            }

            match self.attempt().await {
                Attempt::Cancelled => {
                    debug!(target: LOG_TARGET, "Discarding poll result received after stop");
                    break;
                }
                Attempt::RefreshFailed(e) => {
                    refresh_failures = refresh_failures.saturating_add(1);
                    warn!(
                        target: LOG_TARGET,
                        "Token refresh failed ({} consecutive): {}", refresh_failures, e
                    );
                    if let Some(max) = self.max_refresh_failures {
                        if refresh_failures >= max {
                            return Err(PollError::RefreshExhausted {
                                attempts: refresh_failures,
                            });
                        }
                    }
                }
                Attempt::Fetched { result, refreshed } => {
                    if refreshed || result.is_ok() {
                        refresh_failures = 0;
                    }
                    match result {
                        Ok(Some(snapshot)) => self.evaluate(&mut previous, snapshot),
                        Ok(None) => {
                            debug!(target: LOG_TARGET, "Nothing playing");
                        }
                        Err(FetchError::RateLimited { retry_after }) => {
                            let until = backoff.extend(Instant::now(), retry_after);
                            debug!(
                                target: LOG_TARGET,
                                "Rate limited, backing off for {}ms",
                                until.saturating_duration_since(Instant::now()).as_millis()
                            );
                            continue;
                        }
                        Err(e) => {
                            warn!(target: LOG_TARGET, "Poll error: {}", e);
                        }
                    }
                }
            }

            if !self.pause(self.poll_interval).await {
                break;
            }
        }

        info!(target: LOG_TARGET, "Poller shutting down gracefully");
        Ok(())
    }

    /// Fetch once; on `Unauthorized` refresh the token and fetch once more
    async fn attempt(&self) -> Attempt {
        let first = self.source.fetch_current(&self.session).await;
        if self.cancel_token.is_cancelled() {
            return Attempt::Cancelled;
        }
        if !matches!(first, Err(FetchError::Unauthorized)) {
            return Attempt::Fetched {
                result: first,
                refreshed: false,
            };
        }

        info!(target: LOG_TARGET, "Access token rejected, refreshing");
        let refreshed = self.request_token().await;
        if self.cancel_token.is_cancelled() {
            return Attempt::Cancelled;
        }
        match refreshed {
            Ok(token) => self.store_token(token).await,
            Err(e) => return Attempt::RefreshFailed(e),
        }

        let retried = self.source.fetch_current(&self.session).await;
        if self.cancel_token.is_cancelled() {
            return Attempt::Cancelled;
        }
        Attempt::Fetched {
            result: retried,
            refreshed: true,
        }
    }

    async fn request_token(&self) -> Result<RefreshedToken, RefreshError> {
        let Some(refresh_token) = self.session.refresh_token().await else {
            return Err(RefreshError::MissingCredential);
        };
        self.refresher.refresh(&refresh_token).await
    }

    async fn store_token(&self, token: RefreshedToken) {
        self.session.set_access_token(token.access_token).await;
        if let Some(rotated) = token.refresh_token {
            debug!(target: LOG_TARGET, "Refresh credential rotated");
            self.session.set_refresh_token(rotated).await;
        }
    }

    /// Diff against the previous snapshot, publish the baseline, emit events
    fn evaluate(&self, previous: &mut Option<Snapshot>, snapshot: Snapshot) {
        debug!(
            target: LOG_TARGET,
            "Polled {}: playing={}, track={:?}, position={}ms",
            self.source.name(),
            snapshot.is_playing,
            snapshot.track_name,
            snapshot.progress_ms
        );

        self.estimator.update(&snapshot, Instant::now());

        let events = diff(previous.as_ref(), &snapshot);
        for event in &events {
            if !matches!(event, PlaybackEvent::ProgressUpdated(_)) {
                debug!(target: LOG_TARGET, "Emitting {}", event.name());
            }
            self.sink.dispatch(event);
        }

        *previous = Some(snapshot);
    }

    /// Sleep for `duration`; returns `false` if stopped first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel_token.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Step = Result<Option<Snapshot>, FetchError>;

    /// Plays back a fixed script, then stops the engine
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(Instant, Option<String>)>>,
        cancel_token: CancellationToken,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>, cancel_token: CancellationToken) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
                cancel_token,
            })
        }

        fn calls(&self) -> Vec<(Instant, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlaybackSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_current(&self, session: &Session) -> Result<Option<Snapshot>, FetchError> {
            let token = session.access_token().await;
            self.calls.lock().unwrap().push((Instant::now(), token));
            let next = self.steps.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                self.cancel_token.cancel();
                Ok(None)
            })
        }
    }

    struct FakeRefresher {
        result: Result<RefreshedToken, RefreshError>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRefresher {
        fn ok(token: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(RefreshedToken::new(token)),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Err(RefreshError::Failed("invalid_grant".into())),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
            self.calls.lock().unwrap().push(refresh_token.to_string());
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<PlaybackEvent>>,
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(PlaybackEvent::name).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn track_changed(&self, snapshot: &Snapshot) {
            self.events.lock().unwrap().push(PlaybackEvent::TrackChanged(snapshot.clone()));
        }

        fn playback_resumed(&self, snapshot: &Snapshot) {
            self.events.lock().unwrap().push(PlaybackEvent::PlaybackResumed(snapshot.clone()));
        }

        fn playback_paused(&self, snapshot: &Snapshot) {
            self.events.lock().unwrap().push(PlaybackEvent::PlaybackPaused(snapshot.clone()));
        }

        fn progress_updated(&self, snapshot: &Snapshot) {
            self.events.lock().unwrap().push(PlaybackEvent::ProgressUpdated(snapshot.clone()));
        }
    }

    const INTERVAL: Duration = Duration::from_millis(1_000);

    fn config(max_refresh_failures: Option<u32>) -> PollingConfig {
        PollingConfig {
            interval_ms: 1_000,
            max_consecutive_refresh_failures: max_refresh_failures,
        }
    }

    fn snapshot(track_id: &str, progress_ms: u64, is_playing: bool) -> Snapshot {
        Snapshot::new(track_id, "Song", "Artist", progress_ms, 180_000, is_playing)
    }

    struct Harness {
        engine: PollingEngine,
        source: Arc<ScriptedSource>,
        refresher: Arc<FakeRefresher>,
        sink: Arc<RecordingSink>,
        session: Arc<Session>,
    }

    fn harness(
        steps: Vec<Step>,
        refresher: Arc<FakeRefresher>,
        max_failures: Option<u32>,
    ) -> Harness {
        let cancel_token = CancellationToken::new();
        let source = ScriptedSource::new(steps, cancel_token.clone());
        let sink = Arc::new(RecordingSink::default());
        let session = Arc::new(Session::with_refresh_token("refresh-credential"));
        let engine = PollingEngine::new(
            source.clone(),
            refresher.clone(),
            session.clone(),
            sink.clone(),
            &config(max_failures),
        )
        .with_cancel_token(cancel_token);
        Harness {
            engine,
            source,
            refresher,
            sink,
            session,
        }
    }

    #[test]
    fn test_backoff_extends_to_later_deadline() {
        let t0 = Instant::now();
        let mut backoff = BackoffState::default();
        backoff.extend(t0, Duration::from_millis(500));
        let t1 = t0 + Duration::from_millis(100);
        let until = backoff.extend(t1, Duration::from_millis(1_000));
        assert_eq!(until, t1 + Duration::from_millis(1_000));
        assert_eq!(backoff.until(), Some(t0 + Duration::from_millis(1_100)));
    }

    #[test]
    fn test_backoff_never_shortens() {
        let t0 = Instant::now();
        let mut backoff = BackoffState::default();
        backoff.extend(t0, Duration::from_millis(5_000));
        let until = backoff.extend(t0 + Duration::from_millis(100), Duration::from_millis(200));
        assert_eq!(until, t0 + Duration::from_millis(5_000));
    }

    #[test]
    fn test_backoff_remaining() {
        let t0 = Instant::now();
        let mut backoff = BackoffState::default();
        assert!(!backoff.is_active(t0));
        backoff.extend(t0, Duration::from_millis(500));
        assert_eq!(
            backoff.remaining(t0 + Duration::from_millis(200)),
            Some(Duration::from_millis(300))
        );
        assert!(backoff.remaining(t0 + Duration::from_millis(500)).is_none());
        assert!(!backoff.is_active(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_backoff_overflow_saturates() {
        let t0 = Instant::now();
        let mut backoff = BackoffState::default();
        let until = backoff.extend(t0, Duration::MAX);
        assert_eq!(until, t0 + MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_then_progress() {
        let h = harness(
            vec![Ok(Some(snapshot("a", 1_000, true))), Ok(Some(snapshot("a", 2_000, true)))],
            FakeRefresher::ok("unused"),
            None,
        );

        assert_eq!(h.engine.run().await, Ok(()));
        assert_eq!(h.sink.names(), ["playback_resumed", "progress_updated"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_configured_interval() {
        let h = harness(
            vec![Ok(Some(snapshot("a", 0, true))), Ok(None), Ok(Some(snapshot("a", 2_000, true)))],
            FakeRefresher::ok("unused"),
            None,
        );

        h.engine.run().await.unwrap();

        let calls = h.source.calls();
        assert_eq!(calls[1].0 - calls[0].0, INTERVAL);
        assert_eq!(calls[2].0 - calls[1].0, INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_result_keeps_previous_snapshot() {
        let h = harness(
            vec![
                Ok(Some(snapshot("a", 0, true))),
                Ok(None),
                Ok(Some(snapshot("b", 0, true))),
            ],
            FakeRefresher::ok("unused"),
            None,
        );

        h.engine.run().await.unwrap();

        assert_eq!(
            h.sink.names(),
            ["playback_resumed", "track_changed", "progress_updated"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_without_extra_interval() {
        let h = harness(
            vec![
                Err(FetchError::RateLimited {
                    retry_after: Duration::from_millis(5_000),
                }),
                Ok(Some(snapshot("a", 0, true))),
            ],
            FakeRefresher::ok("unused"),
            None,
        );

        h.engine.run().await.unwrap();

        let calls = h.source.calls();
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_millis(5_000));
        assert_eq!(h.sink.names(), ["playback_resumed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_rate_limits_chain() {
        let h = harness(
            vec![
                Err(FetchError::RateLimited {
                    retry_after: Duration::from_millis(500),
                }),
                Err(FetchError::RateLimited {
                    retry_after: Duration::from_millis(1_000),
                }),
                Ok(None),
            ],
            FakeRefresher::ok("unused"),
            None,
        );

        h.engine.run().await.unwrap();

        let calls = h.source.calls();
        assert_eq!(calls[1].0 - calls[0].0, Duration::from_millis(500));
        assert_eq!(calls[2].0 - calls[1].0, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_refreshes_and_retries_in_same_cycle() {
        let h = harness(
            vec![
                Ok(Some(snapshot("a", 0, false))),
                Err(FetchError::Unauthorized),
                Ok(Some(snapshot("b", 0, true))),
            ],
            FakeRefresher::ok("fresh-token"),
            None,
        );

        h.engine.run().await.unwrap();

        assert_eq!(
            h.sink.names(),
            ["track_changed", "playback_resumed", "progress_updated"]
        );
        assert_eq!(h.refresher.call_count(), 1);
        assert_eq!(
            h.refresher.calls.lock().unwrap().as_slice(),
            ["refresh-credential"]
        );
        assert_eq!(h.session.access_token().await.as_deref(), Some("fresh-token"));

        let calls = h.source.calls();
        assert_eq!(calls[2].0, calls[1].0, "retry happens within the same cycle");
        assert_eq!(calls[1].1, None);
        assert_eq!(calls[2].1.as_deref(), Some("fresh-token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_refresh_token_is_stored() {
        let refresher = Arc::new(FakeRefresher {
            result: Ok(RefreshedToken {
                access_token: "fresh".into(),
                refresh_token: Some("rotated".into()),
            }),
            calls: Mutex::new(Vec::new()),
        });
        let h = harness(
            vec![Err(FetchError::Unauthorized), Ok(None)],
            refresher,
            None,
        );

        h.engine.run().await.unwrap();

        assert_eq!(h.session.refresh_token().await.as_deref(), Some("rotated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_is_transient() {
        let h = harness(
            vec![Err(FetchError::Unauthorized), Ok(Some(snapshot("a", 0, true)))],
            FakeRefresher::failing(),
            None,
        );

        assert_eq!(h.engine.run().await, Ok(()));

        assert_eq!(h.sink.names(), ["playback_resumed"]);
        // No retry after the failed refresh; the third call ends the script
        let calls = h.source.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].0 - calls[0].0, INTERVAL);
        assert_eq!(h.refresher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unauthorized_does_not_refresh_again() {
        let h = harness(
            vec![
                Err(FetchError::Unauthorized),
                Err(FetchError::Unauthorized),
                Ok(Some(snapshot("a", 0, true))),
            ],
            FakeRefresher::ok("fresh"),
            None,
        );

        h.engine.run().await.unwrap();

        assert_eq!(h.refresher.call_count(), 1);
        let calls = h.source.calls();
        assert_eq!(calls[2].0 - calls[1].0, INTERVAL);
        assert_eq!(h.sink.names(), ["playback_resumed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_policy_stops_loop() {
        let h = harness(
            vec![
                Err(FetchError::Unauthorized),
                Err(FetchError::Unauthorized),
                Err(FetchError::Unauthorized),
            ],
            FakeRefresher::failing(),
            Some(2),
        );

        assert_eq!(
            h.engine.run().await,
            Err(PollError::RefreshExhausted { attempts: 2 })
        );
        assert_eq!(h.source.calls().len(), 2);
        assert!(!h.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_fetch_resets_refresh_failures() {
        let h = harness(
            vec![
                Err(FetchError::Unauthorized),
                Ok(None),
                Err(FetchError::Unauthorized),
                Ok(None),
            ],
            FakeRefresher::failing(),
            Some(2),
        );

        assert_eq!(h.engine.run().await, Ok(()));
        assert_eq!(h.refresher.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_refresh_credential_is_transient() {
        let h = harness(
            vec![Err(FetchError::Unauthorized), Ok(Some(snapshot("a", 0, true)))],
            FakeRefresher::ok("unused"),
            None,
        );
        h.session.logout().await;

        h.engine.run().await.unwrap();

        assert_eq!(h.refresher.call_count(), 0);
        assert_eq!(h.sink.names(), ["playback_resumed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_continues() {
        let h = harness(
            vec![
                Ok(Some(snapshot("a", 0, true))),
                Err(FetchError::Transport("connection reset".into())),
                Ok(Some(snapshot("a", 2_000, false))),
            ],
            FakeRefresher::ok("unused"),
            None,
        );

        h.engine.run().await.unwrap();

        assert_eq!(
            h.sink.names(),
            ["playback_resumed", "playback_paused", "progress_updated"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_follows_latest_snapshot() {
        let h = harness(
            vec![Ok(Some(snapshot("a", 1_000, true))), Ok(Some(snapshot("a", 42_000, false)))],
            FakeRefresher::ok("unused"),
            None,
        );
        let estimator = h.engine.estimator();

        h.engine.run().await.unwrap();

        let baseline = estimator.baseline().unwrap();
        assert_eq!(baseline.progress_ms, 42_000);
        assert!(!baseline.is_playing);
    }

    /// Stops the engine while its request is in flight
    struct StopDuringFetch {
        cancel_token: CancellationToken,
    }

    #[async_trait]
    impl PlaybackSource for StopDuringFetch {
        fn name(&self) -> &'static str {
            "racy"
        }

        async fn fetch_current(&self, _session: &Session) -> Result<Option<Snapshot>, FetchError> {
            self.cancel_token.cancel();
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(snapshot("a", 0, true)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_stop_is_discarded() {
        let cancel_token = CancellationToken::new();
        let sink = Arc::new(RecordingSink::default());
        let engine = PollingEngine::new(
            Arc::new(StopDuringFetch {
                cancel_token: cancel_token.clone(),
            }),
            FakeRefresher::ok("unused"),
            Arc::new(Session::new()),
            sink.clone(),
            &config(None),
        )
        .with_cancel_token(cancel_token);
        let estimator = engine.estimator();

        assert_eq!(engine.run().await, Ok(()));

        assert!(sink.names().is_empty());
        assert!(estimator.baseline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_is_rejected() {
        let h = harness(vec![Ok(None); 1_000], FakeRefresher::ok("unused"), None);
        let engine = Arc::new(h.engine);

        let handle = Arc::clone(&engine).start();
        tokio::task::yield_now().await;
        assert!(engine.is_running());
        assert_eq!(engine.run().await, Err(PollError::AlreadyRunning));

        engine.stop();
        assert_eq!(handle.await.unwrap(), Ok(()));
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleep() {
        let h = harness(vec![Ok(None); 1_000], FakeRefresher::ok("unused"), None);
        let engine = Arc::new(h.engine);

        let handle = Arc::clone(&engine).start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        engine.stop();
        handle.await.unwrap().unwrap();

        assert_eq!(h.source.calls().len(), 3);
    }
}
