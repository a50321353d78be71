mod render;

use crate::render::LinePrinter;
use lyra_core::{
    CoreError, EventSink, LyraConfig, LyricSyncEngine, LyricsFetcher, LyricsProvider,
    LyricsProviderType, PlaybackEvent, PlaybackEvents, PollError, PollingEngine, Session,
};
use lyra_lyrics_lrclib::LrclibProvider;
use lyra_lyrics_ovh::LyricsOvhProvider;
use lyra_spotify_api::{
    SPOTIFY_CONFIG_TEMPLATE, SpotifyError, SpotifyPlaybackSource, SpotifyProviderConfig,
    SpotifyTokenRefresher,
};
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Failures that end a running session
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Polling task panicked or was aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn main() {
    // Check config for logging.enabled before full config load
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let provider_templates: &[&str] = &[SPOTIFY_CONFIG_TEMPLATE];
    let config = match LyraConfig::load_or_create(Some(provider_templates)) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!("Created config template at {}", path.display());
            eprintln!(
                "A new config file was written to {}.\nFill in your Spotify client_id, client_secret and refresh_token, then run lyra again.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(CoreError::ConfigParseError(parse_error)) => {
            error!(
                "Config file {} has syntax errors: {parse_error}",
                LyraConfig::config_path().display()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let spotify_config = match validate_provider_config(&config) {
        Ok(spotify_config) => spotify_config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let Some(refresh_token) = spotify_config.resolve_refresh_token() else {
        error!(
            "No Spotify refresh token. Set providers.spotify.refresh_token in {} or the {} environment variable.",
            LyraConfig::config_path().display(),
            lyra_spotify_api::config::REFRESH_TOKEN_ENV
        );
        std::process::exit(1);
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let providers = create_providers(&config);

    let provider_names: Vec<_> = providers.iter().map(|p| p.name()).collect();
    info!(
        "Initialized {} lyrics provider(s): {:?}",
        providers.len(),
        provider_names
    );

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let result = runtime.block_on(run(
        &config,
        &spotify_config,
        refresh_token,
        providers,
        &cancel_token,
    ));

    match result {
        Ok(()) => info!("Lyra stopped"),
        Err(e) => {
            error!("Lyra stopped: {e}");
            std::process::exit(1);
        }
    }
}

/// Wire the poller, lyrics fetcher, event logger and render loop together
/// and wait for the poller to finish.
async fn run(
    config: &LyraConfig,
    spotify_config: &SpotifyProviderConfig,
    refresh_token: String,
    providers: Vec<Box<dyn LyricsProvider>>,
    cancel_token: &CancellationToken,
) -> Result<(), AppError> {
    let session = Arc::new(Session::with_refresh_token(refresh_token));
    let source = Arc::new(SpotifyPlaybackSource::new(spotify_config)?);
    let refresher = Arc::new(SpotifyTokenRefresher::new(spotify_config)?);

    let events = PlaybackEvents::new();
    let sink: Arc<dyn EventSink> = Arc::new(events.clone());

    let engine = Arc::new(
        PollingEngine::new(source, refresher, session, sink, &config.polling)
            .with_cancel_token(cancel_token.clone()),
    );

    // Subscribers attach before the poller starts so the first events are seen
    let lyrics_fetcher = Arc::new(LyricsFetcher::new(providers, Some(cancel_token.clone())));
    let fetcher_handle = Arc::clone(&lyrics_fetcher).start(&events);
    let logger_handle = tokio::spawn(log_playback_events(
        events.subscribe(),
        cancel_token.clone(),
    ));

    let progress = engine
        .estimator()
        .reader()
        .with_clamping(config.display.clamp_to_duration);
    let mut sync_engine = LyricSyncEngine::new(progress, lyrics_fetcher.subscribe())
        .with_offset_ms(config.lyrics.offset_ms);
    let frame_interval = config.display.frame_interval();
    let render_token = cancel_token.clone();
    let render_handle = tokio::spawn(async move {
        let mut printer = LinePrinter::new();
        sync_engine
            .run(frame_interval, &render_token, |active| printer.print(active))
            .await;
    });

    let poll_result = Arc::clone(&engine).start().await;

    // The poller only returns on shutdown or a fatal refresh policy; stop the rest either way
    cancel_token.cancel();
    let (fetcher_result, logger_result, render_result) =
        tokio::join!(fetcher_handle, logger_handle, render_handle);
    for (task, result) in [
        ("lyrics fetcher", fetcher_result),
        ("event logger", logger_result),
        ("render loop", render_result),
    ] {
        if let Err(e) = result {
            warn!("{task} task ended abnormally: {e}");
        }
    }

    poll_result??;
    Ok(())
}

/// Validate the Spotify provider section and return it
fn validate_provider_config(config: &LyraConfig) -> Result<SpotifyProviderConfig, CoreError> {
    let spotify_config = SpotifyProviderConfig::from_providers(&config.providers)?.ok_or_else(
        || CoreError::ConfigMissingField {
            field: "providers.spotify".into(),
        },
    )?;
    spotify_config.validate()?;
    Ok(spotify_config)
}

/// Create lyrics providers in the configured order
fn create_providers(config: &LyraConfig) -> Vec<Box<dyn LyricsProvider>> {
    config
        .lyrics
        .providers
        .iter()
        .filter_map(|provider_type| -> Option<Box<dyn LyricsProvider>> {
            match provider_type {
                LyricsProviderType::Lrclib => match LrclibProvider::new() {
                    Ok(provider) => Some(Box::new(provider)),
                    Err(e) => {
                        error!("Failed to create LRCLIB provider: {}", e);
                        None
                    }
                },
                LyricsProviderType::LyricsOvh => match LyricsOvhProvider::new() {
                    Ok(provider) => Some(Box::new(provider)),
                    Err(e) => {
                        error!("Failed to create lyrics.ovh provider: {}", e);
                        None
                    }
                },
            }
        })
        .collect()
}

/// Log playback events until shutdown
async fn log_playback_events(
    mut rx: broadcast::Receiver<PlaybackEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(PlaybackEvent::TrackChanged(snapshot)) => {
                if snapshot.is_identified() {
                    info!("Now playing: {} - {}", snapshot.artist, snapshot.track_name);
                } else {
                    info!("Now playing an unidentified item");
                }
            }
            Ok(PlaybackEvent::PlaybackResumed(snapshot)) => {
                info!("Playback resumed at {}ms", snapshot.progress_ms);
            }
            Ok(PlaybackEvent::PlaybackPaused(snapshot)) => {
                info!("Playback paused at {}ms", snapshot.progress_ms);
            }
            Ok(event @ PlaybackEvent::ProgressUpdated(_)) => {
                debug!("{}: {}ms", event.name(), event.snapshot().progress_ms);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Playback event channel closed");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} playback events", n);
            }
        }
    }
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled() -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(LyraConfig::config_path()) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing on stderr (stdout carries lyrics) with optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = lyra_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
