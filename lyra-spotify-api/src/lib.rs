pub mod auth;
pub mod config;
pub mod error;
pub mod player;

pub use auth::SpotifyTokenRefresher;
pub use config::{CONFIG_TEMPLATE as SPOTIFY_CONFIG_TEMPLATE, SpotifyProviderConfig};
pub use error::SpotifyError;
pub use player::SpotifyPlaybackSource;
