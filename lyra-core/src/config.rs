use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyraConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider-specific sections (`[providers.<name>]`), parsed by the
    /// crates that own them
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between two polls in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Stop polling after this many consecutive failed token refreshes.
    /// `None` keeps retrying forever.
    #[serde(default)]
    pub max_consecutive_refresh_failures: Option<u32>,
}

const fn default_interval_ms() -> u64 {
    1000
}

impl PollingConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_consecutive_refresh_failures: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider priority: providers are tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<LyricsProviderType>,
    /// Shift applied to the estimated position before line lookup.
    /// Positive values show lines earlier.
    #[serde(default)]
    pub offset_ms: i64,
}

fn default_providers() -> Vec<LyricsProviderType> {
    vec![LyricsProviderType::Lrclib, LyricsProviderType::LyricsOvh]
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            offset_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsProviderType {
    Lrclib,
    LyricsOvh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Render loop ticks per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Never estimate a position past the end of the track
    #[serde(default)]
    pub clamp_to_duration: bool,
}

const fn default_frame_rate() -> u32 {
    60
}

impl DisplayConfig {
    /// Time between two render ticks
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            clamp_to_duration: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `~/.config/lyra/lyra.log`
    #[serde(default)]
    pub enabled: bool,
}

/// Dynamic `[providers.*]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Deserialize the section for `name`, `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] if the section does not match `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0
            .get(name)
            .map(|value| {
                value.clone().try_into().map_err(|e: toml::de::Error| CoreError::ConfigInvalid {
                    message: format!("providers.{name}: {}", e.message()),
                })
            })
            .transpose()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl LyraConfig {
    /// Get the configuration directory path (~/.config/lyra/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/lyra/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from file or create template on first run
    ///
    /// `provider_templates` are appended to the base template when the file
    /// has to be created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or
    /// an error if the file cannot be read, parsed or validated.
    pub fn load_or_create(provider_templates: Option<&[&str]>) -> Result<Self> {
        Self::load_or_create_at(&Self::config_path(), provider_templates)
    }

    /// Like [`load_or_create`](Self::load_or_create) with an explicit path
    ///
    /// # Errors
    ///
    /// See [`load_or_create`](Self::load_or_create).
    pub fn load_or_create_at(path: &Path, provider_templates: Option<&[&str]>) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, build_config_template(provider_templates))?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "polling.interval_ms must be greater than 0".into(),
            });
        }
        if self.display.frame_rate == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "display.frame_rate must be greater than 0".into(),
            });
        }
        if self.polling.max_consecutive_refresh_failures == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "polling.max_consecutive_refresh_failures must be at least 1".into(),
            });
        }
        Ok(())
    }
}

const BASE_CONFIG_TEMPLATE: &str = r#"# Lyra Configuration
# ~/.config/lyra/config.toml

[polling]
# Delay between two now-playing requests
interval_ms = 1000
# Stop the poller after this many consecutive failed refreshes (omit = never)
# max_consecutive_refresh_failures = 10

[lyrics]
# Providers are tried in order; first result with lyrics wins
# Available: "lrclib", "lyrics_ovh"
providers = ["lrclib", "lyrics_ovh"]
# Shift lyric timing in milliseconds (positive = earlier)
offset_ms = 0

[display]
frame_rate = 60
# Never estimate a position past the end of the track
clamp_to_duration = false

[logging]
# Also write logs to ~/.config/lyra/lyra.log
enabled = false

"#;

/// Build the full config template from the base section and provider sections
#[must_use]
pub fn build_config_template(provider_templates: Option<&[&str]>) -> String {
    let mut template = String::from(BASE_CONFIG_TEMPLATE);
    for section in provider_templates.unwrap_or_default() {
        template.push_str(section);
    }
    template
}
