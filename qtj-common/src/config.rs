//! Configuration loading
//!
//! Bootstrap configuration comes from a single TOML file. The file is
//! located by priority:
//! 1. Explicit path (command-line argument)
//! 2. `QTJ_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/qtj/config.toml` on Linux)
//! 4. Compiled defaults
//!
//! A missing file is never fatal: a warning is logged and defaults are used.
//! A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "QTJ_CONFIG";

/// Reciter used when a caller passes an empty or placeholder edition
pub const DEFAULT_RECITER: &str = "ar.alafasy";

/// Base URL the alignment JSON files are served under
pub const DEFAULT_ALIGNMENT_SOURCE: &str = "https://www.quran.tj/data";

/// Tajik translation audio listing service
pub const DEFAULT_TAJIK_AUDIO_API: &str = "https://orange-salad-3850.zabirovms.workers.dev";

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Playback controller tuning (optional)
    #[serde(default)]
    pub player: PlayerConfig,

    /// Data sources and persistence locations (optional)
    #[serde(default)]
    pub data: DataConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Playback controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Edition substituted for empty or `"default"` editions
    #[serde(default = "default_reciter")]
    pub default_reciter: String,

    /// Initial playback rate multiplier
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,

    /// Initial repeat flag
    #[serde(default)]
    pub repeat: bool,

    /// How long a load may take to become playable
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Position refresh interval while playing
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,

    /// Pause after unloading the previous source before loading the next
    #[serde(default = "default_teardown_settle_ms")]
    pub teardown_settle_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_reciter: default_reciter(),
            playback_speed: default_playback_speed(),
            repeat: false,
            load_timeout_ms: default_load_timeout_ms(),
            position_poll_interval_ms: default_position_poll_interval_ms(),
            teardown_settle_ms: default_teardown_settle_ms(),
        }
    }
}

impl PlayerConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn teardown_settle(&self) -> Duration {
        Duration::from_millis(self.teardown_settle_ms)
    }
}

/// Data sources and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory or http(s) base URL holding `reciters-wbw-timestamps/`
    #[serde(default = "default_alignment_source")]
    pub alignment_source: String,

    /// Base URL of the Tajik translation audio listing
    #[serde(default = "default_tajik_audio_api")]
    pub tajik_audio_api: String,

    /// How long the Tajik audio listing stays fresh
    #[serde(default = "default_tajik_cache_ttl_secs")]
    pub tajik_cache_ttl_secs: u64,

    /// Where the last played target is stored (defaults under the data dir)
    #[serde(default)]
    pub last_played_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            alignment_source: default_alignment_source(),
            tajik_audio_api: default_tajik_audio_api(),
            tajik_cache_ttl_secs: default_tajik_cache_ttl_secs(),
            last_played_path: None,
        }
    }
}

impl DataConfig {
    pub fn tajik_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tajik_cache_ttl_secs)
    }

    /// Configured last-played file, or `<data dir>/last_played.json`
    pub fn last_played_path(&self) -> PathBuf {
        self.last_played_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("last_played.json"))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reciter() -> String {
    DEFAULT_RECITER.to_string()
}

fn default_playback_speed() -> f64 {
    1.0
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_position_poll_interval_ms() -> u64 {
    100
}

fn default_teardown_settle_ms() -> u64 {
    50
}

fn default_alignment_source() -> String {
    DEFAULT_ALIGNMENT_SOURCE.to_string()
}

fn default_tajik_audio_api() -> String {
    DEFAULT_TAJIK_AUDIO_API.to_string()
}

fn default_tajik_cache_ttl_secs() -> u64 {
    3600
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.player.default_reciter.trim().is_empty() {
            return Err(Error::Config("player.default_reciter must not be empty".to_string()));
        }
        if !(self.player.playback_speed.is_finite() && self.player.playback_speed > 0.0) {
            return Err(Error::Config(format!(
                "player.playback_speed must be positive, got {}",
                self.player.playback_speed
            )));
        }
        if self.player.load_timeout_ms == 0 {
            return Err(Error::Config("player.load_timeout_ms must be > 0".to_string()));
        }
        if self.player.position_poll_interval_ms == 0 {
            return Err(Error::Config("player.position_poll_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Locates and loads the TOML configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Path to use, following the priority order; `None` means defaults
    pub fn locate(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config file, only if present
        default_config_path().filter(|path| path.exists())
    }

    /// Load the located file, falling back to defaults when it is missing
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.locate() else {
            info!("No config file found, using built-in defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(TomlConfig::default());
        }

        info!("Loading configuration from {}", path.display());
        TomlConfig::load(&path)
    }
}

/// Platform config file location (`<config dir>/qtj/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qtj").join("config.toml"))
}

/// OS-dependent data directory for persisted player files
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qtj"))
        .unwrap_or_else(|| PathBuf::from("./qtj_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.player.default_reciter, "ar.alafasy");
        assert_eq!(config.player.playback_speed, 1.0);
        assert!(!config.player.repeat);
        assert_eq!(config.player.load_timeout(), Duration::from_secs(10));
        assert_eq!(config.player.position_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.player.teardown_settle(), Duration::from_millis(50));
        assert_eq!(config.data.tajik_cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = TomlConfig::from_toml_str(
            r#"
            [player]
            playback_speed = 1.25
            repeat = true

            [data]
            alignment_source = "/srv/quran/data"
            "#,
        )
        .unwrap();

        assert_eq!(config.player.playback_speed, 1.25);
        assert!(config.player.repeat);
        assert_eq!(config.player.default_reciter, "ar.alafasy");
        assert_eq!(config.data.alignment_source, "/srv/quran/data");
        assert_eq!(config.data.tajik_audio_api, DEFAULT_TAJIK_AUDIO_API);
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        let result = TomlConfig::from_toml_str("[player]\nplayback_speed = 0.0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = TomlConfig::from_toml_str("[player\nrepeat = true");
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_last_played_path_override() {
        let data = DataConfig {
            last_played_path: Some(PathBuf::from("/tmp/lp.json")),
            ..Default::default()
        };
        assert_eq!(data.last_played_path(), PathBuf::from("/tmp/lp.json"));

        let default_path = DataConfig::default().last_played_path();
        assert!(default_path.ends_with("last_played.json"));
    }
}
