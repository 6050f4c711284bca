//! qtj-ap runtime settings
//!
//! The controller does not read the TOML file itself. The binary resolves
//! [`TomlConfig`] through `qtj_common::config` and hands the player section
//! over as [`PlayerSettings`].

use qtj_common::config::{PlayerConfig, TomlConfig, DEFAULT_RECITER};
use std::time::Duration;

/// Tunables the playback controller is constructed with
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// Substituted for empty, whitespace or `"default"` editions
    pub default_reciter: String,
    /// Initial playback rate
    pub playback_speed: f64,
    /// Initial repeat flag
    pub repeat: bool,
    /// Deadline for a load to become playable
    pub load_timeout: Duration,
    /// Position refresh period while playing
    pub position_poll_interval: Duration,
    /// Pause between unloading the old source and loading the new one
    pub teardown_settle: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_reciter: DEFAULT_RECITER.to_string(),
            playback_speed: 1.0,
            repeat: false,
            load_timeout: Duration::from_secs(10),
            position_poll_interval: Duration::from_millis(100),
            teardown_settle: Duration::from_millis(50),
        }
    }
}

impl From<&PlayerConfig> for PlayerSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            default_reciter: config.default_reciter.clone(),
            playback_speed: config.playback_speed,
            repeat: config.repeat,
            load_timeout: config.load_timeout(),
            position_poll_interval: config.position_poll_interval(),
            teardown_settle: config.teardown_settle(),
        }
    }
}

impl From<&TomlConfig> for PlayerSettings {
    fn from(config: &TomlConfig) -> Self {
        Self::from(&config.player)
    }
}

impl PlayerSettings {
    /// Normalize a caller-supplied edition, falling back to the default reciter
    ///
    /// Returns the edition to use and whether the fallback was applied.
    pub fn normalize_edition<'a>(&'a self, edition: &'a str) -> (&'a str, bool) {
        let trimmed = edition.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("default") {
            (self.default_reciter.as_str(), true)
        } else {
            (trimmed, false)
        }
    }
}
