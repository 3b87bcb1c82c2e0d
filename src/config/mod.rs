// src/config/mod.rs
//! User settings loaded from `config.toml`.
//!
//! Every field has a default, so an empty or partial file is fine. Command
//! line flags are applied on top in `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::GeometryRequest;
use crate::error::ConfigError;
use crate::ipc::DEFAULT_STALE_AFTER_SECS;
use crate::scheduler::EngineSettings;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub analysis: GeometryRequest,
    pub source: SourceConfig,
    pub modes: ModesConfig,
    pub timers: TimersConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 64,
        }
    }
}

/// Where samples come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Full segment name, e.g. `/squeezelite-b8:27:eb:00:00:01`.
    pub segment: Option<String>,
    /// Interface whose hardware address names the segment.
    pub interface: Option<String>,
    pub stale_after_secs: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            segment: None,
            interface: None,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub enabled: bool,
    /// Mode codes separated by `,` or `-`: VU, PK, SA, ST, SM, RN.
    pub list: String,
    pub downmix: bool,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            list: "RN".to_string(),
            downmix: false,
        }
    }
}

/// Periods in seconds; zero disables the cycle and toggle timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub poll_ms: u64,
    pub cycle_secs: u64,
    pub toggle_secs: u64,
    pub zero_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            poll_ms: 20,
            cycle_secs: 254,
            toggle_secs: 120,
            zero_secs: 5,
        }
    }
}

/// Longest period any timer may be configured with: one week.
pub const MAX_TIMER_SECS: u64 = 7 * 24 * 60 * 60;
/// Longest polling interval.
pub const MAX_POLL_MS: u64 = 10_000;

impl TimersConfig {
    /// Periods as durations. Values past [`MAX_TIMER_SECS`] or [`MAX_POLL_MS`]
    /// are rejected rather than handed to the timer thread.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        if self.poll_ms > MAX_POLL_MS {
            return Err(ConfigError::InvalidTimer(format!(
                "poll_ms = {} exceeds {MAX_POLL_MS}",
                self.poll_ms
            )));
        }
        for (name, secs) in [
            ("cycle_secs", self.cycle_secs),
            ("toggle_secs", self.toggle_secs),
            ("zero_secs", self.zero_secs),
        ] {
            if secs > MAX_TIMER_SECS {
                return Err(ConfigError::InvalidTimer(format!(
                    "{name} = {secs} exceeds {MAX_TIMER_SECS}"
                )));
            }
        }
        Ok(EngineSettings {
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
            cycle_every: Duration::from_secs(self.cycle_secs),
            toggle_every: Duration::from_secs(self.toggle_secs),
            zero_after: Duration::from_secs(self.zero_secs.max(1)),
        })
    }
}

impl Config {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// `$XDG_CONFIG_HOME/vissy/config.toml` or the platform equivalent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vissy")
            .join("config.toml")
    }
}

/// Default location for the log file when the preview owns the terminal.
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vissy")
        .join("vissy.log")
}
