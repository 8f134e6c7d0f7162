//! INI configuration file.
//!
//! ```ini
//! [server]
//! base_url = http://127.0.0.1:5000
//! timeout_secs = 10
//!
//! [tracking]
//! poll_interval_ms = 5000
//! updates_enabled = true
//! release_after_missing_ticks = 3
//! fetch_timeout_secs = 10
//!
//! [logging]
//! level = info
//! file =
//! ```
//!
//! A missing file yields defaults. Unknown keys are ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::{
    ClientConfig, TrackerConfig, DEFAULT_BASE_URL, DEFAULT_FETCH_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_RELEASE_AFTER_MISSING_TICKS,
};
use crate::logging::LoggingConfig;

/// Errors loading, saving, or editing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// `[tracking]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    pub poll_interval_ms: u64,
    pub updates_enabled: bool,
    pub release_after_missing_ticks: u32,
    pub fetch_timeout_secs: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub tracking: TrackingSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            },
            tracking: TrackingSettings {
                poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
                updates_enabled: true,
                release_after_missing_ticks: DEFAULT_RELEASE_AFTER_MISSING_TICKS,
                fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

/// Default configuration file location (`<config dir>/livetrack/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("livetrack")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        self.to_ini().write_to_file(path).map_err(write_error)
    }

    /// Build from a parsed INI document, starting from defaults.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Runtime configuration for the tracking engine.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::default()
            .with_poll_interval(Duration::from_millis(self.tracking.poll_interval_ms))
            .with_updates_enabled(self.tracking.updates_enabled)
            .with_fetch_timeout(Duration::from_secs(self.tracking.fetch_timeout_secs))
            .with_release_after_missing_ticks(self.tracking.release_after_missing_ticks)
    }

    /// Runtime configuration for the HTTP transport client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.server.base_url.clone())
            .with_timeout(Duration::from_secs(self.server.timeout_secs))
    }

    /// Runtime configuration for logging.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            file: self.logging.file.clone(),
            ..Default::default()
        }
    }
}

/// A settable configuration key, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ServerBaseUrl,
    ServerTimeoutSecs,
    TrackingPollIntervalMs,
    TrackingUpdatesEnabled,
    TrackingReleaseAfterMissingTicks,
    TrackingFetchTimeoutSecs,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::ServerBaseUrl,
            ConfigKey::ServerTimeoutSecs,
            ConfigKey::TrackingPollIntervalMs,
            ConfigKey::TrackingUpdatesEnabled,
            ConfigKey::TrackingReleaseAfterMissingTicks,
            ConfigKey::TrackingFetchTimeoutSecs,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::ServerBaseUrl | ConfigKey::ServerTimeoutSecs => "server",
            ConfigKey::TrackingPollIntervalMs
            | ConfigKey::TrackingUpdatesEnabled
            | ConfigKey::TrackingReleaseAfterMissingTicks
            | ConfigKey::TrackingFetchTimeoutSecs => "tracking",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::ServerBaseUrl => "base_url",
            ConfigKey::ServerTimeoutSecs => "timeout_secs",
            ConfigKey::TrackingPollIntervalMs => "poll_interval_ms",
            ConfigKey::TrackingUpdatesEnabled => "updates_enabled",
            ConfigKey::TrackingReleaseAfterMissingTicks => "release_after_missing_ticks",
            ConfigKey::TrackingFetchTimeoutSecs => "fetch_timeout_secs",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string (empty when unset).
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::ServerBaseUrl => config.server.base_url.clone(),
            ConfigKey::ServerTimeoutSecs => config.server.timeout_secs.to_string(),
            ConfigKey::TrackingPollIntervalMs => config.tracking.poll_interval_ms.to_string(),
            ConfigKey::TrackingUpdatesEnabled => config.tracking.updates_enabled.to_string(),
            ConfigKey::TrackingReleaseAfterMissingTicks => {
                config.tracking.release_after_missing_ticks.to_string()
            }
            ConfigKey::TrackingFetchTimeoutSecs => config.tracking.fetch_timeout_secs.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::ServerBaseUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(self.invalid(value, "expected an http:// or https:// URL"));
                }
                config.server.base_url = value.trim_end_matches('/').to_string();
            }
            ConfigKey::ServerTimeoutSecs => config.server.timeout_secs = self.parse_positive(value)?,
            ConfigKey::TrackingPollIntervalMs => {
                config.tracking.poll_interval_ms = self.parse_positive(value)?
            }
            ConfigKey::TrackingUpdatesEnabled => {
                config.tracking.updates_enabled = parse_bool(value)
                    .ok_or_else(|| self.invalid(value, "expected true or false"))?
            }
            ConfigKey::TrackingReleaseAfterMissingTicks => {
                config.tracking.release_after_missing_ticks = value
                    .parse()
                    .map_err(|_| self.invalid(value, "expected a non-negative integer"))?
            }
            ConfigKey::TrackingFetchTimeoutSecs => {
                config.tracking.fetch_timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::LoggingLevel => {
                const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
                let level = value.to_ascii_lowercase();
                if !LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, "expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => {
                config.logging.file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }

    fn parse_positive(&self, value: &str) -> Result<u64, ConfigError> {
        match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(self.invalid(value, "expected a positive integer")),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
