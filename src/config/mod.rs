//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `nearby` binary)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NearbyError, Result};

/// Default service id advertised and discovered on.
pub const DEFAULT_SERVICE_ID: &str = "nearby.session";

/// Default local name shown to peers.
pub const DEFAULT_LOCAL_NAME: &str = "nearby-device";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Session identity
    #[serde(default)]
    pub session: SessionConfig,

    /// Owner task channel sizing
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config file location (`<config dir>/nearby/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nearby").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| NearbyError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| NearbyError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(service_id) = std::env::var("NEARBY_SERVICE_ID") {
            config.session.service_id = service_id;
        }
        if let Ok(local_name) = std::env::var("NEARBY_LOCAL_NAME") {
            config.session.local_name = local_name;
        }
        if let Ok(val) = std::env::var("NEARBY_EVENT_BUFFER") {
            if let Ok(val) = val.parse() {
                config.runtime.event_buffer = val;
            }
        }
        if let Ok(level) = std::env::var("NEARBY_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// Load the file at `path` (or the default path when it exists), then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(path)?,
                _ => Self::default(),
            },
        };

        Ok(base.merge(Self::from_env()))
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        let session_default = SessionConfig::default();
        let runtime_default = RuntimeConfig::default();
        let logging_default = LoggingConfig::default();

        Self {
            session: SessionConfig {
                service_id: pick(
                    self.session.service_id,
                    other.session.service_id,
                    &session_default.service_id,
                ),
                local_name: pick(
                    self.session.local_name,
                    other.session.local_name,
                    &session_default.local_name,
                ),
            },
            runtime: RuntimeConfig {
                command_buffer: pick(
                    self.runtime.command_buffer,
                    other.runtime.command_buffer,
                    &runtime_default.command_buffer,
                ),
                event_buffer: pick(
                    self.runtime.event_buffer,
                    other.runtime.event_buffer,
                    &runtime_default.event_buffer,
                ),
                notice_buffer: pick(
                    self.runtime.notice_buffer,
                    other.runtime.notice_buffer,
                    &runtime_default.notice_buffer,
                ),
            },
            logging: LoggingConfig {
                level: pick(self.logging.level, other.logging.level, &logging_default.level),
                json: self.logging.json || other.logging.json,
            },
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn pick<T: PartialEq>(base: T, other: T, default: &T) -> T {
    if other != *default {
        other
    } else {
        base
    }
}

/// Identity used when advertising and discovering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Service id shared by every peer of this application
    pub service_id: String,

    /// Name shown to remote peers
    pub local_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID.to_string(),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
        }
    }
}

/// Channel capacities of the session owner task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Queued commands from session handles
    pub command_buffer: usize,

    /// Queued transport events
    pub event_buffer: usize,

    /// Notices retained for lagging subscribers
    pub notice_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            event_buffer: 128,
            notice_buffer: 128,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
