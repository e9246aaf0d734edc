//! Configuration structures for the scheduler and clock objects.
//!
//! Supports TOML deserialization with defaults that match the host's
//! built-in behavior, so an empty file is a valid configuration.

use crate::conditions::DEFAULT_CONDITION_CAPACITY;
use crate::time::{Millis, DEFAULT_GRAIN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Scheduler configuration.
    pub scheduler: SchedulerConfig,

    /// Ramp defaults.
    pub line: LineConfig,

    /// Condition log sizing.
    pub conditions: ConditionConfig,
}

/// Where the scheduler reads the current time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    /// Time only moves when the host advances it explicitly.
    #[default]
    Logical,
    /// Time follows the process monotonic clock.
    Monotonic,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time source driving the scheduler.
    pub time_source: TimeSourceKind,

    /// How long a polling host sleeps when no timer is due.
    #[serde(with = "humantime_serde")]
    pub idle_sleep: Duration,

    /// Maximum callbacks fired at one instant within a single advance.
    /// Protects the host from a handler that keeps re-arming at zero delay.
    pub max_fires_per_advance: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_source: TimeSourceKind::Logical,
            idle_sleep: Duration::from_millis(1),
            max_fires_per_advance: 100_000,
        }
    }
}

/// Ramp defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Polling granularity used when a ramp is created without one.
    pub grain_ms: Millis,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            grain_ms: DEFAULT_GRAIN,
        }
    }
}

/// Condition log sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    /// Conditions retained per object before the oldest is overwritten.
    pub capacity: usize,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CONDITION_CAPACITY,
        }
    }
}

impl TempoConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as a humantime string such as `"5ms"`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    /// Deserialize a humantime string into a duration.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a valid humantime duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
