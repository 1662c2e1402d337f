//! Memory manager configuration.
//!
//! Limits, thresholds and cleanup fractions for the resource registry. The
//! configuration can be loaded from a TOML file, from environment variables,
//! or created programmatically. Every option has a safe default.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Shortest monitor interval; anything below is raised to it.
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for the resource registry and its monitor thread.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    /// Hard cap on process resident memory in bytes; exceeding it triggers
    /// an emergency cleanup
    pub memory_limit_bytes: u64,
    /// Advisory budget for all cached data in bytes
    pub cache_limit_bytes: u64,
    /// Pressure (0.0 to 1.0) above which the monitor starts evicting
    pub cleanup_threshold: f64,
    /// Interval between two monitor samples
    pub monitor_interval: Duration,
    /// Fraction of tracked bytes freed by a cleanup without explicit target
    pub default_cleanup_fraction: f64,
    /// Fraction of tracked bytes freed when pressure crosses the threshold
    pub pressure_cleanup_fraction: f64,
    /// Fraction of tracked bytes freed when the hard limit is exceeded
    pub emergency_cleanup_fraction: f64,
    /// Upper bound on how long shutdown waits for the monitor thread
    pub shutdown_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 512 * MB,
            cache_limit_bytes: 256 * MB,
            cleanup_threshold: 0.8,
            monitor_interval: Duration::from_secs(5),
            default_cleanup_fraction: 0.25,
            pressure_cleanup_fraction: 0.3,
            emergency_cleanup_fraction: 0.5,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl MemoryConfig {
    /// Creates a configuration with the given limits in megabytes.
    ///
    /// # Arguments
    /// * `memory_limit_mb` - Process memory hard cap in megabytes
    /// * `cache_limit_mb` - Advisory cache budget in megabytes
    pub fn new(memory_limit_mb: u64, cache_limit_mb: u64) -> Self {
        Self {
            memory_limit_bytes: memory_limit_mb.saturating_mul(MB),
            cache_limit_bytes: cache_limit_mb.saturating_mul(MB),
            ..Default::default()
        }
    }

    /// Sets the process memory hard cap in megabytes.
    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the advisory cache budget in megabytes.
    pub fn with_cache_limit_mb(mut self, mb: u64) -> Self {
        self.cache_limit_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the cleanup threshold (0.0 to 1.0). NaN is ignored.
    pub fn with_cleanup_threshold(mut self, threshold: f64) -> Self {
        self.cleanup_threshold = clamp_unit(threshold, self.cleanup_threshold);
        self
    }

    /// Sets the monitor sampling interval, at least [`MIN_MONITOR_INTERVAL`].
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval.max(MIN_MONITOR_INTERVAL);
        self
    }

    /// Sets the fraction freed by a cleanup without explicit target.
    pub fn with_default_cleanup_fraction(mut self, fraction: f64) -> Self {
        self.default_cleanup_fraction = clamp_unit(fraction, self.default_cleanup_fraction);
        self
    }

    /// Sets the fraction freed when pressure crosses the threshold.
    pub fn with_pressure_cleanup_fraction(mut self, fraction: f64) -> Self {
        self.pressure_cleanup_fraction = clamp_unit(fraction, self.pressure_cleanup_fraction);
        self
    }

    /// Sets the fraction freed by an emergency cleanup.
    pub fn with_emergency_cleanup_fraction(mut self, fraction: f64) -> Self {
        self.emergency_cleanup_fraction = clamp_unit(fraction, self.emergency_cleanup_fraction);
        self
    }

    /// Sets how long shutdown waits for the monitor thread.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Returns the process memory hard cap in megabytes.
    pub fn memory_limit_mb(&self) -> u64 {
        self.memory_limit_bytes / MB
    }

    /// Returns the advisory cache budget in megabytes.
    pub fn cache_limit_mb(&self) -> u64 {
        self.cache_limit_bytes / MB
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `COLOR_PICKER_MEMORY_LIMIT_MB`: process hard cap in MB (default: 512)
    /// - `COLOR_PICKER_CACHE_LIMIT_MB`: advisory cache budget in MB (default: 256)
    /// - `COLOR_PICKER_CLEANUP_THRESHOLD`: pressure threshold (default: 0.8)
    /// - `COLOR_PICKER_MONITOR_INTERVAL_SECS`: sampling interval in seconds (default: 5)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(mb) = env_value::<u64>("COLOR_PICKER_MEMORY_LIMIT_MB")? {
            config.memory_limit_bytes = megabytes("COLOR_PICKER_MEMORY_LIMIT_MB", mb)?;
        }

        if let Some(mb) = env_value::<u64>("COLOR_PICKER_CACHE_LIMIT_MB")? {
            config.cache_limit_bytes = megabytes("COLOR_PICKER_CACHE_LIMIT_MB", mb)?;
        }

        if let Some(threshold) = env_value::<f64>("COLOR_PICKER_CLEANUP_THRESHOLD")? {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue(
                    "COLOR_PICKER_CLEANUP_THRESHOLD".to_string(),
                ));
            }
            config.cleanup_threshold = threshold;
        }

        if let Some(secs) = env_value::<f64>("COLOR_PICKER_MONITOR_INTERVAL_SECS")? {
            config.monitor_interval = interval("COLOR_PICKER_MONITOR_INTERVAL_SECS", secs)?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// memory_limit_mb = 512
    /// cache_limit_mb = 256
    /// cleanup_threshold = 0.8
    /// monitor_interval_seconds = 5.0
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        file.into_config()
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = self.to_toml()?;
        fs::write(path.as_ref(), toml)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let file = ConfigFile::from(self);
        Ok(toml::to_string(&file)?)
    }
}

/// On-disk representation; sizes are in megabytes and intervals in seconds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_limit_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_limit_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cleanup_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    monitor_interval_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_cleanup_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure_cleanup_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emergency_cleanup_fraction: Option<f64>,
}

impl ConfigFile {
    fn into_config(self) -> Result<MemoryConfig, ConfigError> {
        let mut config = MemoryConfig::default();

        if let Some(mb) = self.memory_limit_mb {
            config.memory_limit_bytes = megabytes("memory_limit_mb", mb)?;
        }
        if let Some(mb) = self.cache_limit_mb {
            config.cache_limit_bytes = megabytes("cache_limit_mb", mb)?;
        }
        if let Some(threshold) = self.cleanup_threshold {
            config.cleanup_threshold = unit_fraction("cleanup_threshold", threshold)?;
        }
        if let Some(secs) = self.monitor_interval_seconds {
            config.monitor_interval = interval("monitor_interval_seconds", secs)?;
        }
        if let Some(fraction) = self.default_cleanup_fraction {
            config.default_cleanup_fraction = unit_fraction("default_cleanup_fraction", fraction)?;
        }
        if let Some(fraction) = self.pressure_cleanup_fraction {
            config.pressure_cleanup_fraction =
                unit_fraction("pressure_cleanup_fraction", fraction)?;
        }
        if let Some(fraction) = self.emergency_cleanup_fraction {
            config.emergency_cleanup_fraction =
                unit_fraction("emergency_cleanup_fraction", fraction)?;
        }

        Ok(config)
    }
}

impl From<&MemoryConfig> for ConfigFile {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            memory_limit_mb: Some(config.memory_limit_mb()),
            cache_limit_mb: Some(config.cache_limit_mb()),
            cleanup_threshold: Some(config.cleanup_threshold),
            monitor_interval_seconds: Some(config.monitor_interval.as_secs_f64()),
            default_cleanup_fraction: Some(config.default_cleanup_fraction),
            pressure_cleanup_fraction: Some(config.pressure_cleanup_fraction),
            emergency_cleanup_fraction: Some(config.emergency_cleanup_fraction),
        }
    }
}

fn unit_fraction(key: &str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(key.to_string()))
    }
}

fn clamp_unit(value: f64, current: f64) -> f64 {
    if value.is_nan() {
        current
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn megabytes(key: &str, mb: u64) -> Result<u64, ConfigError> {
    mb.checked_mul(MB)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

/// Zero, negative and non-finite intervals are rejected; short ones are
/// raised to [`MIN_MONITOR_INTERVAL`].
fn interval(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval.max(MIN_MONITOR_INTERVAL)),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing the configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed TOML
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Configuration could not be rendered as TOML
    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
