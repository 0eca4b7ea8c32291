//! Configuration management for the Garo Wallbox bridge
//!
//! This module handles loading, validation and saving of the application
//! configuration from YAML files.

use crate::error::{GaroError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Default locations searched when no path is given on the command line
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "garo_wallbox.yaml",
    "/data/garo_wallbox.yaml",
    "/etc/garo-wallbox/config.yaml",
];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct Config {
    /// Wallbox connection configuration
    pub device: DeviceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Polling and command limits
    pub controls: ControlsConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

/// Wallbox connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct DeviceConfig {
    /// IP address or host name of the wallbox
    pub host: String,

    /// Friendly name; defaults to "<model> (<host>)"
    pub name: Option<String>,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-only level override
    pub console_level: Option<String>,

    /// Optional file-only level override
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Polling and command limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ControlsConfig {
    /// Max attempts for a single device request before giving up
    pub max_retries: u32,

    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Minimum time between two throttled status updates
    pub min_update_interval_ms: u64,

    /// Lowest accepted current limit in amperes
    pub min_current_limit: u32,

    /// Highest accepted current limit when the wallbox does not report one
    pub max_current_limit: u32,
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from an explicit path or the default locations
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for path in &DEFAULT_CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(GaroError::validation(
                "device.host",
                "Host cannot be empty",
            ));
        }

        if self.device.host.contains('/') || self.device.host.contains(char::is_whitespace) {
            return Err(GaroError::validation(
                "device.host",
                "Host must be a bare IP address or host name",
            ));
        }

        if self.device.request_timeout_ms == 0 {
            return Err(GaroError::validation(
                "device.request_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(GaroError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.controls.max_retries == 0 {
            return Err(GaroError::validation(
                "controls.max_retries",
                "Must be at least 1",
            ));
        }

        if self.controls.min_current_limit == 0 {
            return Err(GaroError::validation(
                "controls.min_current_limit",
                "Must be positive",
            ));
        }

        if self.controls.min_current_limit > self.controls.max_current_limit {
            return Err(GaroError::validation(
                "controls.max_current_limit",
                "Must not be below controls.min_current_limit",
            ));
        }

        if self.web.port == 0 {
            return Err(GaroError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, 30_000);
        assert_eq!(config.web.port, 8088);
        assert_eq!(config.controls.min_current_limit, 6);
        assert!(config.device.name.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.device.host = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.device.host = "http://192.168.1.50".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.controls.min_current_limit = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "device:\n  host: 10.0.0.7\n  name: Garage Charger\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device.host, "10.0.0.7");
        assert_eq!(config.device.name.as_deref(), Some("Garage Charger"));
        assert_eq!(config.device.request_timeout_ms, 10_000);
        assert_eq!(config.logging.level, "INFO");
    }
}
