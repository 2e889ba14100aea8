//! Application configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. `config/mx.toml` (or any file given to [`MxConfig::load_from`])
//! 2. Environment variables prefixed with `RUST_MX_`; a double underscore
//!    separates section from key, e.g. `RUST_MX_APPLICATION__LOG_LEVEL=debug`
//!
//! ```toml
//! [application]
//! name = "beamline"
//! log_level = "info"
//!
//! [database]
//! path = "demo.toml"
//! poll_interval_ms = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default location of the application configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/mx.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RUST_MX_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MxConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Record database settings
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust-mx".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where the record database comes from and how often its callbacks run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Record database file; relative paths are resolved against the
    /// directory of the application configuration file
    pub path: PathBuf,
    /// Callback poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("demo.toml"),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl DatabaseSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl MxConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and the environment.
    ///
    /// Missing keys fall back to their defaults; a missing file yields the
    /// defaults plus whatever the environment sets.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        let path = path.as_ref();
        let mut config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        if config.database.path.is_relative() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                config.database.path = dir.join(&config.database.path);
            }
        }
        Ok(config)
    }

    /// Load, then validate.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = Self::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.application.name.trim().is_empty() {
            return Err("application.name must not be empty".to_string());
        }

        let level = self.application.log_level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            ));
        }

        if self.database.poll_interval_ms == 0 {
            return Err("database.poll_interval_ms must be at least 1".to_string());
        }

        if self.database.path.as_os_str().is_empty() {
            return Err("database.path must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = MxConfig::default();
        config.application.log_level = "chatty".to_string();
        assert!(config.validate().unwrap_err().contains("chatty"));

        config.application.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut config = MxConfig::default();
        config.database.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut config = MxConfig::default();
        config.application.name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
