//! Loading record database files.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mx_hardware::config::loader::{load_database_config, load_all_databases};
//! use std::path::Path;
//!
//! // Load a single database file
//! let config = load_database_config(Path::new("config/databases/bench.toml"))?;
//!
//! // Load every database file in a directory
//! let databases = load_all_databases(Path::new("config/databases/"))?;
//! ```

use super::schema::DatabaseConfig;
use super::validation::validate_database_config;
use anyhow::{Context, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde_valid::Validate;
use std::path::Path;
use tracing::{debug, info, warn};

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// File read error
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    /// Parse error (invalid TOML)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Cross-record validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Per-field schema validation error
    #[error("Schema validation failed:\n{0}")]
    SchemaValidationError(String),
}

/// Load a record database file.
///
/// The file is deserialized, then checked with the `serde_valid` schema
/// rules and the cross-record rules (name syntax, uniqueness, field value
/// shapes).
pub fn load_database_config(path: &Path) -> Result<DatabaseConfig> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
    }

    debug!("Loading record database from: {}", path.display());

    let figment = Figment::new().merge(Toml::file(path));

    let config: DatabaseConfig = figment
        .extract()
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    check(&config)?;

    info!(
        "Loaded record database {} ({} records)",
        path.display(),
        config.records.len()
    );

    Ok(config)
}

/// Load every record database file in a directory.
///
/// Files that fail to load are logged as warnings and skipped.
pub fn load_all_databases(dir: &Path) -> Result<Vec<DatabaseConfig>> {
    if !dir.exists() {
        return Err(ConfigLoadError::NotFound(dir.display().to_string()).into());
    }

    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Path is not a directory: {}",
            dir.display()
        ));
    }

    debug!("Loading all record databases from: {}", dir.display());

    let mut configs = Vec::new();

    let mut paths = Vec::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConfigLoadError::ReadError(format!("{}: {}", dir.display(), e)))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        match load_database_config(&path) {
            Ok(config) => configs.push(config),
            Err(e) => warn!("Failed to load config {}: {}", path.display(), e),
        }
    }

    info!(
        "Loaded {} record databases from {}",
        configs.len(),
        dir.display()
    );

    Ok(configs)
}

/// Load a record database from a TOML string.
pub fn load_database_config_from_str(toml_content: &str) -> Result<DatabaseConfig> {
    let config: DatabaseConfig = toml::from_str(toml_content)
        .map_err(|e| ConfigLoadError::ParseError(e.to_string()))
        .with_context(|| "Failed to parse TOML content")?;

    check(&config)?;
    Ok(config)
}

fn check(config: &DatabaseConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        let error_messages: Vec<String> =
            errors.to_string().lines().map(|s| s.to_string()).collect();
        return Err(ConfigLoadError::SchemaValidationError(error_messages.join("\n")).into());
    }

    if let Err(errors) = validate_database_config(config) {
        return Err(ConfigLoadError::ValidationError(errors.join("\n")).into());
    }
    Ok(())
}
