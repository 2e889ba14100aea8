//! Record database configuration files.
//!
//! A database file lists the records to create, in creation order, each
//! with its driver type and configured field values.
//!
//! The configuration system consists of three layers:
//!
//! 1. **Schema** - Rust types for the file, with per-field `serde_valid` rules
//! 2. **Validation** - Cross-record rules (name syntax, uniqueness)
//! 3. **Loader** - Functions to load and validate files
//!
//! # Example Configuration
//!
//! ```toml
//! [[record]]
//! name = "ctrl"
//! type = "soft_dio_controller"
//!
//! [[record]]
//! name = "shutter_bit"
//! type = "controller_output"
//! fields = { controller = "ctrl", port = "a" }
//!
//! [[record]]
//! name = "theta"
//! type = "soft_motor"
//! fields = { speed = 1000.0, scale = 0.001, backlash_correction = -0.05 }
//! ```

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    load_all_databases, load_database_config, load_database_config_from_str, ConfigLoadError,
};
pub use schema::{DatabaseConfig, RecordConfig};

/// Generate the JSON Schema of a record database file.
pub fn generate_json_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(DatabaseConfig);
    serde_json::to_string_pretty(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_json_schema() {
        let schema = generate_json_schema().unwrap();
        assert!(schema.contains("DatabaseConfig"));
        assert!(schema.contains("RecordConfig"));
    }
}
