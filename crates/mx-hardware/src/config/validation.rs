//! Cross-record validation of database files.
//!
//! `serde_valid` checks each record table on its own; the rules here need
//! the whole file.

use std::collections::HashSet;

use mx_core::limits::validate_record_name;

use super::schema::DatabaseConfig;

/// Checks every record name and that no name is used twice.
///
/// Returns every problem found, not just the first.
pub fn validate_database_config(config: &DatabaseConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, record) in config.records.iter().enumerate() {
        if let Err(e) = validate_record_name(&record.name) {
            errors.push(format!("record #{}: {}", index + 1, e.message));
        }
        if !seen.insert(record.name.as_str()) {
            errors.push(format!(
                "record #{}: name '{}' is already used by an earlier record",
                index + 1,
                record.name
            ));
        }
        if let Err(e) = record.field_values() {
            errors.push(format!("record #{}: {}", index + 1, e));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RecordConfig;

    fn record(name: &str) -> RecordConfig {
        RecordConfig {
            name: name.to_string(),
            type_name: "soft_motor".to_string(),
            fields: Default::default(),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = DatabaseConfig {
            records: vec![record("m1"), record("m2"), record("m1")],
        };
        let errors = validate_database_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'m1'"));
    }

    #[test]
    fn test_bad_name_characters_rejected() {
        let config = DatabaseConfig {
            records: vec![record("has space")],
        };
        assert!(validate_database_config(&config).is_err());
    }
}
