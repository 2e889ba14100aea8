//! Building live record databases from record database files.

use std::sync::Arc;

use anyhow::Context;
use mx_core::{Clock, DriverRegistry, InitFailure, InitReport, MxError, RecordDatabase};
use mx_hardware::config::{load_database_config, DatabaseConfig};
use tracing::{info, warn};

use crate::config::MxConfig;

/// Creates every configured record in file order, then links, validates
/// and opens them.
///
/// A record that cannot be created or initialized is reported and left
/// behind; the records that do not depend on it still open.
pub fn build_database(
    config: &DatabaseConfig,
    registry: &DriverRegistry,
) -> (RecordDatabase, InitReport) {
    populate(RecordDatabase::new(), config, registry)
}

/// [`build_database`] against a caller-supplied clock.
pub fn build_database_with_clock(
    config: &DatabaseConfig,
    registry: &DriverRegistry,
    clock: Arc<dyn Clock>,
) -> (RecordDatabase, InitReport) {
    populate(RecordDatabase::with_clock(clock), config, registry)
}

/// Loads the record database file named by the application configuration
/// and builds it.
pub fn open_configured_database(
    config: &MxConfig,
    registry: &DriverRegistry,
) -> anyhow::Result<(RecordDatabase, InitReport)> {
    let path = &config.database.path;
    let database = load_database_config(path)
        .with_context(|| format!("Failed to load record database {}", path.display()))?;
    info!(
        "Loaded {} record(s) from {}",
        database.records.len(),
        path.display()
    );
    Ok(build_database(&database, registry))
}

fn populate(
    mut db: RecordDatabase,
    config: &DatabaseConfig,
    registry: &DriverRegistry,
) -> (RecordDatabase, InitReport) {
    let mut created_failures = Vec::new();

    for record in &config.records {
        let created = record
            .field_values()
            .map_err(|e| MxError::illegal_argument("create_record", format!("{:#}", e)))
            .and_then(|fields| {
                db.create_record(registry, &record.name, &record.type_name, fields)
            });
        if let Err(error) = created {
            warn!("Skipping record '{}': {}", record.name, error);
            created_failures.push(InitFailure {
                record: record.name.clone(),
                stage: "create",
                error,
            });
        }
    }

    let mut report = db.initialize();
    for failure in &report.failures {
        warn!(
            "Record '{}' failed to {}: {}",
            failure.record, failure.stage, failure.error
        );
    }
    created_failures.append(&mut report.failures);
    report.failures = created_failures;

    info!(
        "Record database ready: {} opened, {} failed",
        report.opened.len(),
        report.failures.len()
    );
    (db, report)
}
