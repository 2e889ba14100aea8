//! Record database files loaded from disk and turned into live databases.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tracing_test::traced_test;

use mx_core::class::{digital_input, digital_output, motor};
use mx_core::{DriverRegistry, RecordDatabase};
use mx_hardware::config::{load_all_databases, load_database_config, DatabaseConfig};
use mx_hardware::default_registry;

const BENCH: &str = r#"
[[record]]
name = "ctrl"
type = "soft_dio_controller"

[[record]]
name = "shutter"
type = "controller_output"
fields = { controller = "ctrl", port = "a" }

[[record]]
name = "shutter_rb"
type = "controller_input"
fields = { controller = "ctrl", port = "A" }

[[record]]
name = "theta"
type = "soft_motor"
fields = { speed = 0, scale = 0.5, offset = 10.0 }
"#;

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

fn build(config: &DatabaseConfig, registry: &DriverRegistry) -> RecordDatabase {
    let mut db = RecordDatabase::new();
    for record in &config.records {
        let fields = record.field_values().unwrap();
        db.create_record(registry, &record.name, &record.type_name, fields)
            .unwrap();
    }
    db
}

#[test]
#[traced_test]
fn test_loaded_file_builds_working_database() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bench.toml", BENCH);

    let config = load_database_config(&dir.path().join("bench.toml")).unwrap();
    assert_eq!(config.records.len(), 4);

    let registry = default_registry().unwrap();
    let mut db = build(&config, &registry);
    let report = db.initialize();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.opened.len(), 4);

    let shutter = db.find("shutter").unwrap();
    let readback = db.find("shutter_rb").unwrap();
    digital_output::write(&mut db, shutter, 1).unwrap();
    assert_eq!(digital_input::read(&mut db, readback).unwrap(), 1);

    // User position = offset + scale * raw.
    let theta = db.find("theta").unwrap();
    motor::move_absolute(&mut db, theta, 12.0).unwrap();
    assert!(!motor::is_busy(&mut db, theta).unwrap());
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 12.0);
}

#[test]
fn test_directory_load_skips_broken_and_foreign_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a_bench.toml", BENCH);
    write(dir.path(), "b_broken.toml", "[[record]]\nname = \"m\"\n");
    write(dir.path(), "notes.txt", "not a database");

    let configs = load_all_databases(dir.path()).unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].records[0].name, "ctrl");
}

#[test]
fn test_duplicate_record_names_fail_to_load() {
    let dir = TempDir::new().unwrap();
    let text = "[[record]]\nname = \"m\"\ntype = \"soft_motor\"\n\n[[record]]\nname = \"m\"\ntype = \"soft_motor\"\n";
    write(dir.path(), "dup.toml", text);

    assert!(load_database_config(&dir.path().join("dup.toml")).is_err());
}

#[test]
fn test_unknown_driver_type_is_reported_at_creation() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "odd.toml", "[[record]]\nname = \"x\"\ntype = \"warp_drive\"\n");
    let config = load_database_config(&dir.path().join("odd.toml")).unwrap();

    let registry = default_registry().unwrap();
    let mut db = RecordDatabase::new();
    let record = &config.records[0];
    let err = db
        .create_record(&registry, &record.name, &record.type_name, Vec::new())
        .unwrap_err();
    assert_eq!(err.kind, mx_core::ErrorKind::NotFound);
}
