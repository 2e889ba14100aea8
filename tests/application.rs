//! Application configuration, logging setup and database building.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;
use tracing::Level;
use tracing_test::traced_test;

use rust_mx::config::MxConfig;
use rust_mx::logging::{self, OutputFormat, TracingConfig};
use rust_mx::{build_database, build_database_with_clock, open_configured_database};

use mx_core::class::{digital_input, digital_output, pulse_generator};
use mx_core::{ErrorKind, LifecycleState, ManualClock};
use mx_hardware::config::{load_database_config, load_database_config_from_str};
use mx_hardware::default_registry;

fn demo_database_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/demo.toml")
}

// =============================================================================
// Application configuration
// =============================================================================

#[test]
#[serial]
fn test_shipped_configuration_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/mx.toml");
    let config = MxConfig::load_validated(&path).unwrap();

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.database.path, demo_database_path());
    assert_eq!(config.database.poll_interval(), Duration::from_millis(10));
}

#[test]
#[serial]
fn test_database_path_is_relative_to_configuration_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mx.toml");
    fs::write(
        &path,
        "[application]\nname = \"bench\"\nlog_level = \"debug\"\n\n[database]\npath = \"records/bench.toml\"\n",
    )
    .unwrap();

    let config = MxConfig::load_from(&path).unwrap();
    assert_eq!(config.application.name, "bench");
    assert_eq!(config.database.path, dir.path().join("records/bench.toml"));
    // Not given in the file.
    assert_eq!(config.database.poll_interval_ms, 10);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mx.toml");
    fs::write(&path, "[database]\npath = \"/srv/bench.toml\"\npoll_interval_ms = 50\n").unwrap();

    std::env::set_var("RUST_MX_DATABASE__POLL_INTERVAL_MS", "25");
    std::env::set_var("RUST_MX_APPLICATION__LOG_LEVEL", "warn");
    let loaded = MxConfig::load_from(&path);
    std::env::remove_var("RUST_MX_DATABASE__POLL_INTERVAL_MS");
    std::env::remove_var("RUST_MX_APPLICATION__LOG_LEVEL");

    let config = loaded.unwrap();
    assert_eq!(config.database.poll_interval_ms, 25);
    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.database.path, PathBuf::from("/srv/bench.toml"));
}

#[test]
#[serial]
fn test_invalid_configuration_is_reported_with_file_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mx.toml");
    fs::write(&path, "[application]\nname = \"bench\"\nlog_level = \"loud\"\n").unwrap();

    let err = MxConfig::load_validated(&path).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("mx.toml"), "{}", message);
    assert!(message.contains("loud"), "{}", message);
}

// =============================================================================
// Logging
// =============================================================================

#[test]
#[serial]
fn test_logging_init_is_idempotent() {
    let config = TracingConfig::new(Level::DEBUG)
        .with_format(OutputFormat::Compact)
        .with_ansi(false);

    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());
    assert!(logging::init_from_config(&MxConfig::default()).is_ok());
}

#[test]
fn test_logging_rejects_unknown_configured_level() {
    let mut config = MxConfig::default();
    config.application.log_level = "loud".to_string();
    assert!(logging::init_from_config(&config).is_err());
}

// =============================================================================
// Database building
// =============================================================================

#[test]
#[traced_test]
fn test_demo_bench_opens_completely() {
    let registry = default_registry().unwrap();
    let config = load_database_config(&demo_database_path()).unwrap();
    let (mut db, report) = build_database(&config, &registry);

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.opened.len(), config.records.len());

    let shutter = db.find("shutter").unwrap();
    let readback = db.find("shutter_rb").unwrap();
    digital_output::write(&mut db, shutter, 1).unwrap();
    assert_eq!(digital_input::read(&mut db, readback).unwrap(), 1);

    let closed = db.close_all();
    assert!(closed.is_success(), "{:?}", closed.failures);
}

#[test]
#[serial]
fn test_open_configured_database_follows_database_path() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/mx.toml");
    let config = MxConfig::load_validated(&path).unwrap();
    let registry = default_registry().unwrap();

    let (db, report) = open_configured_database(&config, &registry).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert!(db.find("theta_gated").is_ok());
}

#[test]
fn test_open_configured_database_reports_missing_file() {
    let mut config = MxConfig::default();
    config.database.path = PathBuf::from("/nonexistent/records.toml");
    let registry = default_registry().unwrap();

    let err = open_configured_database(&config, &registry).unwrap_err();
    assert!(format!("{:#}", err).contains("records.toml"));
}

#[test]
#[traced_test]
fn test_failed_records_do_not_stop_their_siblings() {
    let text = r#"
[[record]]
name = "ctrl"
type = "soft_dio_controller"

[[record]]
name = "warp"
type = "warp_drive"

[[record]]
name = "stray"
type = "controller_output"
fields = { controller = "missing_ctrl", port = "A" }

[[record]]
name = "bad_port"
type = "controller_input"
fields = { controller = "ctrl", port = "D" }

[[record]]
name = "good_port"
type = "controller_input"
fields = { controller = "ctrl", port = "B" }
"#;
    let config = load_database_config_from_str(text).unwrap();
    let registry = default_registry().unwrap();
    let (db, report) = build_database(&config, &registry);

    assert_eq!(report.opened, vec!["ctrl".to_string(), "good_port".to_string()]);

    let warp = report.failure("warp").unwrap();
    assert_eq!(warp.stage, "create");
    assert_eq!(warp.error.kind, ErrorKind::NotFound);
    assert!(db.find("warp").is_err());

    assert_eq!(report.failure("stray").unwrap().stage, "link");
    let bad_port = report.failure("bad_port").unwrap();
    assert_eq!(bad_port.stage, "validate");
    assert_eq!(bad_port.error.kind, ErrorKind::IllegalArgument);

    // Construction failures are listed first.
    assert_eq!(report.failures[0].record, "warp");

    let good = db.find("good_port").unwrap();
    assert_eq!(db.state(good).unwrap(), LifecycleState::Opened);
}

#[test]
fn test_pulser_runs_on_the_supplied_clock() {
    let text = r#"
[[record]]
name = "trigger"
type = "soft_doutput"

[[record]]
name = "pulser"
type = "doutput_pulser"
fields = { digital_output = "trigger", pulse_width = 0.25, pulse_period = 0.5, num_pulses = 1 }
"#;
    let config = load_database_config_from_str(text).unwrap();
    let registry = default_registry().unwrap();
    let clock = ManualClock::new();
    let (mut db, report) = build_database_with_clock(&config, &registry, Arc::new(clock.clone()));
    assert!(report.is_success(), "{:?}", report.failures);

    let pulser = db.find("pulser").unwrap();
    let trigger = db.find("trigger").unwrap();
    pulse_generator::start(&mut db, pulser).unwrap();
    assert!(pulse_generator::is_busy(&mut db, pulser).unwrap());
    assert_eq!(digital_output::read(&mut db, trigger).unwrap(), 1);

    clock.advance(Duration::from_millis(300));
    db.process_callbacks();
    assert!(!pulse_generator::is_busy(&mut db, pulser).unwrap());
    assert_eq!(digital_output::read(&mut db, trigger).unwrap(), 0);
}
