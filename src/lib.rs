//! # rust-mx
//!
//! Application layer of the record framework. The framework itself lives in
//! `mx-core` and the concrete drivers in `mx-hardware`; this crate ties them
//! to an application:
//!
//! - **`config`**: application configuration (`[application]`, `[database]`)
//!   from a TOML file and `RUST_MX_` environment variables
//! - **`logging`**: `tracing-subscriber` setup honouring `RUST_LOG`
//! - **`database`**: builds a live record database from a record database
//!   file against an explicitly constructed driver registry
//!
//! ```no_run
//! use rust_mx::{config::MxConfig, database, logging};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = MxConfig::load_validated("config/mx.toml")?;
//! logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
//!
//! let registry = mx_hardware::default_registry()?;
//! let (mut db, report) = database::open_configured_database(&config, &registry)?;
//! if !report.is_success() {
//!     tracing::warn!("{} record(s) failed", report.failures.len());
//! }
//! db.process_callbacks();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod logging;

pub use database::{build_database, build_database_with_clock, open_configured_database};

pub use mx_core;
pub use mx_hardware;
