//! `mx-hardware`
//!
//! Record drivers and record database files for the `mx-core` framework.
//!
//! - [`drivers`]: software-simulated devices, port-I/O chips, RS-232 lines,
//!   network servers and the instruments that sit on them
//! - [`config`]: TOML record database files, validated before any record
//!   is created
//!
//! ## Example
//!
//! ```rust,ignore
//! let registry = mx_hardware::default_registry()?;
//! let config = mx_hardware::config::load_database_config(Path::new("config/demo.toml"))?;
//! ```
//!
//! ## Features
//!
//! - `serial`: the `serial_rs232` driver on a local serial port

pub mod config;
pub mod drivers;
#[cfg(feature = "serial")]
pub mod serial;

pub use drivers::register_all as register_all_drivers;

use mx_core::{DriverRegistry, Result};

/// A registry holding every driver in this crate.
pub fn default_registry() -> Result<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    drivers::register_all(&mut registry)?;
    Ok(registry)
}
