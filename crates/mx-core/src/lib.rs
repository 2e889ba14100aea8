//! `mx-core`
//!
//! The record/driver framework: every configured hardware or logical object
//! is a record, and a fixed set of generic commands (open, read, write,
//! get-status, get/set-parameter ...) operates on records without knowing
//! which driver is behind them.
//!
//! ## Architecture
//!
//! ```text
//! DriverRegistry ──lookup──▶ RecordDatabase ──dispatch──▶ class::<class>::*Ops
//!  (type name →                (arena of Records,           (trait objects,
//!   descriptor)                 lifecycle, fields)           default slots)
//!                                   │
//!                                   ├─ CallbackScheduler (timer ticks)
//!                                   ├─ ResourceClaims    (bus ownership)
//!                                   └─ remote            (field access over a transport)
//! ```
//!
//! ## Key Types
//!
//! - [`RecordDatabase`]: owns every record; runs the lifecycle and dispatch
//! - [`DriverRegistry`] / [`DriverDescriptor`]: type name to driver constructor and field table
//! - [`RecordDriver`]: lifecycle hooks plus access to one class contract
//! - [`FieldDescriptor`] / [`FieldValue`]: name-based introspection of record state
//! - [`MxError`] / [`ErrorKind`]: the single error type of every operation
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut db = RecordDatabase::new();
//! let ctrl = db.create_record(&registry, "ctrl", "soft_dio_controller", [])?;
//! let din = db.create_record(&registry, "din", "controller_input", [
//!     ("controller".to_string(), FieldValue::Record("ctrl".into())),
//!     ("port".to_string(), FieldValue::Str("a".into())),
//! ])?;
//! db.initialize();
//! let bits = class::digital_input::read(&mut db, din)?;
//! ```

pub mod claims;
pub mod class;
pub mod context;
pub mod database;
pub mod error;
pub mod field;
pub mod limits;
pub mod record;
pub mod registry;
pub mod remote;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use claims::{Resource, ResourceClaims};
pub use class::ClassState;
pub use context::DriverContext;
pub use database::{InitFailure, InitReport, RecordDatabase};
pub use error::{ErrorKind, MxError, Result};
pub use field::{
    Dim, FieldAccess, FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldType, FieldValue,
    RefRequirement,
};
pub use record::{Record, RecordDriver, RecordRef};
pub use registry::{DriverDescriptor, DriverRegistry};
pub use scheduler::{CallbackScheduler, Clock, ManualClock, SystemClock, Tick, TimerId, TimerKind};
pub use transport::{MockTransport, TcpTransport, Transport};
pub use types::{LifecycleState, RecordClass, RecordId, Superclass};
