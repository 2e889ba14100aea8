//! Error types for the record framework.
//!
//! Every framework and driver operation returns [`Result`], whose error is a
//! single [`MxError`] carrying exactly one [`ErrorKind`] plus a message that
//! names the record, field or class involved. There is no other error
//! channel: drivers propagate the first failure they see unchanged with `?`,
//! and only the database (or an explicit resynchronize) decides whether a
//! failure is recoverable.
//!
//! ## Error Kinds
//!
//! - **`NullArgument`**: a handle passed to an operation did not refer to
//!   anything (an id outside the database, an unresolved reference).
//! - **`CorruptState`**: a record's private state is missing or not the shape
//!   the caller expected. Raised by the safe-downcast helpers before any
//!   hardware is touched.
//! - **`TypeMismatch`**: a reference resolved to a record of the wrong
//!   superclass, class or type.
//! - **`IllegalArgument`**: a value outside the driver's accepted domain.
//! - **`Unsupported`**: the operation slot is empty for this class or type.
//! - **`DeviceIo`**: the hardware or transport reported a failure.
//! - **`TimedOut`**: a blocking transport gave up waiting.
//! - **`WouldExceedLimit`**: a requested value is outside a physical range.
//!
//! `NotFound`, `OutOfRange`, `NotReady`, `PermissionDenied` and `OutOfMemory`
//! complete the set used by the field engine and the database.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RecordClass;

// =============================================================================
// Error Kinds
// =============================================================================

/// Category of a framework failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A handle passed to the operation referred to nothing.
    NullArgument,
    /// Private state or a reference was missing or had the wrong shape.
    CorruptState,
    /// A reference resolved to a record of the wrong kind.
    TypeMismatch,
    /// A value outside the accepted domain.
    IllegalArgument,
    /// The operation slot is empty for this record.
    Unsupported,
    /// An allocation request exceeded the framework limits.
    OutOfMemory,
    /// The device or transport reported a failure.
    DeviceIo,
    /// A blocking wait expired.
    TimedOut,
    /// A requested value is outside a documented physical range.
    WouldExceedLimit,
    /// A record, type or field name does not exist.
    NotFound,
    /// An array index or length beyond the run-time length.
    OutOfRange,
    /// The record is not in a lifecycle state that allows the operation.
    NotReady,
    /// The field may not be written.
    PermissionDenied,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::NullArgument => "null_argument",
            ErrorKind::CorruptState => "corrupt_state",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::IllegalArgument => "illegal_argument",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::DeviceIo => "device_io",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::WouldExceedLimit => "would_exceed_limit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::OutOfRange => "out_of_range",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::PermissionDenied => "permission_denied",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// MxError
// =============================================================================

/// The single error type returned by every framework operation.
///
/// `operation` names the function that detected the failure (the generic
/// dispatch entry point or the driver step); `message` names the record,
/// field or class involved.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{operation}: {kind} error: {message}")]
pub struct MxError {
    pub kind: ErrorKind,
    pub operation: String,
    pub message: String,
}

/// Convenience alias used throughout the framework.
pub type Result<T> = std::result::Result<T, MxError>;

impl MxError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn null_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NullArgument, operation, message)
    }

    pub fn corrupt_state(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorruptState, operation, message)
    }

    pub fn type_mismatch(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, operation, message)
    }

    pub fn illegal_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalArgument, operation, message)
    }

    pub fn device_io(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeviceIo, operation, message)
    }

    pub fn timed_out(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimedOut, operation, message)
    }

    pub fn would_exceed_limit(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WouldExceedLimit, operation, message)
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, operation, message)
    }

    pub fn out_of_range(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfRange, operation, message)
    }

    pub fn not_ready(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotReady, operation, message)
    }

    pub fn permission_denied(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, operation, message)
    }

    /// The error returned by every empty operation slot.
    pub fn unsupported(class: RecordClass, operation: &str) -> Self {
        Self::new(
            ErrorKind::Unsupported,
            operation,
            format!(
                "operation '{}' is not supported by this {} driver",
                operation, class
            ),
        )
    }

    /// Adds the record name to an error raised below the dispatch layer.
    pub fn in_record(mut self, record: &str) -> Self {
        if !self.message.contains(record) {
            self.message = format!("{} (record '{}')", self.message, record);
        }
        self
    }
}

impl From<std::io::Error> for MxError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
            _ => ErrorKind::DeviceIo,
        };
        Self::new(kind, "io", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MxError::corrupt_state("read", "record 'd0' has no type state");
        assert_eq!(
            err.to_string(),
            "read: corrupt_state error: record 'd0' has no type state"
        );
    }

    #[test]
    fn test_unsupported_names_class_and_operation() {
        let err = MxError::unsupported(RecordClass::Motor, "raw_home_command");
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert!(err.message.contains("motor"));
        assert!(err.message.contains("raw_home_command"));
    }

    #[test]
    fn test_in_record_is_applied_once() {
        let err = MxError::device_io("write", "bus fault").in_record("dout");
        let again = err.clone().in_record("dout");
        assert_eq!(err, again);
        assert!(err.message.ends_with("(record 'dout')"));
    }

    #[test]
    fn test_io_timeout_maps_to_timed_out() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply");
        let err: MxError = io.into();
        assert_eq!(err.kind, ErrorKind::TimedOut);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::WouldExceedLimit).unwrap();
        assert_eq!(json, "\"would_exceed_limit\"");
    }
}
