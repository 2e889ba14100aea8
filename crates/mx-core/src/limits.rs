//! Shared hard limits and timing constants.
//!
//! This module centralizes:
//! - Name and array size limits enforced by the database and field engine
//! - Default timeouts for blocking transports
//! - Timer intervals used by the software-emulated drivers

use std::time::Duration;

use crate::error::{ErrorKind, MxError, Result};

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum length of a record name in characters.
pub const MAX_RECORD_NAME_LENGTH: usize = 40;

/// Maximum number of elements a single array field may hold.
///
/// Varargs lengths beyond this are rejected with `OutOfMemory` instead of
/// being allocated.
pub const MAX_ARRAY_ELEMENTS: usize = 16 * 1024 * 1024;

/// Maximum length of one line read from a transport.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

// =============================================================================
// Timeouts
// =============================================================================

/// Default timeout for blocking transport reads and writes (5 seconds).
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest period a periodic timer may have.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Tick interval of the software pulse generator (100 ms).
pub const PULSER_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Time a backlash gate stays on after the real motor stops (100 ms).
pub const DEFAULT_GATE_DELAY: Duration = Duration::from_millis(100);

/// Checks a record name against the naming rules.
pub fn validate_record_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MxError::illegal_argument(
            "validate_record_name",
            "record name is empty",
        ));
    }
    if name.chars().count() > MAX_RECORD_NAME_LENGTH {
        return Err(MxError::illegal_argument(
            "validate_record_name",
            format!(
                "record name '{}' is longer than {} characters",
                name, MAX_RECORD_NAME_LENGTH
            ),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '.') {
        return Err(MxError::illegal_argument(
            "validate_record_name",
            format!("record name '{}' contains whitespace or '.'", name),
        ));
    }
    Ok(())
}

/// Checks an array length before allocation.
pub fn validate_array_length(field: &str, length: usize) -> Result<()> {
    if length > MAX_ARRAY_ELEMENTS {
        return Err(MxError::new(
            ErrorKind::OutOfMemory,
            "validate_array_length",
            format!(
                "field '{}' would need {} elements, the limit is {}",
                field, length, MAX_ARRAY_ELEMENTS
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_names() {
        assert!(validate_record_name("mc6821_a").is_ok());
        assert!(validate_record_name("").is_err());
        assert!(validate_record_name("has space").is_err());
        assert!(validate_record_name("dotted.name").is_err());
        assert!(validate_record_name(&"x".repeat(MAX_RECORD_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_array_length_limit() {
        assert!(validate_array_length("data", 1024).is_ok());
        let err = validate_array_length("data", MAX_ARRAY_ELEMENTS + 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfMemory);
    }
}
