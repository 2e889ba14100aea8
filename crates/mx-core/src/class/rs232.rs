//! RS-232 style line interfaces.
//!
//! A driver supplies raw byte primitives; the generic [`putline`] and
//! [`getline`] apply the record's configured terminators. Terminators are
//! configured packed into one integer, most significant byte first, with
//! leading zero bytes ignored: `0x0d0a` is CR LF, `0x0a` is LF.

use std::time::Duration;

use tracing::debug;

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::Rs232;

#[derive(Debug, Clone)]
pub struct Rs232State {
    pub read_terminators: u32,
    pub write_terminators: u32,
    pub timeout_ms: u64,
}

impl Default for Rs232State {
    fn default() -> Self {
        Self {
            read_terminators: 0x0d0a,
            write_terminators: 0x0d0a,
            timeout_ms: crate::limits::DEFAULT_TRANSPORT_TIMEOUT.as_millis() as u64,
        }
    }
}

crate::field_accessors!(Rs232State {
    "read_terminators" => read_terminators,
    "write_terminators" => write_terminators,
    "timeout_ms" => timeout_ms,
});

impl Rs232State {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("read_terminators", FieldKind::Hex, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("write_terminators", FieldKind::Hex, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("timeout_ms", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn read_terminator_bytes(&self) -> Vec<u8> {
        terminator_bytes(self.read_terminators)
    }

    pub fn write_terminator_bytes(&self) -> Vec<u8> {
        terminator_bytes(self.write_terminators)
    }
}

/// Unpacks a terminator sequence.
pub fn terminator_bytes(packed: u32) -> Vec<u8> {
    packed
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect()
}

/// Byte primitives of a serial line.
pub trait Rs232Ops {
    fn write(&mut self, _cx: &mut DriverContext<'_>, _state: &Rs232State, _bytes: &[u8]) -> Result<()> {
        Err(MxError::unsupported(CLASS, "write"))
    }

    /// Reads up to and including `terminator`, returning the bytes before it.
    fn read_until(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &Rs232State,
        _terminator: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        Err(MxError::unsupported(CLASS, "read_until"))
    }

    fn discard_unread_input(&mut self, _cx: &mut DriverContext<'_>, _state: &Rs232State) -> Result<()> {
        Err(MxError::unsupported(CLASS, "discard_unread_input"))
    }

    fn discard_unwritten_output(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &Rs232State,
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "discard_unwritten_output"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn Rs232Ops> {
    driver
        .as_rs232()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Writes every byte of `bytes`.
pub fn write(db: &mut RecordDatabase, id: RecordId, bytes: &[u8]) -> Result<()> {
    const OP: &str = "write";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        contract(driver, OP)?.write(cx, state, bytes)
    })
}

/// Reads through `terminator`, returning the bytes before it. Uses the
/// record's configured timeout.
pub fn read_until(db: &mut RecordDatabase, id: RecordId, terminator: &[u8]) -> Result<Vec<u8>> {
    const OP: &str = "read_until";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        contract(driver, OP)?.read_until(cx, state, terminator, state.timeout())
    })
}

/// Drops anything received but not yet read.
pub fn discard_unread_input(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "discard_unread_input";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        contract(driver, OP)?.discard_unread_input(cx, state)
    })
}

/// Drops anything queued but not yet sent.
pub fn discard_unwritten_output(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "discard_unwritten_output";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        contract(driver, OP)?.discard_unwritten_output(cx, state)
    })
}

/// Sends `line` followed by the record's write terminators.
pub fn putline(db: &mut RecordDatabase, id: RecordId, line: &str) -> Result<()> {
    const OP: &str = "putline";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend(state.write_terminator_bytes());
        debug!("'{}' <- '{}'", cx.record_name(), line);
        contract(driver, OP)?.write(cx, state, &bytes)
    })
}

/// Reads one line terminated by the record's read terminators.
pub fn getline(db: &mut RecordDatabase, id: RecordId) -> Result<String> {
    const OP: &str = "getline";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.rs232(OP)?;
        let terminator = state.read_terminator_bytes();
        if terminator.is_empty() {
            return Err(MxError::illegal_argument(
                OP,
                "no read terminators are configured",
            ));
        }
        let bytes = contract(driver, OP)?.read_until(cx, state, &terminator, state.timeout())?;
        let line = String::from_utf8_lossy(&bytes).into_owned();
        debug!("'{}' -> '{}'", cx.record_name(), line);
        Ok(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_unpacking() {
        assert_eq!(terminator_bytes(0x0d0a), vec![b'\r', b'\n']);
        assert_eq!(terminator_bytes(0x0a), vec![b'\n']);
        assert_eq!(terminator_bytes(0), Vec::<u8>::new());
        assert_eq!(terminator_bytes(0x0d000a), vec![b'\r', 0, b'\n']);
    }
}
