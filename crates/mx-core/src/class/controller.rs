//! Generic controller interfaces: a bus chip with a small bank of registers.
//!
//! Device records of the digital I/O classes reference a controller record
//! and address one of its registers by index. The controller's class block
//! caches the last value read from or written to every register, which is
//! the "shared controller state" devices observe.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{Dim, FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::Controller;

#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub num_registers: usize,
    /// Last-known register values.
    pub registers: Vec<i64>,
}

crate::field_accessors!(ControllerState {
    "num_registers" => num_registers,
    "registers" => registers,
});

impl ControllerState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("num_registers", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("registers", FieldKind::Hex, FieldBlock::Class)
            .dims(&[Dim::Varargs("num_registers")])
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::READ_ONLY)),
    ];

    /// Cached value of a register, zero if never accessed.
    pub fn register(&self, index: usize) -> i64 {
        self.registers.get(index).copied().unwrap_or(0)
    }

    /// Caches a register value. The cache always holds `num_registers`
    /// entries, so an index past it is rejected rather than grown into.
    fn store(&mut self, index: usize, value: i64, operation: &str) -> Result<()> {
        self.check_index(index, operation)?;
        if self.registers.len() != self.num_registers {
            self.registers.resize(self.num_registers, 0);
        }
        match self.registers.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MxError::corrupt_state(
                operation,
                format!("register cache has no slot {}", index),
            )),
        }
    }

    fn check_index(&self, index: usize, operation: &str) -> Result<()> {
        if index >= self.num_registers {
            return Err(MxError::illegal_argument(
                operation,
                format!(
                    "register {} does not exist, the controller has {}",
                    index, self.num_registers
                ),
            ));
        }
        Ok(())
    }
}

/// Register values are cached as signed integers; wider values are refused.
fn cache_value(value: u64, operation: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        MxError::out_of_range(
            operation,
            format!("register value {:#x} is wider than 63 bits", value),
        )
    })
}

/// Operation slots of a controller.
pub trait ControllerOps {
    /// Default handler: the cached register value.
    fn read_register(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &ControllerState,
        index: usize,
    ) -> Result<u64> {
        let cached = state.register(index);
        u64::try_from(cached).map_err(|_| {
            MxError::corrupt_state(
                "read_register",
                format!("register {} holds negative value {}", index, cached),
            )
        })
    }

    fn write_register(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &ControllerState,
        _index: usize,
        _value: u64,
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "write_register"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn ControllerOps> {
    driver
        .as_controller()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads one register through the controller's driver and caches it.
pub fn read_register(db: &mut RecordDatabase, id: RecordId, index: usize) -> Result<u64> {
    const OP: &str = "read_register";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.controller_mut(OP)?;
        state.check_index(index, OP)?;
        let value = contract(driver, OP)?.read_register(cx, state, index)?;
        state.store(index, cache_value(value, OP)?, OP)?;
        Ok(value)
    })
}

/// Writes one register through the controller's driver and caches it.
pub fn write_register(db: &mut RecordDatabase, id: RecordId, index: usize, value: u64) -> Result<()> {
    const OP: &str = "write_register";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.controller_mut(OP)?;
        state.check_index(index, OP)?;
        let cached = cache_value(value, OP)?;
        contract(driver, OP)?.write_register(cx, state, index, value)?;
        state.store(index, cached, OP)
    })
}

/// Number of registers a controller record exposes.
pub fn num_registers(db: &RecordDatabase, id: RecordId) -> Result<usize> {
    const OP: &str = "num_registers";
    db.with_class_state(id, OP, |c| c.controller(OP).map(|s| s.num_registers))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn controller(num_registers: usize) -> ControllerState {
        ControllerState {
            num_registers,
            registers: Vec::new(),
        }
    }

    #[test]
    fn test_store_sizes_cache_to_register_count() {
        let mut state = controller(3);
        state.store(1, 0x2a, "write_register").unwrap();
        assert_eq!(state.registers, vec![0, 0x2a, 0]);
        assert_eq!(state.register(1), 0x2a);
    }

    #[test]
    fn test_store_refuses_index_past_register_count() {
        let mut state = controller(3);
        let err = state.store(7, 1, "write_register").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert!(state.registers.is_empty());
    }

    #[test]
    fn test_cache_value_refuses_top_bit() {
        assert_eq!(cache_value(0xff, "read_register").unwrap(), 0xff);
        let err = cache_value(u64::MAX, "read_register").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }
}
