//! Digital outputs. The class block keeps the last value written, which is
//! what drivers without read-back report.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::argument;

const CLASS: RecordClass = RecordClass::DigitalOutput;

#[derive(Debug, Clone, Default)]
pub struct DigitalOutputState {
    /// Last value written or read back.
    pub value: u64,
}

crate::field_accessors!(DigitalOutputState { "value" => value });

impl DigitalOutputState {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "value",
        FieldKind::Hex,
        FieldBlock::Class,
    )
    .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY))];
}

/// Operation slots of a digital output.
pub trait DigitalOutputOps {
    /// Default handler: the last value written.
    fn read(&mut self, _cx: &mut DriverContext<'_>, state: &DigitalOutputState) -> Result<u64> {
        Ok(state.value)
    }

    fn write(&mut self, _cx: &mut DriverContext<'_>, _state: &DigitalOutputState, _value: u64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "write"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn DigitalOutputOps> {
    driver
        .as_digital_output()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads the output back; drivers without read-back report the last write.
pub fn read(db: &mut RecordDatabase, id: RecordId) -> Result<u64> {
    const OP: &str = "read";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.digital_output_mut(OP)?;
        let value = contract(driver, OP)?.read(cx, state)?;
        state.value = value;
        Ok(value)
    })
}

/// Writes the full output word.
pub fn write(db: &mut RecordDatabase, id: RecordId, value: u64) -> Result<()> {
    const OP: &str = "write";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.digital_output_mut(OP)?;
        contract(driver, OP)?.write(cx, state, value)?;
        state.value = value;
        Ok(())
    })
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match field {
        "value" => read(db, id).map(|_| ()),
        _ => Ok(()),
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match field {
        "value" => write(db, id, argument(value, field)?).map(|_| true),
        _ => Ok(false),
    }
}
