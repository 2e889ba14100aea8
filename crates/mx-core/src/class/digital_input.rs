//! Digital inputs: a word of input bits read as one integer.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::DigitalInput;

#[derive(Debug, Clone, Default)]
pub struct DigitalInputState {
    /// Value returned by the last successful read.
    pub value: u64,
}

crate::field_accessors!(DigitalInputState { "value" => value });

impl DigitalInputState {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "value",
        FieldKind::Hex,
        FieldBlock::Class,
    )
    .flags(
        FieldFlags::IN_DESCRIPTION
            .union(FieldFlags::IN_SUMMARY)
            .union(FieldFlags::READ_ONLY),
    )];
}

/// Operation slots of a digital input.
pub trait DigitalInputOps {
    fn read(&mut self, _cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        Err(MxError::unsupported(CLASS, "read"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn DigitalInputOps> {
    driver
        .as_digital_input()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads the input and stores the result in the class block.
pub fn read(db: &mut RecordDatabase, id: RecordId) -> Result<u64> {
    const OP: &str = "read";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.digital_input_mut(OP)?;
        let value = contract(driver, OP)?.read(cx, state)?;
        state.value = value;
        Ok(value)
    })
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match field {
        "value" => read(db, id).map(|_| ()),
        _ => Ok(()),
    }
}
