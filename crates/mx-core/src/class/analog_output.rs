//! Analog outputs. Drivers work in raw units; the class block converts
//! `value = offset + scale * raw`.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::argument;

const CLASS: RecordClass = RecordClass::AnalogOutput;

#[derive(Debug, Clone)]
pub struct AnalogOutputState {
    pub value: f64,
    pub raw_value: f64,
    pub scale: f64,
    pub offset: f64,
    pub units: String,
}

impl Default for AnalogOutputState {
    fn default() -> Self {
        Self {
            value: 0.0,
            raw_value: 0.0,
            scale: 1.0,
            offset: 0.0,
            units: String::new(),
        }
    }
}

crate::field_accessors!(AnalogOutputState {
    "value" => value,
    "raw_value" => raw_value,
    "scale" => scale,
    "offset" => offset,
    "units" => units,
});

impl AnalogOutputState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("value", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("raw_value", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("scale", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("offset", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("units", FieldKind::Str, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    fn to_raw(&self, value: f64, operation: &str) -> Result<f64> {
        if self.scale == 0.0 {
            return Err(MxError::illegal_argument(operation, "analog output scale is zero"));
        }
        Ok((value - self.offset) / self.scale)
    }
}

/// Raw-unit operation slots of an analog output.
pub trait AnalogOutputOps {
    /// Default handler: the last raw value written.
    fn read(&mut self, _cx: &mut DriverContext<'_>, state: &AnalogOutputState) -> Result<f64> {
        Ok(state.raw_value)
    }

    fn write(&mut self, _cx: &mut DriverContext<'_>, _state: &AnalogOutputState, _raw: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "write"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn AnalogOutputOps> {
    driver
        .as_analog_output()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads back the output in user units.
pub fn read(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "read";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.analog_output_mut(OP)?;
        let raw = contract(driver, OP)?.read(cx, state)?;
        state.raw_value = raw;
        state.value = state.offset + state.scale * raw;
        Ok(state.value)
    })
}

/// Sets the output in user units.
pub fn write(db: &mut RecordDatabase, id: RecordId, value: f64) -> Result<()> {
    const OP: &str = "write";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.analog_output_mut(OP)?;
        let raw = state.to_raw(value, OP)?;
        contract(driver, OP)?.write(cx, state, raw)?;
        state.raw_value = raw;
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
