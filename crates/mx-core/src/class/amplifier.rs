//! Amplifiers: gain, offset and time constant.
//!
//! Setters run inside a rollback scope. A driver that rounds a requested
//! value to what the hardware supports writes the rounded value into the
//! class block; if the operation fails, the block reverts to what it was.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::{argument, transact};

const CLASS: RecordClass = RecordClass::Amplifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplifierParameter {
    Gain,
    Offset,
    TimeConstant,
}

impl AmplifierParameter {
    pub fn field(self) -> &'static str {
        match self {
            AmplifierParameter::Gain => "gain",
            AmplifierParameter::Offset => "offset",
            AmplifierParameter::TimeConstant => "time_constant",
        }
    }

    pub fn from_field(name: &str) -> Option<Self> {
        [
            AmplifierParameter::Gain,
            AmplifierParameter::Offset,
            AmplifierParameter::TimeConstant,
        ]
        .into_iter()
        .find(|p| p.field() == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AmplifierState {
    pub gain: f64,
    pub offset: f64,
    /// Seconds.
    pub time_constant: f64,
}

crate::field_accessors!(AmplifierState {
    "gain" => gain,
    "offset" => offset,
    "time_constant" => time_constant,
});

impl AmplifierState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("gain", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("offset", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("time_constant", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    fn parameter(&self, parameter: AmplifierParameter) -> f64 {
        match parameter {
            AmplifierParameter::Gain => self.gain,
            AmplifierParameter::Offset => self.offset,
            AmplifierParameter::TimeConstant => self.time_constant,
        }
    }

    fn store(&mut self, parameter: AmplifierParameter, value: f64) {
        match parameter {
            AmplifierParameter::Gain => self.gain = value,
            AmplifierParameter::Offset => self.offset = value,
            AmplifierParameter::TimeConstant => self.time_constant = value,
        }
    }
}

/// Operation slots of an amplifier. Setters may round the request; the
/// value left in the class block is what the caller gets back.
pub trait AmplifierOps {
    /// Default handler: the stored gain.
    fn get_gain(&mut self, _cx: &mut DriverContext<'_>, state: &AmplifierState) -> Result<f64> {
        Ok(state.gain)
    }

    /// Sets `state.gain` to the value actually applied.
    fn set_gain(&mut self, _cx: &mut DriverContext<'_>, _state: &mut AmplifierState, _gain: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "set_gain"))
    }

    /// Default handler: the stored offset.
    fn get_offset(&mut self, _cx: &mut DriverContext<'_>, state: &AmplifierState) -> Result<f64> {
        Ok(state.offset)
    }

    fn set_offset(&mut self, _cx: &mut DriverContext<'_>, _state: &mut AmplifierState, _offset: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "set_offset"))
    }

    /// Default handler: the stored time constant.
    fn get_time_constant(&mut self, _cx: &mut DriverContext<'_>, state: &AmplifierState) -> Result<f64> {
        Ok(state.time_constant)
    }

    fn set_time_constant(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &mut AmplifierState,
        _time_constant: f64,
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "set_time_constant"))
    }

    /// Default handler: routes to the matching getter.
    fn get_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        state: &AmplifierState,
        parameter: AmplifierParameter,
    ) -> Result<f64> {
        match parameter {
            AmplifierParameter::Gain => self.get_gain(cx, state),
            AmplifierParameter::Offset => self.get_offset(cx, state),
            AmplifierParameter::TimeConstant => self.get_time_constant(cx, state),
        }
    }

    /// Default handler: routes to the matching setter.
    fn set_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        state: &mut AmplifierState,
        parameter: AmplifierParameter,
        value: f64,
    ) -> Result<()> {
        match parameter {
            AmplifierParameter::Gain => self.set_gain(cx, state, value),
            AmplifierParameter::Offset => self.set_offset(cx, state, value),
            AmplifierParameter::TimeConstant => self.set_time_constant(cx, state, value),
        }
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn AmplifierOps> {
    driver
        .as_amplifier()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Current gain as reported by the driver.
pub fn get_gain(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "get_gain";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        state.gain = contract(driver, OP)?.get_gain(cx, state)?;
        Ok(state.gain)
    })
}

/// Requests a gain; returns the gain actually applied.
pub fn set_gain(db: &mut RecordDatabase, id: RecordId, gain: f64) -> Result<f64> {
    const OP: &str = "set_gain";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        let ops = contract(driver, OP)?;
        transact(state, |state| {
            state.gain = gain;
            ops.set_gain(cx, state, gain)?;
            Ok(state.gain)
        })
    })
}

/// Current offset in output units.
pub fn get_offset(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "get_offset";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        state.offset = contract(driver, OP)?.get_offset(cx, state)?;
        Ok(state.offset)
    })
}

/// Requests an offset; returns the offset actually applied.
pub fn set_offset(db: &mut RecordDatabase, id: RecordId, offset: f64) -> Result<f64> {
    const OP: &str = "set_offset";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        let ops = contract(driver, OP)?;
        transact(state, |state| {
            state.offset = offset;
            ops.set_offset(cx, state, offset)?;
            Ok(state.offset)
        })
    })
}

/// Current time constant in seconds.
pub fn get_time_constant(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "get_time_constant";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        state.time_constant = contract(driver, OP)?.get_time_constant(cx, state)?;
        Ok(state.time_constant)
    })
}

/// Requests a time constant; returns the one the device settled on.
pub fn set_time_constant(db: &mut RecordDatabase, id: RecordId, time_constant: f64) -> Result<f64> {
    const OP: &str = "set_time_constant";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        let ops = contract(driver, OP)?;
        transact(state, |state| {
            state.time_constant = time_constant;
            ops.set_time_constant(cx, state, time_constant)?;
            Ok(state.time_constant)
        })
    })
}

/// Reads a numbered amplifier parameter.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: AmplifierParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        let value = contract(driver, OP)?.get_parameter(cx, state, parameter)?;
        state.store(parameter, value);
        Ok(value)
    })
}

/// Writes a numbered amplifier parameter. A failure leaves the class block
/// unchanged.
pub fn set_parameter(
    db: &mut RecordDatabase,
    id: RecordId,
    parameter: AmplifierParameter,
    value: f64,
) -> Result<f64> {
    const OP: &str = "set_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.amplifier_mut(OP)?;
        let ops = contract(driver, OP)?;
        transact(state, |state| {
            state.store(parameter, value);
            ops.set_parameter(cx, state, parameter, value)?;
            Ok(state.parameter(parameter))
        })
    })
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match AmplifierParameter::from_field(field) {
        Some(parameter) => get_parameter(db, id, parameter).map(|_| ()),
        None => Ok(()),
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match AmplifierParameter::from_field(field) {
        Some(parameter) => set_parameter(db, id, parameter, argument(value, field)?).map(|_| true),
        None => Ok(false),
    }
}
