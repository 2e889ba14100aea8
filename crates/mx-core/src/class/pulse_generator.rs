//! Pulse generators.
//!
//! A run is `arm` followed by `trigger`; it ends by itself after
//! `num_pulses` pulses, or runs until `stop` when `num_pulses` is
//! [`PULSE_GENERATOR_FOREVER`].

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::argument;

const CLASS: RecordClass = RecordClass::PulseGenerator;

/// `num_pulses` value for an endless pulse train.
pub const PULSE_GENERATOR_FOREVER: u64 = 0;

/// Output shape codes for the `mode` parameter.
pub const PULSE_GENERATOR_PULSE_MODE: i64 = 1;
/// Pulse mode with equal high and low time.
pub const PULSE_GENERATOR_SQUARE_WAVE_MODE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseParameter {
    PulseWidth,
    PulsePeriod,
    PulseDelay,
    NumPulses,
    Mode,
}

impl PulseParameter {
    pub fn field(self) -> &'static str {
        match self {
            PulseParameter::PulseWidth => "pulse_width",
            PulseParameter::PulsePeriod => "pulse_period",
            PulseParameter::PulseDelay => "pulse_delay",
            PulseParameter::NumPulses => "num_pulses",
            PulseParameter::Mode => "mode",
        }
    }

    pub fn from_field(name: &str) -> Option<Self> {
        [
            PulseParameter::PulseWidth,
            PulseParameter::PulsePeriod,
            PulseParameter::PulseDelay,
            PulseParameter::NumPulses,
            PulseParameter::Mode,
        ]
        .into_iter()
        .find(|p| p.field() == name)
    }

    fn check(self, value: f64) -> Result<()> {
        let valid = match self {
            PulseParameter::Mode => {
                value == PULSE_GENERATOR_PULSE_MODE as f64
                    || value == PULSE_GENERATOR_SQUARE_WAVE_MODE as f64
            }
            PulseParameter::NumPulses => value >= 0.0 && value.fract() == 0.0,
            _ => value.is_finite() && value >= 0.0,
        };
        if valid {
            Ok(())
        } else {
            Err(MxError::illegal_argument(
                "set_parameter",
                format!("{} is not a valid {}", value, self.field()),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PulseGeneratorState {
    /// Seconds the output stays high in each period.
    pub pulse_width: f64,
    pub pulse_period: f64,
    /// Seconds between trigger and the first pulse.
    pub pulse_delay: f64,
    pub num_pulses: u64,
    pub mode: i64,
    pub busy: bool,
}

impl Default for PulseGeneratorState {
    fn default() -> Self {
        Self {
            pulse_width: 0.0,
            pulse_period: 0.0,
            pulse_delay: 0.0,
            num_pulses: PULSE_GENERATOR_FOREVER,
            mode: PULSE_GENERATOR_PULSE_MODE,
            busy: false,
        }
    }
}

crate::field_accessors!(PulseGeneratorState {
    "pulse_width" => pulse_width,
    "pulse_period" => pulse_period,
    "pulse_delay" => pulse_delay,
    "num_pulses" => num_pulses,
    "mode" => mode,
    "busy" => busy,
});

impl PulseGeneratorState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("pulse_width", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("pulse_period", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("pulse_delay", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("num_pulses", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("mode", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::IN_SUMMARY.union(FieldFlags::READ_ONLY)),
    ];

    pub fn parameter(&self, parameter: PulseParameter) -> f64 {
        match parameter {
            PulseParameter::PulseWidth => self.pulse_width,
            PulseParameter::PulsePeriod => self.pulse_period,
            PulseParameter::PulseDelay => self.pulse_delay,
            PulseParameter::NumPulses => self.num_pulses as f64,
            PulseParameter::Mode => self.mode as f64,
        }
    }

    fn store(&mut self, parameter: PulseParameter, value: f64) {
        match parameter {
            PulseParameter::PulseWidth => self.pulse_width = value,
            PulseParameter::PulsePeriod => self.pulse_period = value,
            PulseParameter::PulseDelay => self.pulse_delay = value,
            PulseParameter::NumPulses => self.num_pulses = value as u64,
            PulseParameter::Mode => self.mode = value as i64,
        }
    }
}

/// Operation slots of a pulse generator.
pub trait PulseGeneratorOps {
    /// Default handler: the busy flag of the class block.
    fn is_busy(&mut self, _cx: &mut DriverContext<'_>, state: &PulseGeneratorState) -> Result<bool> {
        Ok(state.busy)
    }

    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &PulseGeneratorState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "arm"))
    }

    fn trigger(&mut self, _cx: &mut DriverContext<'_>, _state: &PulseGeneratorState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "trigger"))
    }

    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &PulseGeneratorState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "stop"))
    }

    /// Default handler: the stored class value.
    fn get_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &PulseGeneratorState,
        parameter: PulseParameter,
    ) -> Result<f64> {
        Ok(state.parameter(parameter))
    }

    /// Default handler: accept; the generic layer stores the value.
    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &PulseGeneratorState,
        _parameter: PulseParameter,
        _value: f64,
    ) -> Result<()> {
        Ok(())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn PulseGeneratorOps> {
    driver
        .as_pulse_generator()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// True while pulses remain to be sent.
pub fn is_busy(db: &mut RecordDatabase, id: RecordId) -> Result<bool> {
    const OP: &str = "is_busy";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        state.busy = contract(driver, OP)?.is_busy(cx, state)?;
        Ok(state.busy)
    })
}

/// Prepares a pulse train for an external trigger.
pub fn arm(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "arm";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        contract(driver, OP)?.arm(cx, state)
    })
}

/// Starts an armed pulse train.
pub fn trigger(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "trigger";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        contract(driver, OP)?.trigger(cx, state)?;
        state.busy = true;
        Ok(())
    })
}

/// Arms and triggers in one call.
pub fn start(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    arm(db, id)?;
    trigger(db, id)
}

/// Stops the pulse train.
pub fn stop(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "stop";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        contract(driver, OP)?.stop(cx, state)?;
        state.busy = false;
        Ok(())
    })
}

/// Reads a pulse parameter.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: PulseParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        contract(driver, OP)?.get_parameter(cx, state, parameter)
    })
}

/// Writes a pulse parameter. Refused while busy.
pub fn set_parameter(db: &mut RecordDatabase, id: RecordId, parameter: PulseParameter, value: f64) -> Result<()> {
    const OP: &str = "set_parameter";
    parameter.check(value)?;
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.pulse_generator_mut(OP)?;
        contract(driver, OP)?.set_parameter(cx, state, parameter, value)?;
        state.store(parameter, value);
        Ok(())
    })
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    if field == "busy" {
        return is_busy(db, id).map(|_| ());
    }
    match PulseParameter::from_field(field) {
        Some(parameter) => get_parameter(db, id, parameter).map(|_| ()),
        None => Ok(()),
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match PulseParameter::from_field(field) {
        Some(parameter) => set_parameter(db, id, parameter, argument(value, field)?).map(|_| true),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_checks() {
        assert!(PulseParameter::Mode.check(2.0).is_ok());
        assert!(PulseParameter::Mode.check(3.0).is_err());
        assert!(PulseParameter::NumPulses.check(0.0).is_ok());
        assert!(PulseParameter::NumPulses.check(1.5).is_err());
        assert!(PulseParameter::PulseWidth.check(-1.0).is_err());
    }

    #[test]
    fn test_default_is_endless_pulse_mode() {
        let state = PulseGeneratorState::default();
        assert_eq!(state.num_pulses, PULSE_GENERATOR_FOREVER);
        assert_eq!(state.parameter(PulseParameter::Mode), 1.0);
    }
}
