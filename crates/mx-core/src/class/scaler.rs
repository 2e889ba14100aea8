//! Scalers: gated counters with an optional preset.

use serde::{Deserialize, Serialize};

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::Scaler;

/// What ends a counting interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerMode {
    /// Counts until the shared timer stops.
    Timer = 1,
    /// Counts until this scaler reaches its preset.
    Preset = 2,
}

impl ScalerMode {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(ScalerMode::Timer),
            2 => Ok(ScalerMode::Preset),
            other => Err(MxError::illegal_argument(
                "set_mode",
                format!("scaler mode {} is neither timer (1) nor preset (2)", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerParameter {
    Mode,
    DarkCurrent,
}

#[derive(Debug, Clone)]
pub struct ScalerState {
    pub value: i64,
    pub busy: bool,
    /// Counts per second subtracted by callers that correct for background.
    pub dark_current: f64,
    pub mode: i64,
}

impl Default for ScalerState {
    fn default() -> Self {
        Self {
            value: 0,
            busy: false,
            dark_current: 0.0,
            mode: ScalerMode::Timer as i64,
        }
    }
}

crate::field_accessors!(ScalerState {
    "value" => value,
    "busy" => busy,
    "dark_current" => dark_current,
    "mode" => mode,
});

impl ScalerState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("value", FieldKind::Int, FieldBlock::Class).flags(
            FieldFlags::IN_DESCRIPTION
                .union(FieldFlags::IN_SUMMARY)
                .union(FieldFlags::READ_ONLY),
        ),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("dark_current", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("mode", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];
}

/// Operation slots of a scaler.
pub trait ScalerOps {
    fn clear(&mut self, _cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "clear"))
    }

    fn read(&mut self, _cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<i64> {
        Err(MxError::unsupported(CLASS, "read"))
    }

    /// Default handler: the busy flag of the class block.
    fn is_busy(&mut self, _cx: &mut DriverContext<'_>, state: &ScalerState) -> Result<bool> {
        Ok(state.busy)
    }

    fn start(&mut self, _cx: &mut DriverContext<'_>, _state: &ScalerState, _preset: i64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "start"))
    }

    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<i64> {
        Err(MxError::unsupported(CLASS, "stop"))
    }

    /// Default handler: the stored class value.
    fn get_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &ScalerState,
        parameter: ScalerParameter,
    ) -> Result<f64> {
        Ok(match parameter {
            ScalerParameter::Mode => state.mode as f64,
            ScalerParameter::DarkCurrent => state.dark_current,
        })
    }

    /// Default handler: accept; the generic layer stores the value.
    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &ScalerState,
        _parameter: ScalerParameter,
        _value: f64,
    ) -> Result<()> {
        Ok(())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn ScalerOps> {
    driver
        .as_scaler()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Zeroes the count.
pub fn clear(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "clear";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        contract(driver, OP)?.clear(cx, state)?;
        state.value = 0;
        Ok(())
    })
}

/// Current count as reported by the driver.
pub fn read(db: &mut RecordDatabase, id: RecordId) -> Result<i64> {
    const OP: &str = "read";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        state.value = contract(driver, OP)?.read(cx, state)?;
        Ok(state.value)
    })
}

/// True while a preset count is running.
pub fn is_busy(db: &mut RecordDatabase, id: RecordId) -> Result<bool> {
    const OP: &str = "is_busy";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        state.busy = contract(driver, OP)?.is_busy(cx, state)?;
        Ok(state.busy)
    })
}

/// Starts counting. In preset mode the scaler stops itself at `preset` counts.
pub fn start(db: &mut RecordDatabase, id: RecordId, preset: i64) -> Result<()> {
    const OP: &str = "start";
    if preset < 0 {
        return Err(MxError::illegal_argument(
            OP,
            format!("scaler preset {} is negative", preset),
        ));
    }
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        contract(driver, OP)?.start(cx, state, preset)?;
        state.busy = true;
        Ok(())
    })
}

/// Stops counting and returns the final count.
pub fn stop(db: &mut RecordDatabase, id: RecordId) -> Result<i64> {
    const OP: &str = "stop";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        state.value = contract(driver, OP)?.stop(cx, state)?;
        state.busy = false;
        Ok(state.value)
    })
}

/// Reads a scaler parameter.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: ScalerParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        contract(driver, OP)?.get_parameter(cx, state, parameter)
    })
}

/// Writes a scaler parameter.
pub fn set_parameter(db: &mut RecordDatabase, id: RecordId, parameter: ScalerParameter, value: f64) -> Result<()> {
    const OP: &str = "set_parameter";
    if parameter == ScalerParameter::Mode {
        ScalerMode::from_code(value as i64)?;
    }
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.scaler_mut(OP)?;
        contract(driver, OP)?.set_parameter(cx, state, parameter, value)?;
        match parameter {
            ScalerParameter::Mode => state.mode = value as i64,
            ScalerParameter::DarkCurrent => state.dark_current = value,
        }
        Ok(())
    })
}
