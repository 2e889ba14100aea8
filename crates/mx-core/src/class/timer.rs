//! Count-down timers that gate scalers.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::Timer;

/// Timer mode: count a preset time.
pub const TIMER_MODE_PRESET: i64 = 1;
/// Timer mode: run until stopped.
pub const TIMER_MODE_FREE_RUN: i64 = 2;

#[derive(Debug, Clone)]
pub struct TimerState {
    /// Seconds counted by the last run.
    pub value: f64,
    pub busy: bool,
    pub mode: i64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            value: 0.0,
            busy: false,
            mode: TIMER_MODE_PRESET,
        }
    }
}

crate::field_accessors!(TimerState {
    "value" => value,
    "busy" => busy,
    "mode" => mode,
});

impl TimerState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("value", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_SUMMARY.union(FieldFlags::READ_ONLY)),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("mode", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];
}

/// Operation slots of a timer.
pub trait TimerOps {
    fn is_busy(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState) -> Result<bool> {
        Err(MxError::unsupported(CLASS, "is_busy"))
    }

    fn start(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState, _seconds: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "start"))
    }

    /// Stops the timer and returns the seconds that were left.
    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState) -> Result<f64> {
        Err(MxError::unsupported(CLASS, "stop"))
    }

    fn clear(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "clear"))
    }

    fn read(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState) -> Result<f64> {
        Err(MxError::unsupported(CLASS, "read"))
    }

    /// Default handler: the stored mode.
    fn get_mode(&mut self, _cx: &mut DriverContext<'_>, state: &TimerState) -> Result<i64> {
        Ok(state.mode)
    }

    /// Default handler: accept; the generic layer stores the mode.
    fn set_mode(&mut self, _cx: &mut DriverContext<'_>, _state: &TimerState, _mode: i64) -> Result<()> {
        Ok(())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn TimerOps> {
    driver
        .as_timer()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// True while counting down.
pub fn is_busy(db: &mut RecordDatabase, id: RecordId) -> Result<bool> {
    const OP: &str = "is_busy";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        state.busy = contract(driver, OP)?.is_busy(cx, state)?;
        Ok(state.busy)
    })
}

/// Starts counting down `seconds`.
pub fn start(db: &mut RecordDatabase, id: RecordId, seconds: f64) -> Result<()> {
    const OP: &str = "start";
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(MxError::illegal_argument(
            OP,
            format!("timer preset {} is not a non-negative number of seconds", seconds),
        ));
    }
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        contract(driver, OP)?.start(cx, state, seconds)?;
        state.busy = true;
        Ok(())
    })
}

/// Stops counting; returns the time that was left.
pub fn stop(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "stop";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        let remaining = contract(driver, OP)?.stop(cx, state)?;
        state.busy = false;
        Ok(remaining)
    })
}

/// Resets the elapsed time.
pub fn clear(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "clear";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        contract(driver, OP)?.clear(cx, state)?;
        state.value = 0.0;
        Ok(())
    })
}

/// Seconds counted so far.
pub fn read(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "read";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        state.value = contract(driver, OP)?.read(cx, state)?;
        Ok(state.value)
    })
}

/// Current counting mode.
pub fn get_mode(db: &mut RecordDatabase, id: RecordId) -> Result<i64> {
    const OP: &str = "get_mode";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        state.mode = contract(driver, OP)?.get_mode(cx, state)?;
        Ok(state.mode)
    })
}

/// Selects the counting mode.
pub fn set_mode(db: &mut RecordDatabase, id: RecordId, mode: i64) -> Result<()> {
    const OP: &str = "set_mode";
    if mode != TIMER_MODE_PRESET && mode != TIMER_MODE_FREE_RUN {
        return Err(MxError::illegal_argument(
            OP,
            format!("timer mode {} is neither preset (1) nor free run (2)", mode),
        ));
    }
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.timer_mut(OP)?;
        contract(driver, OP)?.set_mode(cx, state, mode)?;
        state.mode = mode;
        Ok(())
    })
}
