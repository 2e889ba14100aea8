//! Motors.
//!
//! Drivers work in raw units. The generic layer owns everything that is the
//! same for every motor:
//!
//! - user/raw conversion, `user = offset + scale * raw`;
//! - software limits, checked against the destination before the driver is
//!   called (disabled while `negative_limit >= positive_limit`);
//! - backlash correction.
//!
//! # Backlash
//!
//! A move whose direction matches the sign of `backlash_correction` is split
//! in two. The first leg goes to `destination + backlash_correction` with
//! `backlash_move_in_progress` set; [`get_status`] clears the flag once the
//! driver reports the first leg idle and then issues the final leg to the
//! real destination. Callers poll [`get_status`] (or [`is_busy`]) until busy
//! clears, exactly as for a plain move.

use tracing::debug;

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::{argument, transact};

const CLASS: RecordClass = RecordClass::Motor;

// Status word bits reported by `get_status`.
pub const MOTOR_IS_BUSY: u64 = 0x1;
pub const MOTOR_POSITIVE_LIMIT_HIT: u64 = 0x2;
pub const MOTOR_NEGATIVE_LIMIT_HIT: u64 = 0x4;
pub const MOTOR_HOME_SEARCH_SUCCEEDED: u64 = 0x8;
pub const MOTOR_FOLLOWING_ERROR: u64 = 0x10;
pub const MOTOR_DRIVE_FAULT: u64 = 0x20;
pub const MOTOR_AXIS_DISABLED: u64 = 0x40;

/// Parameter codes understood by `get_parameter` / `set_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorParameter {
    /// Raw units per second.
    Speed,
    BaseSpeed,
    /// Seconds to reach full speed.
    AccelerationTime,
}

impl MotorParameter {
    pub fn field(self) -> &'static str {
        match self {
            MotorParameter::Speed => "speed",
            MotorParameter::BaseSpeed => "base_speed",
            MotorParameter::AccelerationTime => "acceleration_time",
        }
    }

    pub fn from_field(name: &str) -> Option<Self> {
        [
            MotorParameter::Speed,
            MotorParameter::BaseSpeed,
            MotorParameter::AccelerationTime,
        ]
        .into_iter()
        .find(|p| p.field() == name)
    }
}

#[derive(Debug, Clone)]
pub struct MotorState {
    /// User units.
    pub position: f64,
    pub destination: f64,
    pub scale: f64,
    pub offset: f64,
    pub positive_limit: f64,
    pub negative_limit: f64,
    pub backlash_correction: f64,
    pub speed: f64,
    pub base_speed: f64,
    pub acceleration_time: f64,
    pub busy: bool,
    pub status: u64,
    pub backlash_move_in_progress: bool,
    /// Final destination still owed after the backlash leg.
    pub pending_destination: Option<f64>,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            position: 0.0,
            destination: 0.0,
            scale: 1.0,
            offset: 0.0,
            positive_limit: 0.0,
            negative_limit: 0.0,
            backlash_correction: 0.0,
            speed: 0.0,
            base_speed: 0.0,
            acceleration_time: 0.0,
            busy: false,
            status: 0,
            backlash_move_in_progress: false,
            pending_destination: None,
        }
    }
}

crate::field_accessors!(MotorState {
    "position" => position,
    "destination" => destination,
    "scale" => scale,
    "offset" => offset,
    "positive_limit" => positive_limit,
    "negative_limit" => negative_limit,
    "backlash_correction" => backlash_correction,
    "speed" => speed,
    "base_speed" => base_speed,
    "acceleration_time" => acceleration_time,
    "busy" => busy,
    "status" => status,
    "backlash_move_in_progress" => backlash_move_in_progress,
});

impl MotorState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("position", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("destination", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("scale", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("offset", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("positive_limit", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("negative_limit", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("backlash_correction", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("speed", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("base_speed", FieldKind::Float, FieldBlock::Class),
        FieldDescriptor::new("acceleration_time", FieldKind::Float, FieldBlock::Class),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("status", FieldKind::Hex, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("backlash_move_in_progress", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
    ];

    pub fn to_raw(&self, user: f64, operation: &str) -> Result<f64> {
        if self.scale == 0.0 {
            return Err(MxError::illegal_argument(operation, "motor scale is zero"));
        }
        Ok((user - self.offset) / self.scale)
    }

    pub fn to_user(&self, raw: f64) -> f64 {
        self.offset + self.scale * raw
    }

    fn limits_enabled(&self) -> bool {
        self.negative_limit < self.positive_limit
    }

    fn check_limits(&self, destination: f64, operation: &str) -> Result<()> {
        if self.limits_enabled()
            && (destination < self.negative_limit || destination > self.positive_limit)
        {
            return Err(MxError::would_exceed_limit(
                operation,
                format!(
                    "destination {} is outside the limits [{}, {}]",
                    destination, self.negative_limit, self.positive_limit
                ),
            ));
        }
        Ok(())
    }

    fn parameter(&self, parameter: MotorParameter) -> f64 {
        match parameter {
            MotorParameter::Speed => self.speed,
            MotorParameter::BaseSpeed => self.base_speed,
            MotorParameter::AccelerationTime => self.acceleration_time,
        }
    }

    fn store_parameter(&mut self, parameter: MotorParameter, value: f64) {
        match parameter {
            MotorParameter::Speed => self.speed = value,
            MotorParameter::BaseSpeed => self.base_speed = value,
            MotorParameter::AccelerationTime => self.acceleration_time = value,
        }
    }

    /// Home and constant-velocity directions follow the sign of the scale.
    fn raw_direction(&self, direction: i32) -> i32 {
        if self.scale < 0.0 {
            -direction
        } else {
            direction
        }
    }
}

/// Driver side of a motor. Positions here are raw; the class functions
/// convert from user units and apply limits and backlash first.
pub trait MotorOps {
    fn move_absolute(&mut self, _cx: &mut DriverContext<'_>, _state: &MotorState, _raw: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "move_absolute"))
    }

    fn get_position(&mut self, _cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<f64> {
        Err(MxError::unsupported(CLASS, "get_position"))
    }

    fn set_position(&mut self, _cx: &mut DriverContext<'_>, _state: &MotorState, _raw: f64) -> Result<()> {
        Err(MxError::unsupported(CLASS, "set_position"))
    }

    fn soft_abort(&mut self, _cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "soft_abort"))
    }

    /// Default handler: a soft abort.
    fn immediate_abort(&mut self, cx: &mut DriverContext<'_>, state: &MotorState) -> Result<()> {
        self.soft_abort(cx, state)
    }

    fn raw_home_command(&mut self, _cx: &mut DriverContext<'_>, _state: &MotorState, _direction: i32) -> Result<()> {
        Err(MxError::unsupported(CLASS, "raw_home_command"))
    }

    fn constant_velocity_move(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &MotorState,
        _direction: i32,
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "constant_velocity_move"))
    }

    /// Default handler: the stored class value.
    fn get_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &MotorState,
        parameter: MotorParameter,
    ) -> Result<f64> {
        Ok(state.parameter(parameter))
    }

    /// Default handler: accept the value; the generic layer stores it.
    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &MotorState,
        _parameter: MotorParameter,
        _value: f64,
    ) -> Result<()> {
        Ok(())
    }

    /// Default handler: busy as last recorded in the class block.
    fn get_status(&mut self, _cx: &mut DriverContext<'_>, state: &MotorState) -> Result<u64> {
        Ok(if state.busy { MOTOR_IS_BUSY } else { 0 })
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn MotorOps> {
    driver
        .as_motor()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Starts a move to `destination` in user units.
pub fn move_absolute(db: &mut RecordDatabase, id: RecordId, destination: f64) -> Result<()> {
    const OP: &str = "move_absolute";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        state.check_limits(destination, OP)?;
        let ops = contract(driver, OP)?;

        transact(state, |state| {
            let relative = destination - state.position;
            let backlash = state.backlash_correction;
            let with_backlash = backlash != 0.0 && relative * backlash > 0.0;
            let first_leg = if with_backlash {
                destination + backlash
            } else {
                destination
            };
            // The backlash leg overshoots the destination; it must stay
            // inside the limits too.
            state.check_limits(first_leg, OP)?;
            state.backlash_move_in_progress = with_backlash;
            state.pending_destination = with_backlash.then_some(destination);
            debug!(
                "Motor '{}' moving to {} (first leg {})",
                cx.record_name(),
                destination,
                first_leg
            );
            let raw = state.to_raw(first_leg, OP)?;
            ops.move_absolute(cx, state, raw)?;
            state.destination = destination;
            state.busy = true;
            Ok(())
        })
    })
}

/// Current position in user units.
pub fn get_position(db: &mut RecordDatabase, id: RecordId) -> Result<f64> {
    const OP: &str = "get_position";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let raw = contract(driver, OP)?.get_position(cx, state)?;
        state.position = state.to_user(raw);
        Ok(state.position)
    })
}

/// Redefines the current position without moving.
pub fn set_position(db: &mut RecordDatabase, id: RecordId, position: f64) -> Result<()> {
    const OP: &str = "set_position";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let raw = state.to_raw(position, OP)?;
        contract(driver, OP)?.set_position(cx, state, raw)?;
        state.position = position;
        Ok(())
    })
}

fn forget_pending(state: &mut MotorState) {
    state.pending_destination = None;
    state.backlash_move_in_progress = false;
}

/// Decelerates to a stop.
pub fn soft_abort(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "soft_abort";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        contract(driver, OP)?.soft_abort(cx, state)?;
        forget_pending(state);
        Ok(())
    })
}

/// Stops without deceleration and drops any backlash leg.
pub fn immediate_abort(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "immediate_abort";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        contract(driver, OP)?.immediate_abort(cx, state)?;
        forget_pending(state);
        Ok(())
    })
}

/// Starts a home search; `direction` is the sign of the search in user units.
pub fn raw_home_command(db: &mut RecordDatabase, id: RecordId, direction: i32) -> Result<()> {
    const OP: &str = "raw_home_command";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let raw_direction = state.raw_direction(direction);
        contract(driver, OP)?.raw_home_command(cx, state, raw_direction)?;
        forget_pending(state);
        state.busy = true;
        Ok(())
    })
}

/// Moves indefinitely; `direction` is positive or negative.
pub fn constant_velocity_move(db: &mut RecordDatabase, id: RecordId, direction: i32) -> Result<()> {
    const OP: &str = "constant_velocity_move";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let raw_direction = state.raw_direction(direction);
        contract(driver, OP)?.constant_velocity_move(cx, state, raw_direction)?;
        forget_pending(state);
        state.busy = true;
        Ok(())
    })
}

/// Reads a motion parameter in user units.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: MotorParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let value = contract(driver, OP)?.get_parameter(cx, state, parameter)?;
        state.store_parameter(parameter, value);
        Ok(value)
    })
}

/// Writes a motion parameter in user units.
pub fn set_parameter(db: &mut RecordDatabase, id: RecordId, parameter: MotorParameter, value: f64) -> Result<()> {
    const OP: &str = "set_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        contract(driver, OP)?.set_parameter(cx, state, parameter, value)?;
        state.store_parameter(parameter, value);
        Ok(())
    })
}

/// Refreshes the status word, advancing a backlash move when its first leg
/// has finished.
pub fn get_status(db: &mut RecordDatabase, id: RecordId) -> Result<u64> {
    const OP: &str = "get_status";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.motor_mut(OP)?;
        let ops = contract(driver, OP)?;

        let mut status = ops.get_status(cx, state)?;
        let busy = status & MOTOR_IS_BUSY != 0;

        if state.backlash_move_in_progress && !busy {
            state.backlash_move_in_progress = false;
        }
        if !state.backlash_move_in_progress && !busy {
            if let Some(destination) = state.pending_destination {
                debug!(
                    "Motor '{}' backlash leg done, final move to {}",
                    cx.record_name(),
                    destination
                );
                let raw = state.to_raw(destination, OP)?;
                ops.move_absolute(cx, state, raw)?;
                state.pending_destination = None;
                status |= MOTOR_IS_BUSY;
            }
        }

        state.status = status;
        state.busy = status & MOTOR_IS_BUSY != 0;
        Ok(status)
    })
}

/// True while a move, including its backlash leg, is in progress.
pub fn is_busy(db: &mut RecordDatabase, id: RecordId) -> Result<bool> {
    Ok(get_status(db, id)? & MOTOR_IS_BUSY != 0)
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match field {
        "position" => get_position(db, id).map(|_| ()),
        "busy" | "status" | "backlash_move_in_progress" => get_status(db, id).map(|_| ()),
        _ => match MotorParameter::from_field(field) {
            Some(parameter) => get_parameter(db, id, parameter).map(|_| ()),
            None => Ok(()),
        },
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match field {
        "destination" => move_absolute(db, id, argument(value, field)?).map(|_| true),
        "position" => set_position(db, id, argument(value, field)?).map(|_| true),
        _ => match MotorParameter::from_field(field) {
            Some(parameter) => set_parameter(db, id, parameter, argument(value, field)?).map(|_| true),
            None => Ok(false),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_user_raw_conversion() {
        let state = MotorState {
            scale: 0.5,
            offset: 10.0,
            ..Default::default()
        };
        assert_eq!(state.to_raw(12.0, "t").unwrap(), 4.0);
        assert_eq!(state.to_user(4.0), 12.0);
    }

    #[test]
    fn test_zero_scale_rejected() {
        let state = MotorState {
            scale: 0.0,
            ..Default::default()
        };
        assert_eq!(state.to_raw(1.0, "t").unwrap_err().kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn test_limits() {
        let mut state = MotorState::default();
        assert!(state.check_limits(1e9, "t").is_ok(), "equal limits disable checking");
        state.negative_limit = -5.0;
        state.positive_limit = 5.0;
        assert!(state.check_limits(5.0, "t").is_ok());
        let err = state.check_limits(5.5, "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::WouldExceedLimit);
    }

    #[test]
    fn test_parameter_fields() {
        assert_eq!(MotorParameter::from_field("speed"), Some(MotorParameter::Speed));
        assert_eq!(MotorParameter::from_field("position"), None);
    }
}
