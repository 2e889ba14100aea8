//! Simulated motor.
//!
//! Moves at the class `speed` (raw units per second) against the database
//! clock, so a test driving a [`ManualClock`](mx_core::ManualClock) sees the
//! motor arrive exactly when the clock says it should. A speed of zero makes
//! every move complete immediately. Constant-velocity moves run until an
//! abort and need a nonzero speed.

use std::time::Instant;

use mx_core::class::motor::{MotorOps, MotorParameter, MotorState, MOTOR_IS_BUSY};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, Result,
};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: f64,
    /// Infinite for a constant-velocity move.
    to: f64,
    speed: f64,
    started: Instant,
}

impl Motion {
    /// Position at `now`, and whether the move has finished.
    fn at(&self, now: Instant) -> (f64, bool) {
        let travelled = self.speed * now.saturating_duration_since(self.started).as_secs_f64();
        let distance = (self.to - self.from).abs();
        if travelled >= distance {
            (self.to, true)
        } else {
            (self.from + travelled * (self.to - self.from).signum(), false)
        }
    }
}

#[derive(Debug, Default)]
pub struct SoftMotor {
    /// Raw position where the last move or redefinition left the motor.
    pub simulated_position: f64,
    /// Raw position a home search goes to.
    pub home_position: f64,
    motion: Option<Motion>,
}

mx_core::field_accessors!(SoftMotor {
    "simulated_position" => simulated_position,
    "home_position" => home_position,
});

impl SoftMotor {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("simulated_position", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("home_position", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_motor", RecordClass::Motor, Self::FIELDS, || {
            Box::<SoftMotor>::default()
        })
    }

    /// Advances the simulation to `now`.
    fn update(&mut self, now: Instant) -> f64 {
        if let Some(motion) = self.motion {
            let (position, done) = motion.at(now);
            self.simulated_position = position;
            if done {
                self.motion = None;
            }
        }
        self.simulated_position
    }

    fn start(&mut self, now: Instant, to: f64, speed: f64) {
        let from = self.update(now);
        if speed <= 0.0 || !speed.is_finite() {
            self.simulated_position = to;
            self.motion = None;
        } else {
            self.motion = Some(Motion {
                from,
                to,
                speed,
                started: now,
            });
        }
    }
}

impl RecordDriver for SoftMotor {
    fn open(&mut self, _cx: &mut DriverContext<'_>, class: &mut ClassState) -> Result<()> {
        let state = class.motor_mut("open")?;
        if state.scale != 0.0 {
            self.simulated_position = (state.position - state.offset) / state.scale;
        }
        Ok(())
    }

    fn as_motor(&mut self) -> Option<&mut dyn MotorOps> {
        Some(self)
    }
}

impl MotorOps for SoftMotor {
    fn move_absolute(&mut self, cx: &mut DriverContext<'_>, state: &MotorState, raw: f64) -> Result<()> {
        debug!("'{}' raw move to {}", cx.record_name(), raw);
        self.start(cx.now(), raw, state.speed);
        Ok(())
    }

    fn get_position(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<f64> {
        Ok(self.update(cx.now()))
    }

    fn set_position(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState, raw: f64) -> Result<()> {
        self.update(cx.now());
        if self.motion.is_some() {
            return Err(MxError::not_ready(
                "set_position",
                "cannot redefine the position of a moving motor",
            ));
        }
        self.simulated_position = raw;
        Ok(())
    }

    fn soft_abort(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<()> {
        self.update(cx.now());
        self.motion = None;
        Ok(())
    }

    fn raw_home_command(&mut self, cx: &mut DriverContext<'_>, state: &MotorState, _direction: i32) -> Result<()> {
        self.start(cx.now(), self.home_position, state.speed);
        Ok(())
    }

    fn constant_velocity_move(&mut self, cx: &mut DriverContext<'_>, state: &MotorState, direction: i32) -> Result<()> {
        if state.speed <= 0.0 {
            return Err(MxError::illegal_argument(
                "constant_velocity_move",
                "a constant-velocity move needs a nonzero speed",
            ));
        }
        let to = if direction < 0 {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        self.start(cx.now(), to, state.speed);
        Ok(())
    }

    fn set_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &MotorState,
        parameter: MotorParameter,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(MxError::illegal_argument(
                "set_parameter",
                format!("{} is not a valid {}", value, parameter.field()),
            ));
        }
        // A move in progress continues from where it is at the new speed.
        if parameter == MotorParameter::Speed {
            if let Some(motion) = self.motion {
                self.start(cx.now(), motion.to, value);
            }
        }
        Ok(())
    }

    fn get_status(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<u64> {
        self.update(cx.now());
        Ok(if self.motion.is_some() { MOTOR_IS_BUSY } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_motion_interpolates_and_finishes() {
        let t0 = Instant::now();
        let motion = Motion {
            from: 0.0,
            to: -10.0,
            speed: 4.0,
            started: t0,
        };
        assert_eq!(motion.at(t0 + Duration::from_secs(1)), (-4.0, false));
        assert_eq!(motion.at(t0 + Duration::from_secs(3)), (-10.0, true));
    }

    #[test]
    fn test_constant_velocity_never_finishes() {
        let t0 = Instant::now();
        let motion = Motion {
            from: 1.0,
            to: f64::INFINITY,
            speed: 2.0,
            started: t0,
        };
        assert_eq!(motion.at(t0 + Duration::from_secs(100)), (201.0, false));
    }
}
