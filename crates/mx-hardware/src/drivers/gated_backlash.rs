//! Motor wrapper that gates a signal during backlash correction.
//!
//! Every motor operation is forwarded to `real_motor`, with this record's raw
//! units being the real motor's user units. When the generic motor layer
//! starts the backlash leg of a move, the wrapper switches `gate_record` to
//! `gate_on` before moving. Once the real motor has stopped, the wrapper
//! keeps reporting busy for `gate_delay` seconds, then switches the gate to
//! `gate_off` and reports idle, which lets the generic layer issue the final
//! leg with the gate off.
//!
//! The gate may be a digital output (value written as an integer), an
//! analog output (value in user units) or a relay (nonzero closes it).
//!
//! # Example
//!
//! ```toml
//! [[record]]
//! name = "theta_gated"
//! type = "gated_backlash"
//! fields = { real_motor = "theta", gate_record = "gate_bit", gate_on = 1, gate_off = 0, gate_delay = 0.25 }
//! ```

use std::time::{Duration, Instant};

use mx_core::class::motor::{self, MotorOps, MotorParameter, MotorState, MOTOR_IS_BUSY};
use mx_core::class::relay::RelayCommand;
use mx_core::class::{analog_output, digital_output, relay};
use mx_core::limits::DEFAULT_GATE_DELAY;
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, RecordId, RecordRef, RefRequirement, Result,
    Superclass,
};
use tracing::debug;

#[derive(Debug)]
pub struct GatedBacklash {
    pub real_motor: RecordRef,
    pub gate_record: RecordRef,
    pub gate_on: f64,
    pub gate_off: f64,
    /// Seconds the gate stays on after the real motor stops.
    pub gate_delay: f64,
    gate_class: Option<RecordClass>,
    gate_is_on: bool,
    gate_off_at: Option<Instant>,
}

impl Default for GatedBacklash {
    fn default() -> Self {
        Self {
            real_motor: RecordRef::default(),
            gate_record: RecordRef::default(),
            gate_on: 1.0,
            gate_off: 0.0,
            gate_delay: DEFAULT_GATE_DELAY.as_secs_f64(),
            gate_class: None,
            gate_is_on: false,
            gate_off_at: None,
        }
    }
}

mx_core::field_accessors!(GatedBacklash {
    "real_motor" => real_motor,
    "gate_record" => gate_record,
    "gate_on" => gate_on,
    "gate_off" => gate_off,
    "gate_delay" => gate_delay,
});

impl GatedBacklash {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new(
            "real_motor",
            FieldKind::Record(RefRequirement::class(Superclass::Device, &[RecordClass::Motor])),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new(
            "gate_record",
            FieldKind::Record(RefRequirement::class(
                Superclass::Device,
                &[
                    RecordClass::DigitalOutput,
                    RecordClass::AnalogOutput,
                    RecordClass::Relay,
                ],
            )),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("gate_on", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("gate_off", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("gate_delay", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("gated_backlash", RecordClass::Motor, Self::FIELDS, || {
            Box::<GatedBacklash>::default()
        })
    }

    fn real(&self, operation: &str) -> Result<RecordId> {
        self.real_motor.id(operation)
    }

    fn set_gate(&mut self, cx: &mut DriverContext<'_>, on: bool) -> Result<()> {
        const OP: &str = "set_gate";
        let gate = self.gate_record.id(OP)?;
        let value = if on { self.gate_on } else { self.gate_off };
        debug!(
            "'{}' gate '{}' {} ({})",
            cx.record_name(),
            self.gate_record.name(),
            if on { "on" } else { "off" },
            value
        );
        match self.gate_class {
            Some(RecordClass::DigitalOutput) => {
                if value < 0.0 || value.fract() != 0.0 {
                    return Err(MxError::illegal_argument(
                        OP,
                        format!("gate value {} is not a digital output value", value),
                    ));
                }
                digital_output::write(cx.db(), gate, value as u64)?
            }
            Some(RecordClass::AnalogOutput) => analog_output::write(cx.db(), gate, value)?,
            Some(RecordClass::Relay) => {
                let command = if value != 0.0 {
                    RelayCommand::Close
                } else {
                    RelayCommand::Open
                };
                relay::relay_command(cx.db(), gate, command)?
            }
            other => {
                return Err(MxError::corrupt_state(
                    OP,
                    format!("gate record class {:?} was never resolved", other),
                ))
            }
        }
        self.gate_is_on = on;
        Ok(())
    }

    fn gate_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.gate_delay).unwrap_or(DEFAULT_GATE_DELAY)
    }
}

impl RecordDriver for GatedBacklash {
    fn finish_record_initialization(
        &mut self,
        cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        const OP: &str = "finish_record_initialization";
        if !self.gate_delay.is_finite() || self.gate_delay < 0.0 {
            return Err(MxError::illegal_argument(
                OP,
                format!("gate delay {} is not a non-negative number of seconds", self.gate_delay),
            ));
        }
        let gate = self.gate_record.id(OP)?;
        self.gate_class = Some(cx.database().record(gate)?.class());
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        self.set_gate(cx, false)
    }

    fn close(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        if self.gate_is_on {
            self.set_gate(cx, false)?;
        }
        Ok(())
    }

    fn resynchronize(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        let real = self.real("resynchronize")?;
        cx.db().resynchronize(real)
    }

    fn as_motor(&mut self) -> Option<&mut dyn MotorOps> {
        Some(self)
    }
}

impl MotorOps for GatedBacklash {
    fn move_absolute(&mut self, cx: &mut DriverContext<'_>, state: &MotorState, raw: f64) -> Result<()> {
        let real = self.real("move_absolute")?;
        if state.backlash_move_in_progress {
            self.gate_off_at = None;
            self.set_gate(cx, true)?;
        }
        motor::move_absolute(cx.db(), real, raw)
    }

    fn get_position(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<f64> {
        let real = self.real("get_position")?;
        motor::get_position(cx.db(), real)
    }

    fn set_position(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState, raw: f64) -> Result<()> {
        let real = self.real("set_position")?;
        motor::set_position(cx.db(), real, raw)
    }

    fn soft_abort(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<()> {
        let real = self.real("soft_abort")?;
        motor::soft_abort(cx.db(), real)?;
        self.gate_off_at = None;
        if self.gate_is_on {
            self.set_gate(cx, false)?;
        }
        Ok(())
    }

    fn immediate_abort(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState) -> Result<()> {
        let real = self.real("immediate_abort")?;
        motor::immediate_abort(cx.db(), real)?;
        self.gate_off_at = None;
        if self.gate_is_on {
            self.set_gate(cx, false)?;
        }
        Ok(())
    }

    fn raw_home_command(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState, direction: i32) -> Result<()> {
        let real = self.real("raw_home_command")?;
        motor::raw_home_command(cx.db(), real, direction)
    }

    fn constant_velocity_move(&mut self, cx: &mut DriverContext<'_>, _state: &MotorState, direction: i32) -> Result<()> {
        let real = self.real("constant_velocity_move")?;
        motor::constant_velocity_move(cx.db(), real, direction)
    }

    fn get_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &MotorState,
        parameter: MotorParameter,
    ) -> Result<f64> {
        let real = self.real("get_parameter")?;
        motor::get_parameter(cx.db(), real, parameter)
    }

    fn set_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &MotorState,
        parameter: MotorParameter,
        value: f64,
    ) -> Result<()> {
        let real = self.real("set_parameter")?;
        motor::set_parameter(cx.db(), real, parameter, value)
    }

    fn get_status(&mut self, cx: &mut DriverContext<'_>, state: &MotorState) -> Result<u64> {
        let real = self.real("get_status")?;
        let status = motor::get_status(cx.db(), real)?;

        if !state.backlash_move_in_progress || status & MOTOR_IS_BUSY != 0 {
            return Ok(status);
        }

        // Backlash leg finished: hold the gate for the delay, then release.
        let now = cx.now();
        let off_at = *self.gate_off_at.get_or_insert(now + self.gate_delay());
        if now < off_at {
            return Ok(status | MOTOR_IS_BUSY);
        }
        self.gate_off_at = None;
        if self.gate_is_on {
            self.set_gate(cx, false)?;
        }
        Ok(status)
    }
}
