//! Pulse generator that toggles a digital output in software.
//!
//! The pulse train is advanced by a repeating timer callback every
//! [`PULSER_TICK_INTERVAL`], and also whenever the busy state is polled, so
//! the edge timing is only as fine as the callback rate. Each advance makes
//! at most one transition. Every period the output is written 1 for
//! `pulse_width` seconds, then 0 for the rest of `pulse_period`; the train
//! starts `pulse_delay` seconds after the trigger.
//!
//! Transition times normally accumulate from the trigger time so late
//! callbacks do not stretch the train. With `allow_time_skew` set, each wait
//! is measured from the moment the transition was actually made.

use std::time::{Duration, Instant};

use mx_core::class::digital_output;
use mx_core::class::pulse_generator::{
    PulseGeneratorOps, PulseGeneratorState, PulseParameter, PULSE_GENERATOR_FOREVER,
    PULSE_GENERATOR_SQUARE_WAVE_MODE,
};
use mx_core::limits::PULSER_TICK_INTERVAL;
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, RecordRef, RefRequirement, Result, Superclass,
    Tick, TimerId, TimerKind,
};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct DigitalOutputPulser {
    pub digital_output: RecordRef,
    pub allow_time_skew: bool,
    output_high: bool,
    pulses_left: u64,
    count_forever: bool,
    next_transition: Option<Instant>,
    running: bool,
    timer: Option<TimerId>,
}

mx_core::field_accessors!(DigitalOutputPulser {
    "digital_output" => digital_output,
    "allow_time_skew" => allow_time_skew,
});

fn seconds(value: f64, operation: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        MxError::illegal_argument(operation, format!("{} is not a usable number of seconds", value))
    })
}

impl DigitalOutputPulser {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new(
            "digital_output",
            FieldKind::Record(RefRequirement::class(
                Superclass::Device,
                &[RecordClass::DigitalOutput],
            )),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("allow_time_skew", FieldKind::Bool, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "doutput_pulser",
            RecordClass::PulseGenerator,
            Self::FIELDS,
            || Box::<DigitalOutputPulser>::default(),
        )
    }

    fn write_output(&mut self, cx: &mut DriverContext<'_>, high: bool) -> Result<()> {
        let output = self.digital_output.id("write_output")?;
        digital_output::write(cx.db(), output, u64::from(high))?;
        self.output_high = high;
        Ok(())
    }

    fn reset(&mut self) {
        self.running = false;
        self.output_high = false;
        self.pulses_left = 0;
        self.count_forever = false;
        self.next_transition = None;
    }

    /// Makes the next due transition, if any. Returns whether the train is
    /// still running.
    fn advance(&mut self, cx: &mut DriverContext<'_>, state: &PulseGeneratorState) -> Result<bool> {
        const OP: &str = "advance";
        if !self.running {
            return Ok(false);
        }
        let now = cx.now();
        let Some(due) = self.next_transition else {
            return Err(MxError::corrupt_state(OP, "running pulse train has no next transition"));
        };
        if now < due {
            return Ok(true);
        }

        let wait = if self.output_high {
            self.write_output(cx, false)?;
            if self.pulses_left == 0 && !self.count_forever {
                debug!("'{}' pulse train finished", cx.record_name());
                self.reset();
                return Ok(false);
            }
            seconds((state.pulse_period - state.pulse_width).max(0.0), OP)?
        } else {
            self.write_output(cx, true)?;
            self.pulses_left = self.pulses_left.saturating_sub(1);
            seconds(state.pulse_width, OP)?
        };
        trace!(
            "'{}' output {} ({} pulses left)",
            cx.record_name(),
            u8::from(self.output_high),
            self.pulses_left
        );

        let base = if self.allow_time_skew { now } else { due };
        let next = base.checked_add(wait).ok_or_else(|| {
            MxError::would_exceed_limit(OP, "next pulse transition is past the end of time")
        })?;
        self.next_transition = Some(next);
        Ok(true)
    }
}

impl RecordDriver for DigitalOutputPulser {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        class: &mut ClassState,
    ) -> Result<()> {
        class.pulse_generator_mut("finish_record_initialization")?.mode =
            PULSE_GENERATOR_SQUARE_WAVE_MODE;
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        self.reset();
        self.write_output(cx, false)?;
        self.timer = Some(cx.start_timer(TimerKind::OneShot(PULSER_TICK_INTERVAL)));
        Ok(())
    }

    fn close(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        if let Some(timer) = self.timer.take() {
            cx.cancel_timer(timer);
        }
        self.reset();
        self.write_output(cx, false)
    }

    fn on_tick(&mut self, cx: &mut DriverContext<'_>, class: &mut ClassState, _tick: Tick) -> Result<()> {
        const OP: &str = "on_tick";
        let state = class.pulse_generator_mut(OP)?;
        let result = self.advance(cx, state);
        if let Ok(running) = result {
            state.busy = running;
        }
        // Keep ticking even after a failed transition.
        if let Some(timer) = self.timer {
            cx.restart_timer(timer)?;
        }
        result.map(|_| ())
    }

    fn as_pulse_generator(&mut self) -> Option<&mut dyn PulseGeneratorOps> {
        Some(self)
    }
}

impl PulseGeneratorOps for DigitalOutputPulser {
    fn is_busy(&mut self, cx: &mut DriverContext<'_>, state: &PulseGeneratorState) -> Result<bool> {
        self.advance(cx, state)
    }

    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &PulseGeneratorState) -> Result<()> {
        Ok(())
    }

    fn trigger(&mut self, cx: &mut DriverContext<'_>, state: &PulseGeneratorState) -> Result<()> {
        const OP: &str = "trigger";
        if state.pulse_width > state.pulse_period {
            return Err(MxError::illegal_argument(
                OP,
                format!(
                    "pulse width {} s is longer than the period {} s",
                    state.pulse_width, state.pulse_period
                ),
            ));
        }
        let delay = seconds(state.pulse_delay, OP)?;
        let now = cx.now();
        self.running = true;
        self.output_high = false;
        self.pulses_left = state.num_pulses;
        self.count_forever = state.num_pulses == PULSE_GENERATOR_FOREVER;
        self.next_transition = Some(now.checked_add(delay).ok_or_else(|| {
            MxError::would_exceed_limit(OP, "pulse delay is past the end of time")
        })?);
        debug!(
            "'{}' triggered: {} pulses, width {} s, period {} s",
            cx.record_name(),
            state.num_pulses,
            state.pulse_width,
            state.pulse_period
        );
        self.advance(cx, state).map(|_| ())
    }

    fn stop(&mut self, cx: &mut DriverContext<'_>, _state: &PulseGeneratorState) -> Result<()> {
        self.reset();
        self.write_output(cx, false)
    }

    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &PulseGeneratorState,
        parameter: PulseParameter,
        value: f64,
    ) -> Result<()> {
        if parameter == PulseParameter::Mode && value != PULSE_GENERATOR_SQUARE_WAVE_MODE as f64 {
            return Err(MxError::illegal_argument(
                "set_parameter",
                "a digital output pulser only supports square wave mode",
            ));
        }
        Ok(())
    }
}
