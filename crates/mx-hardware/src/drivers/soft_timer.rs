//! Simulated count-down timer on the database clock.

use std::time::Instant;

use mx_core::class::timer::{TimerOps, TimerState, TIMER_MODE_PRESET};
use mx_core::{DriverContext, DriverDescriptor, RecordClass, RecordDriver, Result};

#[derive(Debug, Default)]
pub struct SoftTimer {
    started: Option<Instant>,
    preset: f64,
    /// Seconds counted by runs that have ended.
    counted: f64,
}

mx_core::field_accessors!(SoftTimer {});

impl SoftTimer {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_timer", RecordClass::Timer, &[], || {
            Box::<SoftTimer>::default()
        })
    }

    fn elapsed(&self, now: Instant) -> f64 {
        self.started
            .map_or(0.0, |t| now.saturating_duration_since(t).as_secs_f64())
    }

    /// Ends a preset run whose time is up.
    fn update(&mut self, now: Instant, mode: i64) {
        if mode == TIMER_MODE_PRESET && self.started.is_some() && self.elapsed(now) >= self.preset {
            self.counted = self.preset;
            self.started = None;
        }
    }
}

impl RecordDriver for SoftTimer {
    fn as_timer(&mut self) -> Option<&mut dyn TimerOps> {
        Some(self)
    }
}

impl TimerOps for SoftTimer {
    fn is_busy(&mut self, cx: &mut DriverContext<'_>, state: &TimerState) -> Result<bool> {
        self.update(cx.now(), state.mode);
        Ok(self.started.is_some())
    }

    fn start(&mut self, cx: &mut DriverContext<'_>, _state: &TimerState, seconds: f64) -> Result<()> {
        self.preset = seconds;
        self.counted = 0.0;
        self.started = Some(cx.now());
        Ok(())
    }

    fn stop(&mut self, cx: &mut DriverContext<'_>, state: &TimerState) -> Result<f64> {
        let now = cx.now();
        self.update(now, state.mode);
        if self.started.is_some() {
            self.counted = self.elapsed(now);
            self.started = None;
        }
        if state.mode == TIMER_MODE_PRESET {
            Ok((self.preset - self.counted).max(0.0))
        } else {
            Ok(0.0)
        }
    }

    fn clear(&mut self, cx: &mut DriverContext<'_>, _state: &TimerState) -> Result<()> {
        self.counted = 0.0;
        if self.started.is_some() {
            self.started = Some(cx.now());
        }
        Ok(())
    }

    fn read(&mut self, cx: &mut DriverContext<'_>, state: &TimerState) -> Result<f64> {
        let now = cx.now();
        self.update(now, state.mode);
        Ok(match self.started {
            Some(_) => self.elapsed(now),
            None => self.counted,
        })
    }
}
