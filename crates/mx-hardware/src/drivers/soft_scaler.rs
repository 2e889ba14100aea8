//! Simulated scaler counting at a fixed `count_rate` (counts per second).
//!
//! In preset mode the count stops by itself at the preset passed to
//! `start`; in timer mode it runs until `stop`.

use std::time::Instant;

use mx_core::class::scaler::{ScalerMode, ScalerOps, ScalerState};
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    RecordClass, RecordDriver, Result,
};

#[derive(Debug)]
pub struct SoftScaler {
    pub count_rate: f64,
    /// Counts accumulated before the current run started.
    counts: i64,
    started: Option<Instant>,
    preset: Option<i64>,
}

impl Default for SoftScaler {
    fn default() -> Self {
        Self {
            count_rate: 1000.0,
            counts: 0,
            started: None,
            preset: None,
        }
    }
}

mx_core::field_accessors!(SoftScaler { "count_rate" => count_rate });

impl SoftScaler {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "count_rate",
        FieldKind::Float,
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_scaler", RecordClass::Scaler, Self::FIELDS, || {
            Box::<SoftScaler>::default()
        })
    }

    /// Current count; ends the run when a preset has been reached.
    fn update(&mut self, now: Instant) -> i64 {
        let Some(started) = self.started else {
            return self.counts;
        };
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let counted = self.counts + (self.count_rate * elapsed) as i64;
        match self.preset {
            Some(preset) if counted >= preset => {
                self.counts = preset;
                self.started = None;
                self.preset = None;
                preset
            }
            _ => counted,
        }
    }
}

impl RecordDriver for SoftScaler {
    fn as_scaler(&mut self) -> Option<&mut dyn ScalerOps> {
        Some(self)
    }
}

impl ScalerOps for SoftScaler {
    fn clear(&mut self, cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<()> {
        self.counts = 0;
        if self.started.is_some() {
            self.started = Some(cx.now());
        }
        Ok(())
    }

    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<i64> {
        Ok(self.update(cx.now()))
    }

    fn is_busy(&mut self, cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<bool> {
        self.update(cx.now());
        Ok(self.started.is_some())
    }

    fn start(&mut self, cx: &mut DriverContext<'_>, state: &ScalerState, preset: i64) -> Result<()> {
        self.counts = 0;
        self.started = Some(cx.now());
        self.preset = (state.mode == ScalerMode::Preset as i64).then_some(preset);
        Ok(())
    }

    fn stop(&mut self, cx: &mut DriverContext<'_>, _state: &ScalerState) -> Result<i64> {
        self.counts = self.update(cx.now());
        self.started = None;
        self.preset = None;
        Ok(self.counts)
    }
}
