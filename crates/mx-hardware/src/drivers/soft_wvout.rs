//! Simulated waveform generator.
//!
//! Keeps its own copy of every channel. A triggered run plays
//! `current_num_steps` steps at `frequency` steps per second,
//! `trigger_repeat` times, and reports busy for that long on the database
//! clock. A repeat count of zero plays until `stop`.

use std::time::{Duration, Instant};

use mx_core::class::waveform_output::{WaveformOutputOps, WaveformOutputState};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, MxError, RecordClass, RecordDriver, Result,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SoftWaveformOutput {
    channels: Vec<Vec<f64>>,
    armed: bool,
    started: Option<Instant>,
    /// `None` for an endless run.
    run_length: Option<Duration>,
}

mx_core::field_accessors!(SoftWaveformOutput {});

impl SoftWaveformOutput {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_wvout", RecordClass::WaveformOutput, &[], || {
            Box::<SoftWaveformOutput>::default()
        })
    }

    fn running(&mut self, now: Instant) -> bool {
        let Some(started) = self.started else {
            return false;
        };
        match self.run_length {
            Some(length) if now.saturating_duration_since(started) >= length => {
                self.started = None;
                false
            }
            _ => true,
        }
    }
}

impl RecordDriver for SoftWaveformOutput {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        class: &mut ClassState,
    ) -> Result<()> {
        let state = class.waveform_output("finish_record_initialization")?;
        self.channels = vec![vec![0.0; state.maximum_num_steps]; state.maximum_num_channels];
        Ok(())
    }

    fn as_waveform_output(&mut self) -> Option<&mut dyn WaveformOutputOps> {
        Some(self)
    }
}

impl WaveformOutputOps for SoftWaveformOutput {
    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        self.armed = true;
        Ok(())
    }

    fn trigger(&mut self, cx: &mut DriverContext<'_>, state: &WaveformOutputState) -> Result<()> {
        const OP: &str = "trigger";
        if !self.armed {
            return Err(MxError::not_ready(OP, "waveform output must be armed before a trigger"));
        }
        if !state.frequency.is_finite() || state.frequency <= 0.0 {
            return Err(MxError::illegal_argument(
                OP,
                format!("step frequency {} is not positive", state.frequency),
            ));
        }
        self.run_length = match u32::try_from(state.trigger_repeat) {
            Ok(0) => None,
            Ok(repeat) => {
                let once = state.current_num_steps as f64 / state.frequency;
                Some(Duration::try_from_secs_f64(once * f64::from(repeat)).map_err(|_| {
                    MxError::illegal_argument(OP, "waveform run is too long to time")
                })?)
            }
            Err(_) => {
                return Err(MxError::illegal_argument(
                    OP,
                    format!("trigger repeat {} is out of range", state.trigger_repeat),
                ))
            }
        };
        self.armed = false;
        self.started = Some(cx.now());
        debug!(
            "'{}' playing {} steps at {} Hz",
            cx.record_name(),
            state.current_num_steps,
            state.frequency
        );
        Ok(())
    }

    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        self.started = None;
        self.armed = false;
        Ok(())
    }

    fn busy(&mut self, cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<bool> {
        Ok(self.running(cx.now()))
    }

    fn read_channel(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &WaveformOutputState,
        channel: usize,
    ) -> Result<Vec<f64>> {
        let mut data = self.channels.get(channel).cloned().unwrap_or_default();
        data.truncate(state.current_num_steps);
        Ok(data)
    }

    fn write_channel(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        channel: usize,
        data: &[f64],
    ) -> Result<()> {
        let slot = self.channels.get_mut(channel).ok_or_else(|| {
            MxError::illegal_argument("write_channel", format!("channel {} does not exist", channel))
        })?;
        *slot = data.to_vec();
        Ok(())
    }
}
