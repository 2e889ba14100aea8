//! Waveform outputs: multi-channel arbitrary waveform generators.
//!
//! The class block keeps a copy of every channel, `maximum_num_channels` by
//! `maximum_num_steps`. Channel writes shorter than `maximum_num_steps` are
//! zero-filled before they reach the driver.

use tracing::debug;

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{Dim, FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::limits::validate_array_length;
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::argument;

const CLASS: RecordClass = RecordClass::WaveformOutput;

/// Trigger mode: start on the `trigger` operation.
pub const WVOUT_INTERNAL_TRIGGER: i64 = 1;
/// Trigger mode: start on an external edge.
pub const WVOUT_EXTERNAL_TRIGGER: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformParameter {
    /// Steps per second.
    Frequency,
    TriggerMode,
    /// Times the waveform is replayed per trigger; 0 repeats forever.
    TriggerRepeat,
}

impl WaveformParameter {
    pub fn field(self) -> &'static str {
        match self {
            WaveformParameter::Frequency => "frequency",
            WaveformParameter::TriggerMode => "trigger_mode",
            WaveformParameter::TriggerRepeat => "trigger_repeat",
        }
    }

    pub fn from_field(name: &str) -> Option<Self> {
        [
            WaveformParameter::Frequency,
            WaveformParameter::TriggerMode,
            WaveformParameter::TriggerRepeat,
        ]
        .into_iter()
        .find(|p| p.field() == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WaveformOutputState {
    pub maximum_num_channels: usize,
    pub maximum_num_steps: usize,
    pub current_num_steps: usize,
    /// Channel addressed by `channel_data` field access.
    pub channel_index: usize,
    pub channel_data: Vec<f64>,
    pub data: Vec<Vec<f64>>,
    pub frequency: f64,
    pub trigger_mode: i64,
    pub trigger_repeat: i64,
    pub busy: bool,
    /// Field-service command flags; writing true runs the operation.
    pub arm: bool,
    pub trigger: bool,
    pub stop: bool,
}

crate::field_accessors!(WaveformOutputState {
    "maximum_num_channels" => maximum_num_channels,
    "maximum_num_steps" => maximum_num_steps,
    "current_num_steps" => current_num_steps,
    "channel_index" => channel_index,
    "channel_data" => channel_data,
    "data" => data,
    "frequency" => frequency,
    "trigger_mode" => trigger_mode,
    "trigger_repeat" => trigger_repeat,
    "busy" => busy,
    "arm" => arm,
    "trigger" => trigger,
    "stop" => stop,
});

impl WaveformOutputState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("maximum_num_channels", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("maximum_num_steps", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("current_num_steps", FieldKind::UInt, FieldBlock::Class),
        FieldDescriptor::new("channel_index", FieldKind::UInt, FieldBlock::Class),
        FieldDescriptor::new("channel_data", FieldKind::Float, FieldBlock::Class)
            .dims(&[Dim::Varargs("maximum_num_steps")]),
        FieldDescriptor::new("data", FieldKind::Float, FieldBlock::Class)
            .dims(&[
                Dim::Varargs("maximum_num_channels"),
                Dim::Varargs("maximum_num_steps"),
            ])
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("frequency", FieldKind::Float, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("trigger_mode", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("trigger_repeat", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::IN_SUMMARY.union(FieldFlags::READ_ONLY)),
        FieldDescriptor::new("arm", FieldKind::Bool, FieldBlock::Class),
        FieldDescriptor::new("trigger", FieldKind::Bool, FieldBlock::Class),
        FieldDescriptor::new("stop", FieldKind::Bool, FieldBlock::Class),
    ];

    fn check_channel(&self, channel: usize, operation: &str) -> Result<()> {
        if channel >= self.maximum_num_channels {
            return Err(MxError::illegal_argument(
                operation,
                format!(
                    "channel {} does not exist, the output has {}",
                    channel, self.maximum_num_channels
                ),
            ));
        }
        Ok(())
    }

    /// Stored copy of one channel, zero-padded to `maximum_num_steps`.
    pub fn channel(&self, channel: usize) -> Vec<f64> {
        let mut data = self.data.get(channel).cloned().unwrap_or_default();
        data.resize(self.maximum_num_steps, 0.0);
        data
    }

    fn store_channel(&mut self, channel: usize, data: &[f64]) {
        if self.data.len() < self.maximum_num_channels {
            self.data.resize(self.maximum_num_channels, Vec::new());
        }
        if let Some(slot) = self.data.get_mut(channel) {
            *slot = data.to_vec();
            slot.resize(self.maximum_num_steps, 0.0);
        }
        self.channel_data = data.to_vec();
        self.channel_data.resize(self.maximum_num_steps, 0.0);
    }

    pub fn parameter(&self, parameter: WaveformParameter) -> f64 {
        match parameter {
            WaveformParameter::Frequency => self.frequency,
            WaveformParameter::TriggerMode => self.trigger_mode as f64,
            WaveformParameter::TriggerRepeat => self.trigger_repeat as f64,
        }
    }

    fn store_parameter(&mut self, parameter: WaveformParameter, value: f64) {
        match parameter {
            WaveformParameter::Frequency => self.frequency = value,
            WaveformParameter::TriggerMode => self.trigger_mode = value as i64,
            WaveformParameter::TriggerRepeat => self.trigger_repeat = value as i64,
        }
    }
}

/// Operation slots of a waveform output.
pub trait WaveformOutputOps {
    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "arm"))
    }

    fn trigger(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "trigger"))
    }

    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "stop"))
    }

    /// Default handler: the busy flag of the class block.
    fn busy(&mut self, _cx: &mut DriverContext<'_>, state: &WaveformOutputState) -> Result<bool> {
        Ok(state.busy)
    }

    /// Default handler: the stored copy of the channel.
    fn read_channel(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &WaveformOutputState,
        channel: usize,
    ) -> Result<Vec<f64>> {
        let mut data = state.channel(channel);
        data.truncate(state.current_num_steps);
        Ok(data)
    }

    /// `data` always holds `maximum_num_steps` values.
    fn write_channel(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        _channel: usize,
        _data: &[f64],
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "write_channel"))
    }

    /// Default handler: the stored class value.
    fn get_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &WaveformOutputState,
        parameter: WaveformParameter,
    ) -> Result<f64> {
        Ok(state.parameter(parameter))
    }

    /// Default handler: accept; the generic layer stores the value.
    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        _parameter: WaveformParameter,
        _value: f64,
    ) -> Result<()> {
        Ok(())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn WaveformOutputOps> {
    driver
        .as_waveform_output()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Arms playback to start on a trigger.
pub fn arm(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "arm";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        contract(driver, OP)?.arm(cx, state)
    })
}

/// Starts playback.
pub fn trigger(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "trigger";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
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

/// Stops playback.
pub fn stop(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "stop";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        contract(driver, OP)?.stop(cx, state)?;
        state.busy = false;
        Ok(())
    })
}

/// True while playback is running.
pub fn busy(db: &mut RecordDatabase, id: RecordId) -> Result<bool> {
    const OP: &str = "busy";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        state.busy = contract(driver, OP)?.busy(cx, state)?;
        Ok(state.busy)
    })
}

/// Reads one channel back from the device.
pub fn read_channel(db: &mut RecordDatabase, id: RecordId, channel: usize) -> Result<Vec<f64>> {
    const OP: &str = "read_channel";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        state.check_channel(channel, OP)?;
        let data = contract(driver, OP)?.read_channel(cx, state, channel)?;
        if data.len() > state.maximum_num_steps {
            return Err(MxError::out_of_range(
                OP,
                format!(
                    "device returned {} steps, the output holds at most {}",
                    data.len(),
                    state.maximum_num_steps
                ),
            ));
        }
        state.current_num_steps = data.len();
        state.channel_index = channel;
        state.store_channel(channel, &data);
        Ok(data)
    })
}

/// Writes one channel; shorter data is zero-filled to `maximum_num_steps`.
pub fn write_channel(db: &mut RecordDatabase, id: RecordId, channel: usize, data: &[f64]) -> Result<()> {
    const OP: &str = "write_channel";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        state.check_channel(channel, OP)?;
        validate_array_length("channel_data", state.maximum_num_steps)?;
        if data.len() > state.maximum_num_steps {
            return Err(MxError::out_of_range(
                OP,
                format!(
                    "{} steps written, the output holds at most {}",
                    data.len(),
                    state.maximum_num_steps
                ),
            ));
        }
        let mut padded = data.to_vec();
        padded.resize(state.maximum_num_steps, 0.0);

        debug!(
            "Writing {} steps to channel {} of '{}'",
            data.len(),
            channel,
            cx.record_name()
        );
        contract(driver, OP)?.write_channel(cx, state, channel, &padded)?;
        state.channel_index = channel;
        state.current_num_steps = data.len();
        state.store_channel(channel, &padded);
        Ok(())
    })
}

/// Reads a playback parameter.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: WaveformParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        let value = contract(driver, OP)?.get_parameter(cx, state, parameter)?;
        state.store_parameter(parameter, value);
        Ok(value)
    })
}

/// Writes a playback parameter.
pub fn set_parameter(db: &mut RecordDatabase, id: RecordId, parameter: WaveformParameter, value: f64) -> Result<()> {
    const OP: &str = "set_parameter";
    if parameter == WaveformParameter::TriggerMode
        && value != WVOUT_INTERNAL_TRIGGER as f64
        && value != WVOUT_EXTERNAL_TRIGGER as f64
    {
        return Err(MxError::illegal_argument(
            OP,
            format!("trigger mode {} is neither internal (1) nor external (2)", value),
        ));
    }
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.waveform_output_mut(OP)?;
        contract(driver, OP)?.set_parameter(cx, state, parameter, value)?;
        state.store_parameter(parameter, value);
        Ok(())
    })
}

fn channel_index(db: &RecordDatabase, id: RecordId) -> Result<usize> {
    const OP: &str = "channel_index";
    db.with_class_state(id, OP, |c| c.waveform_output(OP).map(|s| s.channel_index))?
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match field {
        "busy" => busy(db, id).map(|_| ()),
        "channel_data" | "current_num_steps" => {
            let channel = channel_index(db, id)?;
            read_channel(db, id, channel).map(|_| ())
        }
        _ => match WaveformParameter::from_field(field) {
            Some(parameter) => get_parameter(db, id, parameter).map(|_| ()),
            None => Ok(()),
        },
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match field {
        "arm" | "trigger" | "stop" => {
            if argument::<bool>(value, field)? {
                match field {
                    "arm" => arm(db, id)?,
                    "trigger" => trigger(db, id)?,
                    _ => stop(db, id)?,
                }
            }
            Ok(true)
        }
        "channel_data" => {
            let data: Vec<f64> = argument(value, field)?;
            let channel = channel_index(db, id)?;
            write_channel(db, id, channel, &data).map(|_| true)
        }
        _ => match WaveformParameter::from_field(field) {
            Some(parameter) => set_parameter(db, id, parameter, argument(value, field)?).map(|_| true),
            None => Ok(false),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WaveformOutputState {
        WaveformOutputState {
            maximum_num_channels: 2,
            maximum_num_steps: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_store_channel_zero_fills() {
        let mut s = state();
        s.store_channel(1, &[1.0, 2.0]);
        assert_eq!(s.channel(1), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(s.channel(0), vec![0.0; 4]);
        assert_eq!(s.data.len(), 2);
    }

    #[test]
    fn test_channel_bounds() {
        let s = state();
        assert!(s.check_channel(1, "t").is_ok());
        assert!(s.check_channel(2, "t").is_err());
    }
}
