//! Video inputs: frame grabbers and cameras.

use serde::{Deserialize, Serialize};

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind};
use crate::limits::validate_array_length;
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::transact;

const CLASS: RecordClass = RecordClass::VideoInput;

/// Status bit: a sequence is being acquired.
pub const VINPUT_IS_BUSY: u64 = 0x1;

/// One captured image, row major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u16>,
}

impl Frame {
    pub fn pixel(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }
}

/// Status reported by `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoStatus {
    /// Frame number of the most recent frame, `None` before the first.
    pub last_frame_number: Option<u64>,
    pub total_num_frames: u64,
    pub status: u64,
}

impl VideoStatus {
    pub fn is_busy(&self) -> bool {
        self.status & VINPUT_IS_BUSY != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoParameter {
    FramesizeX,
    FramesizeY,
    NumFrames,
    BitsPerPixel,
}

#[derive(Debug, Clone)]
pub struct VideoInputState {
    pub framesize_x: usize,
    pub framesize_y: usize,
    /// Frames acquired per trigger.
    pub num_frames: u64,
    pub bits_per_pixel: u32,
    pub busy: bool,
    /// -1 before the first frame.
    pub last_frame_number: i64,
    pub total_num_frames: u64,
}

impl Default for VideoInputState {
    fn default() -> Self {
        Self {
            framesize_x: 0,
            framesize_y: 0,
            num_frames: 1,
            bits_per_pixel: 16,
            busy: false,
            last_frame_number: -1,
            total_num_frames: 0,
        }
    }
}

crate::field_accessors!(VideoInputState {
    "framesize_x" => framesize_x,
    "framesize_y" => framesize_y,
    "num_frames" => num_frames,
    "bits_per_pixel" => bits_per_pixel,
    "busy" => busy,
    "last_frame_number" => last_frame_number,
    "total_num_frames" => total_num_frames,
});

impl VideoInputState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("framesize_x", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("framesize_y", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("num_frames", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("bits_per_pixel", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("busy", FieldKind::Bool, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("last_frame_number", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
        FieldDescriptor::new("total_num_frames", FieldKind::UInt, FieldBlock::Class)
            .flags(FieldFlags::READ_ONLY),
    ];

    fn parameter(&self, parameter: VideoParameter) -> f64 {
        match parameter {
            VideoParameter::FramesizeX => self.framesize_x as f64,
            VideoParameter::FramesizeY => self.framesize_y as f64,
            VideoParameter::NumFrames => self.num_frames as f64,
            VideoParameter::BitsPerPixel => self.bits_per_pixel as f64,
        }
    }

    fn store_parameter(&mut self, parameter: VideoParameter, value: u64, operation: &str) -> Result<()> {
        let too_large = || {
            MxError::out_of_range(
                operation,
                format!("{} is too large for video parameter {:?}", value, parameter),
            )
        };
        match parameter {
            VideoParameter::FramesizeX => {
                self.framesize_x = usize::try_from(value).map_err(|_| too_large())?
            }
            VideoParameter::FramesizeY => {
                self.framesize_y = usize::try_from(value).map_err(|_| too_large())?
            }
            VideoParameter::NumFrames => self.num_frames = value,
            VideoParameter::BitsPerPixel => {
                self.bits_per_pixel = u32::try_from(value).map_err(|_| too_large())?
            }
        }
        Ok(())
    }
}

/// Operation slots of a video input.
pub trait VideoInputOps {
    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "arm"))
    }

    fn trigger(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "trigger"))
    }

    fn stop(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState) -> Result<()> {
        Err(MxError::unsupported(CLASS, "stop"))
    }

    /// Default handler: a stop.
    fn abort(&mut self, cx: &mut DriverContext<'_>, state: &VideoInputState) -> Result<()> {
        self.stop(cx, state)
    }

    fn get_status(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState) -> Result<VideoStatus> {
        Err(MxError::unsupported(CLASS, "get_status"))
    }

    fn get_frame(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState, _frame: u64) -> Result<Frame> {
        Err(MxError::unsupported(CLASS, "get_frame"))
    }

    /// Default handler: the stored class value.
    fn get_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        state: &VideoInputState,
        parameter: VideoParameter,
    ) -> Result<f64> {
        Ok(state.parameter(parameter))
    }

    /// Default handler: accept; the generic layer stores the value.
    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &VideoInputState,
        _parameter: VideoParameter,
        _value: f64,
    ) -> Result<()> {
        Ok(())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn VideoInputOps> {
    driver
        .as_video_input()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Prepares an acquisition for an external trigger.
pub fn arm(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "arm";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        contract(driver, OP)?.arm(cx, state)
    })
}

/// Starts an acquisition.
pub fn trigger(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "trigger";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        contract(driver, OP)?.trigger(cx, state)?;
        state.busy = true;
        Ok(())
    })
}

/// Ends the acquisition.
pub fn stop(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "stop";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        contract(driver, OP)?.stop(cx, state)?;
        state.busy = false;
        Ok(())
    })
}

/// Ends the acquisition at once.
pub fn abort(db: &mut RecordDatabase, id: RecordId) -> Result<()> {
    const OP: &str = "abort";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        contract(driver, OP)?.abort(cx, state)?;
        state.busy = false;
        Ok(())
    })
}

/// Busy flag and frame counters.
pub fn get_status(db: &mut RecordDatabase, id: RecordId) -> Result<VideoStatus> {
    const OP: &str = "get_status";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        let status = contract(driver, OP)?.get_status(cx, state)?;
        state.busy = status.is_busy();
        state.last_frame_number = status.last_frame_number.map_or(-1, |n| n as i64);
        state.total_num_frames = status.total_num_frames;
        Ok(status)
    })
}

/// Fetches one frame; the driver's frame must match the configured size.
pub fn get_frame(db: &mut RecordDatabase, id: RecordId, frame_number: u64) -> Result<Frame> {
    const OP: &str = "get_frame";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        if state.last_frame_number < 0 || frame_number > state.last_frame_number as u64 {
            return Err(MxError::out_of_range(
                OP,
                format!(
                    "frame {} has not been acquired (last frame {})",
                    frame_number, state.last_frame_number
                ),
            ));
        }
        validate_array_length("frame", state.framesize_x.saturating_mul(state.framesize_y))?;
        let frame = contract(driver, OP)?.get_frame(cx, state, frame_number)?;
        if frame.width != state.framesize_x
            || frame.height != state.framesize_y
            || frame.pixels.len() != frame.width * frame.height
        {
            return Err(MxError::device_io(
                OP,
                format!(
                    "frame is {}x{} with {} pixels, expected {}x{}",
                    frame.width,
                    frame.height,
                    frame.pixels.len(),
                    state.framesize_x,
                    state.framesize_y
                ),
            ));
        }
        Ok(frame)
    })
}

/// Reads an acquisition parameter.
pub fn get_parameter(db: &mut RecordDatabase, id: RecordId, parameter: VideoParameter) -> Result<f64> {
    const OP: &str = "get_parameter";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        contract(driver, OP)?.get_parameter(cx, state, parameter)
    })
}

/// Writes an acquisition parameter. The value must be a whole number
/// that fits the parameter; refused while busy.
pub fn set_parameter(db: &mut RecordDatabase, id: RecordId, parameter: VideoParameter, value: f64) -> Result<()> {
    const OP: &str = "set_parameter";
    let whole = whole_number(value, OP)?;
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.video_input_mut(OP)?;
        if state.busy {
            return Err(MxError::not_ready(OP, "cannot change parameters while acquiring"));
        }
        let ops = contract(driver, OP)?;
        transact(state, |state| {
            state.store_parameter(parameter, whole, OP)?;
            ops.set_parameter(cx, state, parameter, value)
        })
    })
}

/// Non-negative integral value below 2^64.
fn whole_number(value: f64, operation: &str) -> Result<u64> {
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(MxError::illegal_argument(
            operation,
            format!("{} is not a valid video parameter value", value),
        ));
    }
    if value >= LIMIT {
        return Err(MxError::out_of_range(
            operation,
            format!("{} is too large for a video parameter", value),
        ));
    }
    // In range and integral, so the cast is exact.
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_frame_pixel_indexing() {
        let frame = Frame {
            width: 3,
            height: 2,
            pixels: vec![0, 1, 2, 10, 11, 12],
        };
        assert_eq!(frame.pixel(1, 1), Some(11));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
    }

    #[test]
    fn test_whole_number_rejects_fractions_and_overflow() {
        assert_eq!(whole_number(640.0, "set_parameter").unwrap(), 640);
        assert_eq!(
            whole_number(0.5, "set_parameter").unwrap_err().kind,
            ErrorKind::IllegalArgument
        );
        assert_eq!(
            whole_number(1e20, "set_parameter").unwrap_err().kind,
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn test_store_parameter_rejects_values_wider_than_the_field() {
        let mut state = VideoInputState::default();
        let before = state.bits_per_pixel;
        let err = state
            .store_parameter(VideoParameter::BitsPerPixel, 1 << 40, "set_parameter")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
        assert_eq!(state.bits_per_pixel, before);

        state
            .store_parameter(VideoParameter::NumFrames, 1 << 40, "set_parameter")
            .unwrap();
        assert_eq!(state.num_frames, 1 << 40);
    }
}
