//! Simulated camera.
//!
//! After a trigger, one frame becomes available every `frame_time` seconds
//! of database-clock time until `num_frames` have been taken. Frames hold a
//! diagonal gradient shifted by the frame number, masked to
//! `bits_per_pixel`, so tests can tell frames apart.

use std::time::Instant;

use mx_core::class::video_input::{
    Frame, VideoInputOps, VideoInputState, VideoParameter, VideoStatus, VINPUT_IS_BUSY,
};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    MxError, RecordClass, RecordDriver, Result,
};
use tracing::debug;

#[derive(Debug)]
pub struct SoftVideoInput {
    /// Seconds per frame.
    pub frame_time: f64,
    armed: bool,
    started: Option<Instant>,
    /// Frames taken by the current or last sequence.
    frames_taken: u64,
    /// Frames taken by sequences before the current one.
    earlier_frames: u64,
}

impl Default for SoftVideoInput {
    fn default() -> Self {
        Self {
            frame_time: 0.1,
            armed: false,
            started: None,
            frames_taken: 0,
            earlier_frames: 0,
        }
    }
}

mx_core::field_accessors!(SoftVideoInput { "frame_time" => frame_time });

/// Test pattern pixel.
pub fn pattern_pixel(x: usize, y: usize, frame: u64, bits_per_pixel: u32) -> u16 {
    let mask = if bits_per_pixel >= 16 {
        u16::MAX
    } else {
        (1u16 << bits_per_pixel) - 1
    };
    ((x as u64 + y as u64 + frame) & u64::from(mask)) as u16
}

impl SoftVideoInput {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "frame_time",
        FieldKind::Float,
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_vinput", RecordClass::VideoInput, Self::FIELDS, || {
            Box::<SoftVideoInput>::default()
        })
    }

    fn update(&mut self, now: Instant, num_frames: u64) {
        let Some(started) = self.started else {
            return;
        };
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let taken = if self.frame_time <= 0.0 {
            num_frames
        } else {
            ((elapsed / self.frame_time).floor() as u64).min(num_frames)
        };
        self.frames_taken = taken;
        if taken >= num_frames {
            self.started = None;
        }
    }
}

impl RecordDriver for SoftVideoInput {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        if !self.frame_time.is_finite() || self.frame_time < 0.0 {
            return Err(MxError::illegal_argument(
                "finish_record_initialization",
                format!("frame time {} is not a non-negative number of seconds", self.frame_time),
            ));
        }
        Ok(())
    }

    fn as_video_input(&mut self) -> Option<&mut dyn VideoInputOps> {
        Some(self)
    }
}

impl VideoInputOps for SoftVideoInput {
    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &VideoInputState) -> Result<()> {
        self.armed = true;
        Ok(())
    }

    fn trigger(&mut self, cx: &mut DriverContext<'_>, state: &VideoInputState) -> Result<()> {
        if !self.armed {
            return Err(MxError::not_ready("trigger", "camera must be armed before a trigger"));
        }
        self.armed = false;
        self.earlier_frames += self.frames_taken;
        self.frames_taken = 0;
        self.started = Some(cx.now());
        debug!("'{}' acquiring {} frames", cx.record_name(), state.num_frames);
        self.update(cx.now(), state.num_frames);
        Ok(())
    }

    fn stop(&mut self, cx: &mut DriverContext<'_>, state: &VideoInputState) -> Result<()> {
        self.update(cx.now(), state.num_frames);
        self.started = None;
        self.armed = false;
        Ok(())
    }

    fn get_status(&mut self, cx: &mut DriverContext<'_>, state: &VideoInputState) -> Result<VideoStatus> {
        self.update(cx.now(), state.num_frames);
        Ok(VideoStatus {
            last_frame_number: self.frames_taken.checked_sub(1),
            total_num_frames: self.earlier_frames + self.frames_taken,
            status: if self.started.is_some() { VINPUT_IS_BUSY } else { 0 },
        })
    }

    fn get_frame(&mut self, _cx: &mut DriverContext<'_>, state: &VideoInputState, frame: u64) -> Result<Frame> {
        let (width, height) = (state.framesize_x, state.framesize_y);
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| pattern_pixel(x, y, frame, state.bits_per_pixel)))
            .collect();
        Ok(Frame {
            width,
            height,
            pixels,
        })
    }

    fn set_parameter(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &VideoInputState,
        parameter: VideoParameter,
        value: f64,
    ) -> Result<()> {
        if parameter == VideoParameter::BitsPerPixel && !(1.0..=16.0).contains(&value) {
            return Err(MxError::illegal_argument(
                "set_parameter",
                format!("{} bits per pixel is not between 1 and 16", value),
            ));
        }
        Ok(())
    }
}
