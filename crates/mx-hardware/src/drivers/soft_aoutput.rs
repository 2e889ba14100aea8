//! Simulated analog output. Accepts any raw value between `minimum_raw` and
//! `maximum_raw`.

use mx_core::class::analog_output::{AnalogOutputOps, AnalogOutputState};
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    MxError, RecordClass, RecordDriver, Result,
};

#[derive(Debug)]
pub struct SoftAnalogOutput {
    pub minimum_raw: f64,
    pub maximum_raw: f64,
}

impl Default for SoftAnalogOutput {
    fn default() -> Self {
        Self {
            minimum_raw: f64::MIN,
            maximum_raw: f64::MAX,
        }
    }
}

mx_core::field_accessors!(SoftAnalogOutput {
    "minimum_raw" => minimum_raw,
    "maximum_raw" => maximum_raw,
});

impl SoftAnalogOutput {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("minimum_raw", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("maximum_raw", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "soft_aoutput",
            RecordClass::AnalogOutput,
            Self::FIELDS,
            || Box::<SoftAnalogOutput>::default(),
        )
    }
}

impl RecordDriver for SoftAnalogOutput {
    fn as_analog_output(&mut self) -> Option<&mut dyn AnalogOutputOps> {
        Some(self)
    }
}

impl AnalogOutputOps for SoftAnalogOutput {
    fn write(&mut self, _cx: &mut DriverContext<'_>, _state: &AnalogOutputState, raw: f64) -> Result<()> {
        if !(self.minimum_raw..=self.maximum_raw).contains(&raw) {
            return Err(MxError::out_of_range(
                "write",
                format!(
                    "raw value {} is outside {} to {}",
                    raw, self.minimum_raw, self.maximum_raw
                ),
            ));
        }
        Ok(())
    }
}
