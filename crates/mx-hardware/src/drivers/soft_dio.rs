//! Simulated digital input and output bits with no hardware behind them.

use mx_core::class::digital_input::{DigitalInputOps, DigitalInputState};
use mx_core::class::digital_output::{DigitalOutputOps, DigitalOutputState};
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    RecordClass, RecordDriver, Result,
};

/// Digital input whose value is whatever `simulated_value` holds.
#[derive(Debug, Default)]
pub struct SoftDigitalInput {
    pub simulated_value: u64,
}

mx_core::field_accessors!(SoftDigitalInput { "simulated_value" => simulated_value });

impl SoftDigitalInput {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "simulated_value",
        FieldKind::Hex,
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "soft_dinput",
            RecordClass::DigitalInput,
            Self::FIELDS,
            || Box::<SoftDigitalInput>::default(),
        )
    }
}

impl RecordDriver for SoftDigitalInput {
    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        Some(self)
    }
}

impl DigitalInputOps for SoftDigitalInput {
    fn read(&mut self, _cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        Ok(self.simulated_value)
    }
}

/// Digital output that accepts every write; reads return the last value.
#[derive(Debug, Default)]
pub struct SoftDigitalOutput {
    /// Number of writes since open.
    pub write_count: u64,
}

mx_core::field_accessors!(SoftDigitalOutput { "write_count" => write_count });

impl SoftDigitalOutput {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "write_count",
        FieldKind::UInt,
        FieldBlock::Type,
    )
    .flags(FieldFlags::READ_ONLY)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "soft_doutput",
            RecordClass::DigitalOutput,
            Self::FIELDS,
            || Box::<SoftDigitalOutput>::default(),
        )
    }
}

impl RecordDriver for SoftDigitalOutput {
    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        Some(self)
    }
}

impl DigitalOutputOps for SoftDigitalOutput {
    fn write(&mut self, _cx: &mut DriverContext<'_>, _state: &DigitalOutputState, _value: u64) -> Result<()> {
        self.write_count += 1;
        Ok(())
    }
}
