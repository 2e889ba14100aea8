//! Simulated amplifier that applies every gain, offset and time constant
//! exactly as requested.

use mx_core::class::amplifier::{AmplifierOps, AmplifierState};
use mx_core::{DriverContext, DriverDescriptor, RecordClass, RecordDriver, Result};

#[derive(Debug, Default)]
pub struct SoftAmplifier;

mx_core::field_accessors!(SoftAmplifier {});

impl SoftAmplifier {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_amplifier", RecordClass::Amplifier, &[], || {
            Box::<SoftAmplifier>::default()
        })
    }
}

impl RecordDriver for SoftAmplifier {
    fn as_amplifier(&mut self) -> Option<&mut dyn AmplifierOps> {
        Some(self)
    }
}

impl AmplifierOps for SoftAmplifier {
    fn set_gain(&mut self, _cx: &mut DriverContext<'_>, _state: &mut AmplifierState, _gain: f64) -> Result<()> {
        Ok(())
    }

    fn set_offset(&mut self, _cx: &mut DriverContext<'_>, _state: &mut AmplifierState, _offset: f64) -> Result<()> {
        Ok(())
    }

    fn set_time_constant(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &mut AmplifierState,
        _time_constant: f64,
    ) -> Result<()> {
        Ok(())
    }
}
