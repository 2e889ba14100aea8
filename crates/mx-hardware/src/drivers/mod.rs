//! Record drivers shipped with the hardware crate.
//!
//! Every driver exposes a `descriptor()` constructor; [`register_all`] adds
//! them to a [`DriverRegistry`] under their type names.

pub mod dio_controller;
pub mod doutput_pulser;
pub mod gated_backlash;
pub mod line_transport;
pub mod mc6821;
pub mod network_servers;
pub mod network_wvout;
#[cfg(feature = "serial")]
pub mod serial_rs232;
pub mod soft_amplifier;
pub mod soft_aoutput;
pub mod soft_dio;
pub mod soft_motor;
pub mod soft_portio;
pub mod soft_relay;
pub mod soft_scaler;
pub mod soft_timer;
pub mod soft_vinput;
pub mod soft_wvout;
pub mod sr570;

use mx_core::{DriverDescriptor, DriverRegistry, Result};
use tracing::debug;

pub use dio_controller::{ControllerInput, ControllerOutput, SoftDioController};
pub use doutput_pulser::DigitalOutputPulser;
pub use gated_backlash::GatedBacklash;
pub use line_transport::{Tcp232, TransportRs232, TransportSlot};
pub use mc6821::{Mc6821, Mc6821Input, Mc6821Output};
pub use network_servers::{JsonLineServer, LoopbackServer};
pub use network_wvout::NetworkWaveformOutput;
#[cfg(feature = "serial")]
pub use serial_rs232::SerialRs232;
pub use soft_amplifier::SoftAmplifier;
pub use soft_aoutput::SoftAnalogOutput;
pub use soft_dio::{SoftDigitalInput, SoftDigitalOutput};
pub use soft_motor::SoftMotor;
pub use soft_portio::SoftPortIo;
pub use soft_relay::SoftRelay;
pub use soft_scaler::SoftScaler;
pub use soft_timer::SoftTimer;
pub use soft_vinput::SoftVideoInput;
pub use soft_wvout::SoftWaveformOutput;
pub use sr570::Sr570;

/// Descriptors of every driver compiled into this build.
pub fn all_descriptors() -> Vec<DriverDescriptor> {
    let mut descriptors = vec![
        SoftDioController::descriptor(),
        ControllerInput::descriptor(),
        ControllerOutput::descriptor(),
        SoftDigitalInput::descriptor(),
        SoftDigitalOutput::descriptor(),
        SoftPortIo::descriptor(),
        Mc6821::descriptor(),
        Mc6821Input::descriptor(),
        Mc6821Output::descriptor(),
        SoftAnalogOutput::descriptor(),
        SoftRelay::descriptor(),
        SoftMotor::descriptor(),
        GatedBacklash::descriptor(),
        SoftAmplifier::descriptor(),
        Sr570::descriptor(),
        SoftScaler::descriptor(),
        SoftTimer::descriptor(),
        DigitalOutputPulser::descriptor(),
        SoftWaveformOutput::descriptor(),
        NetworkWaveformOutput::descriptor(),
        SoftVideoInput::descriptor(),
        Tcp232::descriptor(),
        TransportRs232::descriptor(),
        JsonLineServer::descriptor(),
        LoopbackServer::descriptor(),
    ];
    #[cfg(feature = "serial")]
    descriptors.push(SerialRs232::descriptor());
    descriptors
}

/// Registers every driver in this crate.
///
/// Fails on the first type name that is already registered.
pub fn register_all(registry: &mut DriverRegistry) -> Result<()> {
    let descriptors = all_descriptors();
    let count = descriptors.len();
    for descriptor in descriptors {
        registry.register(descriptor)?;
    }
    debug!("Registered {} hardware drivers", count);
    Ok(())
}
