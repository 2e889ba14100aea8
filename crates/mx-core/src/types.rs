//! Record classification and identity.
//!
//! Records are classified on three levels: a [`Superclass`] (interface,
//! device or server), a [`RecordClass`] that fixes the shape of the class
//! operation contract, and a concrete type name owned by the driver table.
//! The first two are closed enums; the type name is an open `&'static str`
//! looked up in the [`DriverRegistry`](crate::registry::DriverRegistry).

use serde::{Deserialize, Serialize};

/// Stable index of a record inside its [`RecordDatabase`](crate::database::RecordDatabase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub(crate) usize);

impl RecordId {
    /// Position of the record in creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Top-level kind of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Superclass {
    /// A bus, controller or communication port other records depend on.
    Interface,
    /// An instrument.
    Device,
    /// A connection to a remote peer that owns records of its own.
    Server,
}

impl std::fmt::Display for Superclass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Superclass::Interface => "interface",
            Superclass::Device => "device",
            Superclass::Server => "server",
        };
        write!(f, "{}", label)
    }
}

/// Behavioral category of a record; determines its class operation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordClass {
    // Interfaces
    Generic,
    Controller,
    PortIo,
    Rs232,
    // Servers
    NetworkServer,
    // Devices
    DigitalInput,
    DigitalOutput,
    AnalogOutput,
    Relay,
    Motor,
    Amplifier,
    Scaler,
    Timer,
    PulseGenerator,
    WaveformOutput,
    VideoInput,
}

impl RecordClass {
    /// Every class, in declaration order.
    pub const ALL: [RecordClass; 16] = [
        RecordClass::Generic,
        RecordClass::Controller,
        RecordClass::PortIo,
        RecordClass::Rs232,
        RecordClass::NetworkServer,
        RecordClass::DigitalInput,
        RecordClass::DigitalOutput,
        RecordClass::AnalogOutput,
        RecordClass::Relay,
        RecordClass::Motor,
        RecordClass::Amplifier,
        RecordClass::Scaler,
        RecordClass::Timer,
        RecordClass::PulseGenerator,
        RecordClass::WaveformOutput,
        RecordClass::VideoInput,
    ];

    /// The superclass every record of this class belongs to.
    pub fn superclass(self) -> Superclass {
        match self {
            RecordClass::Generic
            | RecordClass::Controller
            | RecordClass::PortIo
            | RecordClass::Rs232 => Superclass::Interface,
            RecordClass::NetworkServer => Superclass::Server,
            _ => Superclass::Device,
        }
    }

    /// Lower-case label used in messages and configuration.
    pub fn name(self) -> &'static str {
        match self {
            RecordClass::Generic => "generic",
            RecordClass::Controller => "controller",
            RecordClass::PortIo => "port_io",
            RecordClass::Rs232 => "rs232",
            RecordClass::NetworkServer => "network_server",
            RecordClass::DigitalInput => "digital_input",
            RecordClass::DigitalOutput => "digital_output",
            RecordClass::AnalogOutput => "analog_output",
            RecordClass::Relay => "relay",
            RecordClass::Motor => "motor",
            RecordClass::Amplifier => "amplifier",
            RecordClass::Scaler => "scaler",
            RecordClass::Timer => "timer",
            RecordClass::PulseGenerator => "pulse_generator",
            RecordClass::WaveformOutput => "waveform_output",
            RecordClass::VideoInput => "video_input",
        }
    }

    /// Parses a class label produced by [`RecordClass::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|class| class.name() == name)
    }
}

impl std::fmt::Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle of a record.
///
/// ```text
/// Constructed -> Linked -> Validated -> Opened -> Closed
///      \            \          \           \
///       +------------+----------+-----------+--> Failed
/// ```
///
/// `Unconstructed` only exists while a record's private state is being built
/// and is never observable from outside the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unconstructed,
    Constructed,
    Linked,
    Validated,
    Opened,
    Closed,
    Failed,
}

impl LifecycleState {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Unconstructed => "unconstructed",
            LifecycleState::Constructed => "constructed",
            LifecycleState::Linked => "linked",
            LifecycleState::Validated => "validated",
            LifecycleState::Opened => "opened",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_superclass() {
        assert_eq!(RecordClass::Controller.superclass(), Superclass::Interface);
        assert_eq!(RecordClass::NetworkServer.superclass(), Superclass::Server);
        assert_eq!(RecordClass::Motor.superclass(), Superclass::Device);
    }

    #[test]
    fn test_class_name_round_trip() {
        for class in RecordClass::ALL {
            assert_eq!(RecordClass::from_name(class.name()), Some(class));
        }
        assert_eq!(RecordClass::from_name("toaster"), None);
    }
}
