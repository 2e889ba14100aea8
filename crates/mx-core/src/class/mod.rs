//! Per-class operation contracts and class-private state.
//!
//! Each submodule defines, for one device class:
//!
//! - the class state block shared by every driver of that class, with its
//!   static field table;
//! - an `*Ops` trait with one method per operation slot, each defaulting to
//!   `Unsupported` or to the class-wide default handler;
//! - free functions that generic callers use to dispatch an operation on a
//!   record by id.
//!
//! The class block of a record is a [`ClassState`] variant. Drivers recover it
//! by pattern matching through the typed accessors below, which fail closed
//! with `CorruptState` if the record holds a different class.

use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldAccess, FieldDescriptor, FieldType, FieldValue};
use crate::types::{RecordClass, RecordId};

pub mod amplifier;
pub mod analog_output;
pub mod controller;
pub mod digital_input;
pub mod digital_output;
pub mod motor;
pub mod network_server;
pub mod port_io;
pub mod pulse_generator;
pub mod relay;
pub mod rs232;
pub mod scaler;
pub mod timer;
pub mod video_input;
pub mod waveform_output;

use amplifier::AmplifierState;
use analog_output::AnalogOutputState;
use controller::ControllerState;
use digital_input::DigitalInputState;
use digital_output::DigitalOutputState;
use motor::MotorState;
use pulse_generator::PulseGeneratorState;
use relay::RelayState;
use rs232::Rs232State;
use scaler::ScalerState;
use timer::TimerState;
use video_input::VideoInputState;
use waveform_output::WaveformOutputState;

macro_rules! class_states {
    ($( $variant:ident($state:ty) => $class:ident, $get:ident, $get_mut:ident; )*) => {
        /// The class-private state block of a record.
        #[derive(Debug, Clone)]
        pub enum ClassState {
            /// Classes without a shared state block.
            None,
            $( $variant($state), )*
        }

        impl ClassState {
            /// A default-initialized block for `class`.
            pub fn for_class(class: RecordClass) -> ClassState {
                match class {
                    $( RecordClass::$class => ClassState::$variant(<$state>::default()), )*
                    _ => ClassState::None,
                }
            }

            /// Field table of the class block of `class`.
            pub fn fields_for(class: RecordClass) -> &'static [FieldDescriptor] {
                match class {
                    $( RecordClass::$class => <$state>::FIELDS, )*
                    _ => &[],
                }
            }

            pub fn access(&self) -> Option<&dyn FieldAccess> {
                match self {
                    $( ClassState::$variant(state) => Some(state), )*
                    ClassState::None => None,
                }
            }

            pub fn access_mut(&mut self) -> Option<&mut dyn FieldAccess> {
                match self {
                    $( ClassState::$variant(state) => Some(state), )*
                    ClassState::None => None,
                }
            }

            fn label(&self) -> &'static str {
                match self {
                    $( ClassState::$variant(_) => RecordClass::$class.name(), )*
                    ClassState::None => "none",
                }
            }

            $(
                pub fn $get(&self, operation: &str) -> Result<&$state> {
                    match self {
                        ClassState::$variant(state) => Ok(state),
                        other => Err(wrong_class(RecordClass::$class, other.label(), operation)),
                    }
                }

                pub fn $get_mut(&mut self, operation: &str) -> Result<&mut $state> {
                    match self {
                        ClassState::$variant(state) => Ok(state),
                        other => Err(wrong_class(RecordClass::$class, other.label(), operation)),
                    }
                }
            )*
        }
    };
}

class_states! {
    Controller(ControllerState) => Controller, controller, controller_mut;
    Rs232(Rs232State) => Rs232, rs232, rs232_mut;
    DigitalInput(DigitalInputState) => DigitalInput, digital_input, digital_input_mut;
    DigitalOutput(DigitalOutputState) => DigitalOutput, digital_output, digital_output_mut;
    AnalogOutput(AnalogOutputState) => AnalogOutput, analog_output, analog_output_mut;
    Relay(RelayState) => Relay, relay, relay_mut;
    Motor(MotorState) => Motor, motor, motor_mut;
    Amplifier(AmplifierState) => Amplifier, amplifier, amplifier_mut;
    Scaler(ScalerState) => Scaler, scaler, scaler_mut;
    Timer(TimerState) => Timer, timer, timer_mut;
    PulseGenerator(PulseGeneratorState) => PulseGenerator, pulse_generator, pulse_generator_mut;
    WaveformOutput(WaveformOutputState) => WaveformOutput, waveform_output, waveform_output_mut;
    VideoInput(VideoInputState) => VideoInput, video_input, video_input_mut;
}

fn wrong_class(expected: RecordClass, actual: &str, operation: &str) -> MxError {
    MxError::corrupt_state(
        operation,
        format!(
            "class state is {} but the operation needs {} state",
            actual, expected
        ),
    )
}

/// Error for a driver registered under a class whose contract it lacks.
pub(crate) fn missing_contract(class: RecordClass, operation: &str) -> MxError {
    MxError::corrupt_state(
        operation,
        format!("driver does not provide the {} operation contract", class),
    )
}

/// Runs `f` on the class state and rolls the state back if it fails.
///
/// Drivers may write requested or rounded values into the class block while
/// an operation runs; callers only ever observe them after success.
pub(crate) fn transact<S: Clone, T>(state: &mut S, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
    let saved = state.clone();
    let result = f(state);
    if result.is_err() {
        *state = saved;
    }
    result
}

// =============================================================================
// Field-service process hooks
// =============================================================================

/// Runs the class operation that refreshes a field before it is read.
///
/// Used by the remote field service so that a `get` of, say, `busy` returns
/// the device's current state rather than the cached one.
pub fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match db.record(id)?.class() {
        RecordClass::DigitalInput => digital_input::process_get(db, id, field),
        RecordClass::DigitalOutput => digital_output::process_get(db, id, field),
        RecordClass::AnalogOutput => analog_output::process_get(db, id, field),
        RecordClass::Relay => relay::process_get(db, id, field),
        RecordClass::Motor => motor::process_get(db, id, field),
        RecordClass::Amplifier => amplifier::process_get(db, id, field),
        RecordClass::PulseGenerator => pulse_generator::process_get(db, id, field),
        RecordClass::WaveformOutput => waveform_output::process_get(db, id, field),
        _ => Ok(()),
    }
}

/// Runs the class operation a field write stands for.
///
/// Returns `false` when the field has no operation attached, in which case
/// the caller stores the value as a plain field write.
pub fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match db.record(id)?.class() {
        RecordClass::DigitalOutput => digital_output::process_put(db, id, field, value),
        RecordClass::AnalogOutput => analog_output::process_put(db, id, field, value),
        RecordClass::Relay => relay::process_put(db, id, field, value),
        RecordClass::Motor => motor::process_put(db, id, field, value),
        RecordClass::Amplifier => amplifier::process_put(db, id, field, value),
        RecordClass::PulseGenerator => pulse_generator::process_put(db, id, field, value),
        RecordClass::WaveformOutput => waveform_output::process_put(db, id, field, value),
        _ => Ok(false),
    }
}

/// Converts a field-service value to an operation argument.
pub(crate) fn argument<T: FieldType>(value: &FieldValue, field: &str) -> Result<T> {
    T::from_value(value.clone(), field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_for_class_matches_accessors() {
        let mut state = ClassState::for_class(RecordClass::Motor);
        assert!(state.motor_mut("test").is_ok());
        let err = state.digital_input("test").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
        assert!(err.message.contains("motor"));
    }

    #[test]
    fn test_stateless_classes() {
        for class in [RecordClass::Generic, RecordClass::PortIo, RecordClass::NetworkServer] {
            let state = ClassState::for_class(class);
            assert!(state.access().is_none());
            assert!(ClassState::fields_for(class).is_empty());
        }
    }

    #[test]
    fn test_every_class_table_is_served() {
        for class in RecordClass::ALL {
            let state = ClassState::for_class(class);
            for field in ClassState::fields_for(class) {
                let served = state
                    .access()
                    .is_some_and(|block| block.get_field(field.name).is_ok());
                assert!(served, "{} field '{}' is not served", class, field.name);
            }
        }
    }

    #[test]
    fn test_transact_rolls_back() {
        let mut value = 1;
        let result: Result<()> = transact(&mut value, |v| {
            *v = 5;
            Err(MxError::device_io("t", "boom"))
        });
        assert!(result.is_err());
        assert_eq!(value, 1);
        transact(&mut value, |v| {
            *v = 7;
            Ok(())
        })
        .unwrap();
        assert_eq!(value, 7);
    }
}
