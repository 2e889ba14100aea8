//! The generic record envelope and the driver contract.
//!
//! A [`Record`] owns two private-state blocks: the class block
//! ([`ClassState`], shared shape for every driver of a class) and the type
//! block (the concrete [`RecordDriver`]). Both live in a [`RecordBody`] that
//! exists from construction until the record is dropped; a record without a
//! body is treated as corrupt by every accessor.
//!
//! # Safe downcast
//!
//! Drivers never cast raw pointers. The class block is recovered by matching
//! on the [`ClassState`] variant, the type block by [`Any`] downcast in
//! [`RecordBody::type_state`]. Both fail closed with `CorruptState`.

use std::any::Any;
use std::sync::Arc;

use crate::class::amplifier::AmplifierOps;
use crate::class::analog_output::AnalogOutputOps;
use crate::class::controller::ControllerOps;
use crate::class::digital_input::DigitalInputOps;
use crate::class::digital_output::DigitalOutputOps;
use crate::class::motor::MotorOps;
use crate::class::network_server::NetworkServerOps;
use crate::class::port_io::PortIoOps;
use crate::class::pulse_generator::PulseGeneratorOps;
use crate::class::relay::RelayOps;
use crate::class::rs232::Rs232Ops;
use crate::class::scaler::ScalerOps;
use crate::class::timer::TimerOps;
use crate::class::video_input::VideoInputOps;
use crate::class::waveform_output::WaveformOutputOps;
use crate::class::ClassState;
use crate::context::DriverContext;
use crate::error::{MxError, Result};
use crate::field::FieldAccess;
use crate::registry::DriverDescriptor;
use crate::scheduler::Tick;
use crate::types::{LifecycleState, RecordClass, RecordId, Superclass};

// =============================================================================
// References
// =============================================================================

/// A non-owning reference to another record.
///
/// Holds the configured name from construction; linking stores the arena
/// index. The name is kept for diagnostics after resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordRef {
    name: String,
    id: Option<RecordId>,
}

impl RecordRef {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    pub fn resolved(&self) -> Option<RecordId> {
        self.id
    }

    pub(crate) fn resolve(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    /// The resolved id, or `CorruptState` if linking never resolved it.
    pub fn id(&self, operation: &str) -> Result<RecordId> {
        self.id.ok_or_else(|| {
            MxError::corrupt_state(
                operation,
                format!("reference to record '{}' was never resolved", self.name),
            )
        })
    }
}

// =============================================================================
// Driver contract
// =============================================================================

/// Upcast helper so type blocks can be recovered with [`Any`].
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Generic lifecycle operations plus access to the class operation contract.
///
/// Every lifecycle hook defaults to a successful no-op. Every `as_*` accessor
/// defaults to `None`; a driver returns `Some(self)` for exactly the class it
/// is registered under. Inside a class contract, every operation slot has a
/// default that either returns `Unsupported` or runs the class-wide default
/// handler, so a driver implements only the slots its hardware has.
pub trait RecordDriver: AsAny + FieldAccess + Send {
    /// Checks references and normalizes configured values.
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        Ok(())
    }

    /// One-time hardware or protocol setup.
    fn open(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        Ok(())
    }

    /// Releases driver-held resources. Claims and timers are released by the database.
    fn close(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        Ok(())
    }

    /// Best-effort recovery after a fault.
    fn resynchronize(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        Ok(())
    }

    /// Timer callback delivered by the scheduler.
    fn on_tick(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
        _tick: Tick,
    ) -> Result<()> {
        Ok(())
    }

    fn as_controller(&mut self) -> Option<&mut dyn ControllerOps> {
        None
    }
    fn as_port_io(&mut self) -> Option<&mut dyn PortIoOps> {
        None
    }
    fn as_rs232(&mut self) -> Option<&mut dyn Rs232Ops> {
        None
    }
    fn as_network_server(&mut self) -> Option<&mut dyn NetworkServerOps> {
        None
    }
    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        None
    }
    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        None
    }
    fn as_analog_output(&mut self) -> Option<&mut dyn AnalogOutputOps> {
        None
    }
    fn as_relay(&mut self) -> Option<&mut dyn RelayOps> {
        None
    }
    fn as_motor(&mut self) -> Option<&mut dyn MotorOps> {
        None
    }
    fn as_amplifier(&mut self) -> Option<&mut dyn AmplifierOps> {
        None
    }
    fn as_scaler(&mut self) -> Option<&mut dyn ScalerOps> {
        None
    }
    fn as_timer(&mut self) -> Option<&mut dyn TimerOps> {
        None
    }
    fn as_pulse_generator(&mut self) -> Option<&mut dyn PulseGeneratorOps> {
        None
    }
    fn as_waveform_output(&mut self) -> Option<&mut dyn WaveformOutputOps> {
        None
    }
    fn as_video_input(&mut self) -> Option<&mut dyn VideoInputOps> {
        None
    }
}

// =============================================================================
// Record
// =============================================================================

/// The two private-state blocks of a constructed record.
pub struct RecordBody {
    pub class_state: ClassState,
    pub driver: Box<dyn RecordDriver>,
}

impl RecordBody {
    /// Downcasts the type block to the driver's concrete shape.
    pub fn type_state<T: RecordDriver>(&self, record: &str, operation: &str) -> Result<&T> {
        (*self.driver)
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| wrong_type_state::<T>(record, operation))
    }

    pub fn type_state_mut<T: RecordDriver>(&mut self, record: &str, operation: &str) -> Result<&mut T> {
        (*self.driver)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| wrong_type_state::<T>(record, operation))
    }
}

fn wrong_type_state<T>(record: &str, operation: &str) -> MxError {
    MxError::corrupt_state(
        operation,
        format!(
            "type state of record '{}' is not a {}",
            record,
            std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("driver")
        ),
    )
}

/// One configured hardware or logical object.
pub struct Record {
    pub(crate) name: String,
    pub(crate) descriptor: Arc<DriverDescriptor>,
    pub(crate) state: LifecycleState,
    pub(crate) body: Option<RecordBody>,
}

impl Record {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Superclass {
        self.descriptor.superclass()
    }

    pub fn class(&self) -> RecordClass {
        self.descriptor.class
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.type_name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn descriptor(&self) -> &Arc<DriverDescriptor> {
        &self.descriptor
    }

    /// The private state, or `CorruptState` if construction never completed
    /// or an operation currently holds it.
    pub fn body(&self, operation: &str) -> Result<&RecordBody> {
        self.body.as_ref().ok_or_else(|| missing_body(&self.name, operation))
    }

    pub fn body_mut(&mut self, operation: &str) -> Result<&mut RecordBody> {
        let name = &self.name;
        self.body.as_mut().ok_or_else(|| missing_body(name, operation))
    }
}

pub(crate) fn missing_body(record: &str, operation: &str) -> MxError {
    MxError::corrupt_state(
        operation,
        format!(
            "private state of record '{}' is not available (construction incomplete or operation in progress)",
            record
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_unresolved_reference_is_corrupt() {
        let r = RecordRef::unresolved("ctrl");
        let err = r.id("read").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
        assert!(err.message.contains("ctrl"));
    }

    #[test]
    fn test_resolved_reference() {
        let mut r = RecordRef::unresolved("ctrl");
        r.resolve(RecordId(2));
        assert_eq!(r.id("read").unwrap(), RecordId(2));
        assert_eq!(r.name(), "ctrl");
    }
}
