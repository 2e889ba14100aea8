//! Type registry: maps a configured type name to its driver.
//!
//! The registry is a plain value. The application builds one at start-up from
//! the driver table, then hands it by shared reference to whatever creates
//! records, so it is read-only for the rest of the process:
//!
//! ```text
//! driver table ──register()──▶ DriverRegistry ──&──▶ RecordDatabase::create_record
//!                                   │
//!                                   └─ lookup(type) -> Arc<DriverDescriptor>
//! ```
//!
//! Registration validates each descriptor table once: names are unique,
//! varargs lengths are declared integer fields, every field is served by the
//! block it claims to live in, and the driver exposes the operation contract
//! of the class it is registered under.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::class::ClassState;
use crate::error::{MxError, Result};
use crate::field::{validate_table, FieldBlock, FieldDescriptor, RECORD_FIELDS};
use crate::record::RecordDriver;
use crate::types::{RecordClass, Superclass};

type Constructor = dyn Fn() -> Box<dyn RecordDriver> + Send + Sync;

/// Everything needed to construct and introspect records of one concrete type.
pub struct DriverDescriptor {
    pub type_name: &'static str,
    pub class: RecordClass,
    pub fields: &'static [FieldDescriptor],
    constructor: Box<Constructor>,
}

impl DriverDescriptor {
    pub fn new<F>(
        type_name: &'static str,
        class: RecordClass,
        fields: &'static [FieldDescriptor],
        constructor: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn RecordDriver> + Send + Sync + 'static,
    {
        Self {
            type_name,
            class,
            fields,
            constructor: Box::new(constructor),
        }
    }

    pub fn superclass(&self) -> Superclass {
        self.class.superclass()
    }

    /// Allocates a fresh type block.
    pub fn construct(&self) -> Box<dyn RecordDriver> {
        (self.constructor)()
    }

    /// Record block, class block and type block descriptors, in that order.
    pub fn describe(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        RECORD_FIELDS
            .iter()
            .chain(ClassState::fields_for(self.class).iter())
            .chain(self.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.describe().find(|f| f.name == name)
    }
}

impl std::fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("type_name", &self.type_name)
            .field("class", &self.class)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// Registered driver types, keyed by type name.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, Arc<DriverDescriptor>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one driver type after validating its tables.
    pub fn register(&mut self, descriptor: DriverDescriptor) -> Result<()> {
        const OP: &str = "register";
        let type_name = descriptor.type_name;

        if type_name.is_empty() {
            return Err(MxError::illegal_argument(OP, "driver type name is empty"));
        }
        if self.drivers.contains_key(type_name) {
            return Err(MxError::illegal_argument(
                OP,
                format!("driver type '{}' is already registered", type_name),
            ));
        }
        if let Some(field) = descriptor.fields.iter().find(|f| f.block != FieldBlock::Type) {
            return Err(MxError::illegal_argument(
                OP,
                format!(
                    "field '{}' of driver type '{}' must live in the type block",
                    field.name, type_name
                ),
            ));
        }

        let mut prototype = descriptor.construct();
        let class_state = ClassState::for_class(descriptor.class);

        validate_table(type_name, descriptor.describe(), |field| match field.block {
            FieldBlock::Class => class_state
                .access()
                .is_some_and(|block| block.get_field(field.name).is_ok()),
            FieldBlock::Type => prototype.get_field(field.name).is_ok(),
            FieldBlock::Record => true,
        })?;

        if !exposes_class(prototype.as_mut(), descriptor.class) {
            return Err(MxError::corrupt_state(
                OP,
                format!(
                    "driver type '{}' does not provide the {} operation contract",
                    type_name, descriptor.class
                ),
            ));
        }

        debug!(
            "Registered driver type '{}' ({} / {})",
            type_name,
            descriptor.superclass(),
            descriptor.class
        );
        self.drivers.insert(type_name, Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a type name.
    pub fn lookup(&self, type_name: &str) -> Result<Arc<DriverDescriptor>> {
        self.drivers.get(type_name).cloned().ok_or_else(|| {
            MxError::not_found(
                "lookup",
                format!("no driver is registered for type '{}'", type_name),
            )
        })
    }

    /// Ordered field descriptors for a type name.
    pub fn describe(&self, type_name: &str) -> Result<Vec<&'static FieldDescriptor>> {
        Ok(self.lookup(type_name)?.describe().collect())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.drivers.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

fn exposes_class(driver: &mut dyn RecordDriver, class: RecordClass) -> bool {
    match class {
        RecordClass::Generic => true,
        RecordClass::Controller => driver.as_controller().is_some(),
        RecordClass::PortIo => driver.as_port_io().is_some(),
        RecordClass::Rs232 => driver.as_rs232().is_some(),
        RecordClass::NetworkServer => driver.as_network_server().is_some(),
        RecordClass::DigitalInput => driver.as_digital_input().is_some(),
        RecordClass::DigitalOutput => driver.as_digital_output().is_some(),
        RecordClass::AnalogOutput => driver.as_analog_output().is_some(),
        RecordClass::Relay => driver.as_relay().is_some(),
        RecordClass::Motor => driver.as_motor().is_some(),
        RecordClass::Amplifier => driver.as_amplifier().is_some(),
        RecordClass::Scaler => driver.as_scaler().is_some(),
        RecordClass::Timer => driver.as_timer().is_some(),
        RecordClass::PulseGenerator => driver.as_pulse_generator().is_some(),
        RecordClass::WaveformOutput => driver.as_waveform_output().is_some(),
        RecordClass::VideoInput => driver.as_video_input().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::digital_input::DigitalInputOps;
    use crate::error::ErrorKind;
    use crate::field::{FieldKind, FieldValue};

    struct Bare;
    crate::field_accessors!(Bare {});
    impl RecordDriver for Bare {}

    struct Din {
        bits: u32,
    }
    crate::field_accessors!(Din { "bits" => bits });
    impl DigitalInputOps for Din {}
    impl RecordDriver for Din {
        fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
            Some(self)
        }
    }

    static DIN_FIELDS: &[FieldDescriptor] =
        &[FieldDescriptor::new("bits", FieldKind::UInt, FieldBlock::Type)];

    static GHOST_FIELDS: &[FieldDescriptor] =
        &[FieldDescriptor::new("ghost", FieldKind::UInt, FieldBlock::Type)];

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DriverRegistry::new();
        registry
            .register(DriverDescriptor::new(
                "test_din",
                RecordClass::DigitalInput,
                DIN_FIELDS,
                || Box::new(Din { bits: 0 }),
            ))
            .unwrap();

        let desc = registry.lookup("test_din").unwrap();
        assert_eq!(desc.class, RecordClass::DigitalInput);
        assert_eq!(desc.superclass(), Superclass::Device);

        let names: Vec<&str> = registry
            .describe("test_din")
            .unwrap()
            .iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names.first(), Some(&"name"));
        assert!(names.contains(&"value"));
        assert_eq!(names.last(), Some(&"bits"));

        let mut driver = desc.construct();
        driver.set_field("bits", FieldValue::Int(8)).unwrap();
        assert_eq!(driver.get_field("bits").unwrap(), FieldValue::Int(8));
    }

    #[test]
    fn test_lookup_unknown_type() {
        let registry = DriverRegistry::new();
        let err = registry.lookup("nonexistent").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = DriverRegistry::new();
        let make = || DriverDescriptor::new("g", RecordClass::Generic, &[], || Box::new(Bare));
        registry.register(make()).unwrap();
        let err = registry.register(make()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn test_unserved_field_rejected() {
        let mut registry = DriverRegistry::new();
        let err = registry
            .register(DriverDescriptor::new(
                "ghost",
                RecordClass::DigitalInput,
                GHOST_FIELDS,
                || Box::new(Din { bits: 0 }),
            ))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
    }

    #[test]
    fn test_missing_class_contract_rejected() {
        let mut registry = DriverRegistry::new();
        let err = registry
            .register(DriverDescriptor::new("bare_motor", RecordClass::Motor, &[], || {
                Box::new(Bare)
            }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
        assert!(err.message.contains("motor"));
    }
}
