//! Software digital I/O controller and the port devices that use it.
//!
//! `soft_dio_controller` stands in for a three-port parallel I/O chip: it has
//! registers A, B and C and remembers the last value written to each.
//! `controller_input` and `controller_output` are digital I/O records bound
//! to one port of any controller record.
//!
//! # Example
//!
//! ```toml
//! [[record]]
//! name = "ctrl"
//! type = "soft_dio_controller"
//!
//! [[record]]
//! name = "shutter_bit"
//! type = "controller_output"
//! fields = { controller = "ctrl", port = "a" }
//! ```

use mx_core::class::controller::{self, ControllerOps, ControllerState};
use mx_core::class::digital_input::{DigitalInputOps, DigitalInputState};
use mx_core::class::digital_output::{DigitalOutputOps, DigitalOutputState};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, RecordRef, RefRequirement, Result, Superclass,
};
use tracing::debug;

/// Registers on a software controller: ports A, B and C.
pub const SOFT_DIO_NUM_REGISTERS: usize = 3;

const PORT_NAMES: [&str; SOFT_DIO_NUM_REGISTERS] = ["A", "B", "C"];

/// Canonical name and register index of a configured port.
fn parse_port(port: &str, operation: &str) -> Result<(String, usize)> {
    let canonical = port.trim().to_ascii_uppercase();
    PORT_NAMES
        .iter()
        .position(|p| *p == canonical)
        .map(|index| (canonical, index))
        .ok_or_else(|| {
            MxError::illegal_argument(
                operation,
                format!("port '{}' is not one of A, B or C", port),
            )
        })
}

// =============================================================================
// soft_dio_controller
// =============================================================================

#[derive(Debug, Default)]
pub struct SoftDioController;

mx_core::field_accessors!(SoftDioController {});

impl SoftDioController {
    pub const FIELDS: &'static [FieldDescriptor] = &[];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "soft_dio_controller",
            RecordClass::Controller,
            Self::FIELDS,
            || Box::new(SoftDioController),
        )
    }
}

impl RecordDriver for SoftDioController {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        class: &mut ClassState,
    ) -> Result<()> {
        let state = class.controller_mut("finish_record_initialization")?;
        state.num_registers = SOFT_DIO_NUM_REGISTERS;
        state.registers.resize(SOFT_DIO_NUM_REGISTERS, 0);
        Ok(())
    }

    fn as_controller(&mut self) -> Option<&mut dyn ControllerOps> {
        Some(self)
    }
}

/// Reads return the cached register; writes only update the cache.
impl ControllerOps for SoftDioController {
    fn write_register(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &ControllerState,
        index: usize,
        value: u64,
    ) -> Result<()> {
        let port = PORT_NAMES.get(index).copied().unwrap_or("?");
        debug!("'{}' port {} <- {:#x}", cx.record_name(), port, value);
        Ok(())
    }
}

// =============================================================================
// controller_input / controller_output
// =============================================================================

const CONTROLLER_PORT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new(
        "controller",
        FieldKind::Record(RefRequirement::class(
            Superclass::Interface,
            &[RecordClass::Controller],
        )),
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION),
    FieldDescriptor::new("port", FieldKind::Str, FieldBlock::Type)
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
];

/// Shared validation of a port record: the port must name a register the
/// controller actually has.
fn finish_port(
    cx: &mut DriverContext<'_>,
    controller: &RecordRef,
    port: &mut String,
    register: &mut usize,
) -> Result<()> {
    const OP: &str = "finish_record_initialization";
    let (canonical, index) = parse_port(port, OP)?;
    let id = controller.id(OP)?;
    let available = controller::num_registers(cx.database(), id)?;
    // A controller that has not sized its bank yet is checked again at use.
    if available != 0 && index >= available {
        return Err(MxError::illegal_argument(
            OP,
            format!(
                "port {} needs register {}, controller '{}' has {}",
                canonical,
                index,
                controller.name(),
                available
            ),
        ));
    }
    *port = canonical;
    *register = index;
    Ok(())
}

/// Digital input reading one controller port.
#[derive(Debug, Default)]
pub struct ControllerInput {
    pub controller: RecordRef,
    pub port: String,
    register: usize,
}

mx_core::field_accessors!(ControllerInput {
    "controller" => controller,
    "port" => port,
});

impl ControllerInput {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "controller_input",
            RecordClass::DigitalInput,
            CONTROLLER_PORT_FIELDS,
            || Box::<ControllerInput>::default(),
        )
    }
}

impl RecordDriver for ControllerInput {
    fn finish_record_initialization(
        &mut self,
        cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        finish_port(cx, &self.controller, &mut self.port, &mut self.register)
    }

    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        Some(self)
    }
}

impl DigitalInputOps for ControllerInput {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        let controller = self.controller.id("read")?;
        controller::read_register(cx.db(), controller, self.register)
    }
}

/// Digital output driving one controller port.
#[derive(Debug, Default)]
pub struct ControllerOutput {
    pub controller: RecordRef,
    pub port: String,
    register: usize,
}

mx_core::field_accessors!(ControllerOutput {
    "controller" => controller,
    "port" => port,
});

impl ControllerOutput {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "controller_output",
            RecordClass::DigitalOutput,
            CONTROLLER_PORT_FIELDS,
            || Box::<ControllerOutput>::default(),
        )
    }
}

impl RecordDriver for ControllerOutput {
    fn finish_record_initialization(
        &mut self,
        cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        finish_port(cx, &self.controller, &mut self.port, &mut self.register)
    }

    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        Some(self)
    }
}

impl DigitalOutputOps for ControllerOutput {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalOutputState) -> Result<u64> {
        let controller = self.controller.id("read")?;
        controller::read_register(cx.db(), controller, self.register)
    }

    fn write(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalOutputState, value: u64) -> Result<()> {
        let controller = self.controller.id("write")?;
        controller::write_register(cx.db(), controller, self.register, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::ErrorKind;

    #[test]
    fn test_parse_port_is_case_insensitive() {
        assert_eq!(parse_port(" b ", "test").unwrap(), ("B".to_string(), 1));
        assert_eq!(parse_port("C", "test").unwrap(), ("C".to_string(), 2));
    }

    #[test]
    fn test_parse_port_rejects_unknown() {
        let err = parse_port("D", "test").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert!(err.message.contains("'D'"));
    }
}
