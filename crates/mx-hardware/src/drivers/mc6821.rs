//! Motorola MC6821 peripheral interface adapter on a port-I/O bus.
//!
//! Register layout (offsets from the base address):
//!
//! | Offset | Register                                        |
//! |--------|-------------------------------------------------|
//! | 0      | Port A data, or data direction when CRA bit 2=0 |
//! | 1      | Control register A                              |
//! | 2      | Port B data, or data direction when CRB bit 2=0 |
//! | 3      | Control register B                              |
//!
//! The `mc6821` record is the chip; it claims its four ports on the
//! port-I/O record when opened. `mc6821_in` and `mc6821_out` are 8-bit
//! digital I/O records on port A or B of a chip. On open each sets the
//! port's data direction (all inputs or all outputs) and leaves the data
//! register selected.
//!
//! # Example
//!
//! ```toml
//! [[record]]
//! name = "pio"
//! type = "soft_portio"
//!
//! [[record]]
//! name = "pia"
//! type = "mc6821"
//! fields = { portio = "pio", base_address = 0x300 }
//!
//! [[record]]
//! name = "pia_a"
//! type = "mc6821_out"
//! fields = { interface = "pia", port = "A" }
//! ```

use mx_core::class::digital_input::{DigitalInputOps, DigitalInputState};
use mx_core::class::digital_output::{DigitalOutputOps, DigitalOutputState};
use mx_core::class::port_io;
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, RecordId, RecordRef, RefRequirement, Resource,
    Result, Superclass,
};
use tracing::debug;

/// Ports the chip occupies.
pub const MC6821_NUM_PORTS: u64 = 4;

const PORT_A_DATA: u64 = 0;
const PORT_A_CONTROL: u64 = 1;
const PORT_B_DATA: u64 = 2;
const PORT_B_CONTROL: u64 = 3;

/// Control register bit selecting the data register instead of the
/// data-direction register.
const CR_DATA_SELECT: u8 = 0x04;

// =============================================================================
// mc6821 (interface)
// =============================================================================

#[derive(Debug, Default)]
pub struct Mc6821 {
    pub portio: RecordRef,
    pub base_address: u64,
}

mx_core::field_accessors!(Mc6821 {
    "portio" => portio,
    "base_address" => base_address,
});

impl Mc6821 {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new(
            "portio",
            FieldKind::Record(RefRequirement::class(
                Superclass::Interface,
                &[RecordClass::PortIo],
            )),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("base_address", FieldKind::Hex, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("mc6821", RecordClass::Generic, Self::FIELDS, || {
            Box::<Mc6821>::default()
        })
    }
}

impl RecordDriver for Mc6821 {
    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        let portio = self.portio.id("open")?;
        cx.claim(Resource::PortRange {
            portio,
            base: self.base_address,
            len: MC6821_NUM_PORTS,
        })?;
        debug!(
            "'{}' claimed ports {:#x}..{:#x} of '{}'",
            cx.record_name(),
            self.base_address,
            self.base_address + MC6821_NUM_PORTS,
            self.portio.name()
        );
        Ok(())
    }
}

// =============================================================================
// Port records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Port {
    #[default]
    A,
    B,
}

impl Port {
    fn parse(name: &str, operation: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Port::A),
            "B" => Ok(Port::B),
            _ => Err(MxError::illegal_argument(
                operation,
                format!("MC6821 port '{}' is neither A nor B", name),
            )),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Port::A => "A",
            Port::B => "B",
        }
    }

    fn data_offset(self) -> u64 {
        match self {
            Port::A => PORT_A_DATA,
            Port::B => PORT_B_DATA,
        }
    }

    fn control_offset(self) -> u64 {
        match self {
            Port::A => PORT_A_CONTROL,
            Port::B => PORT_B_CONTROL,
        }
    }
}

const PORT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new(
        "interface",
        FieldKind::Record(
            RefRequirement::class(Superclass::Interface, &[RecordClass::Generic]).with_type("mc6821"),
        ),
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION),
    FieldDescriptor::new("port", FieldKind::Str, FieldBlock::Type)
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
];

/// Port-I/O record and base address of the chip a port record uses.
fn chip(cx: &DriverContext<'_>, interface: &RecordRef, operation: &str) -> Result<(RecordId, u64)> {
    let id = interface.id(operation)?;
    let (portio, base) = cx.type_state::<Mc6821, _>(id, operation, |chip| {
        (chip.portio.clone(), chip.base_address)
    })?;
    Ok((portio.id(operation)?, base))
}

/// Selects the data-direction register, writes it, then selects data again.
fn set_direction(cx: &mut DriverContext<'_>, interface: &RecordRef, port: Port, direction: u8) -> Result<()> {
    const OP: &str = "open";
    let (portio, base) = chip(cx, interface, OP)?;
    let control = base + port.control_offset();
    let data = base + port.data_offset();

    let cr = port_io::inp8(cx.db(), portio, control)?;
    port_io::outp8(cx.db(), portio, control, cr & !CR_DATA_SELECT)?;
    port_io::outp8(cx.db(), portio, data, direction)?;
    port_io::outp8(cx.db(), portio, control, cr | CR_DATA_SELECT)
}

fn read_port(cx: &mut DriverContext<'_>, interface: &RecordRef, port: Port, operation: &str) -> Result<u64> {
    let (portio, base) = chip(cx, interface, operation)?;
    port_io::inp8(cx.db(), portio, base + port.data_offset()).map(u64::from)
}

/// 8-bit digital input on one MC6821 port.
#[derive(Debug, Default)]
pub struct Mc6821Input {
    pub interface: RecordRef,
    pub port: String,
    selected: Port,
}

mx_core::field_accessors!(Mc6821Input {
    "interface" => interface,
    "port" => port,
});

impl Mc6821Input {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("mc6821_in", RecordClass::DigitalInput, PORT_FIELDS, || {
            Box::<Mc6821Input>::default()
        })
    }
}

impl RecordDriver for Mc6821Input {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        self.selected = Port::parse(&self.port, "finish_record_initialization")?;
        self.port = self.selected.name().to_string();
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        set_direction(cx, &self.interface, self.selected, 0x00)
    }

    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        Some(self)
    }
}

impl DigitalInputOps for Mc6821Input {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        read_port(cx, &self.interface, self.selected, "read")
    }
}

/// 8-bit digital output on one MC6821 port. Values are masked to 8 bits.
#[derive(Debug, Default)]
pub struct Mc6821Output {
    pub interface: RecordRef,
    pub port: String,
    selected: Port,
}

mx_core::field_accessors!(Mc6821Output {
    "interface" => interface,
    "port" => port,
});

impl Mc6821Output {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("mc6821_out", RecordClass::DigitalOutput, PORT_FIELDS, || {
            Box::<Mc6821Output>::default()
        })
    }
}

impl RecordDriver for Mc6821Output {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        self.selected = Port::parse(&self.port, "finish_record_initialization")?;
        self.port = self.selected.name().to_string();
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        set_direction(cx, &self.interface, self.selected, 0xff)
    }

    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        Some(self)
    }
}

impl DigitalOutputOps for Mc6821Output {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalOutputState) -> Result<u64> {
        read_port(cx, &self.interface, self.selected, "read")
    }

    fn write(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalOutputState, value: u64) -> Result<()> {
        let (portio, base) = chip(cx, &self.interface, "write")?;
        port_io::outp8(cx.db(), portio, base + self.selected.data_offset(), (value & 0xff) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_parsing_and_offsets() {
        assert_eq!(Port::parse("b", "test").unwrap(), Port::B);
        assert_eq!(Port::A.data_offset(), 0);
        assert_eq!(Port::B.data_offset(), 2);
        assert_eq!(Port::B.control_offset(), 3);
        assert!(Port::parse("C", "test").is_err());
    }
}
