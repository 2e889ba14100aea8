//! Simulated I/O-port space.
//!
//! Holds a sparse map of 8-bit ports. Every port reads back the last value
//! written to it, or zero. Used to exercise port-I/O chip drivers without
//! hardware.

use std::collections::BTreeMap;

use mx_core::class::port_io::PortIoOps;
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    MxError, RecordClass, RecordDriver, Result,
};
use tracing::trace;

#[derive(Debug)]
pub struct SoftPortIo {
    /// Number of addressable ports; addresses at or above it are rejected.
    pub num_ports: u64,
    ports: BTreeMap<u64, u8>,
}

impl Default for SoftPortIo {
    fn default() -> Self {
        Self {
            num_ports: 0x10000,
            ports: BTreeMap::new(),
        }
    }
}

mx_core::field_accessors!(SoftPortIo { "num_ports" => num_ports });

impl SoftPortIo {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "num_ports",
        FieldKind::Hex,
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_portio", RecordClass::PortIo, Self::FIELDS, || {
            Box::<SoftPortIo>::default()
        })
    }

    /// Current contents of one port, for inspection.
    pub fn port(&self, port: u64) -> u8 {
        self.ports.get(&port).copied().unwrap_or(0)
    }

    fn check(&self, port: u64, operation: &str) -> Result<()> {
        if port >= self.num_ports {
            return Err(MxError::illegal_argument(
                operation,
                format!("port {:#x} is outside the {:#x}-port space", port, self.num_ports),
            ));
        }
        Ok(())
    }
}

impl RecordDriver for SoftPortIo {
    fn as_port_io(&mut self) -> Option<&mut dyn PortIoOps> {
        Some(self)
    }
}

impl PortIoOps for SoftPortIo {
    fn inp8(&mut self, _cx: &mut DriverContext<'_>, port: u64) -> Result<u8> {
        self.check(port, "inp8")?;
        let value = self.port(port);
        trace!("inp8 {:#x} -> {:#04x}", port, value);
        Ok(value)
    }

    fn outp8(&mut self, _cx: &mut DriverContext<'_>, port: u64, value: u8) -> Result<()> {
        self.check(port, "outp8")?;
        trace!("outp8 {:#x} <- {:#04x}", port, value);
        self.ports.insert(port, value);
        Ok(())
    }
}
