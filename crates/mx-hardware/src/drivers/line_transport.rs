//! RS-232 records backed by a [`Transport`].
//!
//! - `tcp232`: a serial line reached through a TCP terminal server.
//! - `transport_rs232`: whatever transport the application attaches before
//!   the database is opened, typically a
//!   [`MockTransport`](mx_core::MockTransport) in tests.

use std::fmt;
use std::time::Duration;

use mx_core::class::rs232::{Rs232Ops, Rs232State};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, Result, TcpTransport, Transport,
};
use tracing::{debug, info};

/// Holds the transport of a line record and forwards the byte primitives.
#[derive(Default)]
pub struct TransportSlot {
    transport: Option<Box<dyn Transport>>,
}

impl TransportSlot {
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub fn detach(&mut self) -> Option<Box<dyn Transport>> {
        self.transport.take()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&mut self, record: &str, operation: &str) -> Result<&mut dyn Transport> {
        match self.transport.as_deref_mut() {
            Some(transport) => Ok(transport),
            None => Err(MxError::not_ready(
                operation,
                format!("line '{}' has no transport", record),
            )),
        }
    }
}

impl fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transport {
            Some(transport) => write!(f, "TransportSlot({})", transport.describe()),
            None => write!(f, "TransportSlot(disconnected)"),
        }
    }
}

impl Rs232Ops for TransportSlot {
    fn write(&mut self, cx: &mut DriverContext<'_>, _state: &Rs232State, bytes: &[u8]) -> Result<()> {
        self.transport(cx.record_name(), "write")?
            .write_all(bytes)
            .map_err(|e| e.in_record(cx.record_name()))
    }

    fn read_until(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &Rs232State,
        terminator: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.transport(cx.record_name(), "read_until")?
            .read_until(terminator, timeout)
            .map_err(|e| e.in_record(cx.record_name()))
    }

    fn discard_unread_input(&mut self, cx: &mut DriverContext<'_>, _state: &Rs232State) -> Result<()> {
        self.transport(cx.record_name(), "discard_unread_input")?
            .discard_unread_input()
    }

    fn discard_unwritten_output(&mut self, cx: &mut DriverContext<'_>, _state: &Rs232State) -> Result<()> {
        self.transport(cx.record_name(), "discard_unwritten_output")?
            .discard_unwritten_output()
    }
}

// =============================================================================
// tcp232
// =============================================================================

#[derive(Debug, Default)]
pub struct Tcp232 {
    pub host: String,
    pub port: u16,
    slot: TransportSlot,
}

mx_core::field_accessors!(Tcp232 {
    "host" => host,
    "port" => port,
});

impl Tcp232 {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("host", FieldKind::Str, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("port", FieldKind::UInt, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("tcp232", RecordClass::Rs232, Self::FIELDS, || {
            Box::<Tcp232>::default()
        })
    }
}

impl RecordDriver for Tcp232 {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        if self.host.trim().is_empty() || self.port == 0 {
            return Err(MxError::illegal_argument(
                "finish_record_initialization",
                format!("'{}:{}' is not a usable terminal server address", self.host, self.port),
            ));
        }
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, class: &mut ClassState) -> Result<()> {
        let timeout = class.rs232("open")?.timeout();
        let transport = TcpTransport::connect(&self.host, self.port, timeout)
            .map_err(|e| e.in_record(cx.record_name()))?;
        info!("'{}' connected to {}", cx.record_name(), transport.describe());
        self.slot.attach(Box::new(transport));
        Ok(())
    }

    fn close(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        if self.slot.detach().is_some() {
            debug!("'{}' disconnected", cx.record_name());
        }
        Ok(())
    }

    fn resynchronize(&mut self, cx: &mut DriverContext<'_>, class: &mut ClassState) -> Result<()> {
        self.close(cx, class)?;
        self.open(cx, class)
    }

    fn as_rs232(&mut self) -> Option<&mut dyn Rs232Ops> {
        Some(&mut self.slot)
    }
}

// =============================================================================
// transport_rs232
// =============================================================================

/// Line over an application-supplied transport.
#[derive(Debug, Default)]
pub struct TransportRs232 {
    slot: TransportSlot,
}

mx_core::field_accessors!(TransportRs232 {});

impl TransportRs232 {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("transport_rs232", RecordClass::Rs232, &[], || {
            Box::<TransportRs232>::default()
        })
    }

    /// Installs the transport; must happen before the record is opened.
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.slot.attach(transport);
    }
}

impl RecordDriver for TransportRs232 {
    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        if !self.slot.is_connected() {
            return Err(MxError::not_ready(
                "open",
                format!("no transport was attached to '{}'", cx.record_name()),
            ));
        }
        Ok(())
    }

    fn resynchronize(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        self.slot
            .transport(cx.record_name(), "resynchronize")?
            .discard_unread_input()
    }

    fn as_rs232(&mut self) -> Option<&mut dyn Rs232Ops> {
        Some(&mut self.slot)
    }
}
