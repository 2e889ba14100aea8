//! Network server records: connections to peer record databases.
//!
//! - `json_line_server` connects over TCP at open and speaks the JSON-line
//!   field protocol.
//! - `loopback_server` talks to a [`FieldServer`] in the same process, or
//!   to any client the application attaches. Used by tests and by setups
//!   that split one process into several databases.

use std::sync::Arc;
use std::time::Duration;

use mx_core::class::network_server::{ClientSlot, NetworkServerOps};
use mx_core::limits::DEFAULT_TRANSPORT_TIMEOUT;
use mx_core::remote::{FieldServer, JsonLineClient, LoopbackTransport, RemoteFieldClient};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, Result, TcpTransport,
};
use parking_lot::Mutex;
use tracing::{debug, info};

// =============================================================================
// json_line_server
// =============================================================================

#[derive(Debug)]
pub struct JsonLineServer {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    slot: ClientSlot,
}

impl Default for JsonLineServer {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            timeout_ms: DEFAULT_TRANSPORT_TIMEOUT.as_millis() as u64,
            slot: ClientSlot::default(),
        }
    }
}

mx_core::field_accessors!(JsonLineServer {
    "host" => host,
    "port" => port,
    "timeout_ms" => timeout_ms,
});

impl JsonLineServer {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("host", FieldKind::Str, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("port", FieldKind::UInt, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("timeout_ms", FieldKind::UInt, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "json_line_server",
            RecordClass::NetworkServer,
            Self::FIELDS,
            || Box::<JsonLineServer>::default(),
        )
    }
}

impl RecordDriver for JsonLineServer {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        if self.host.trim().is_empty() || self.port == 0 {
            return Err(MxError::illegal_argument(
                "finish_record_initialization",
                format!("'{}:{}' is not a usable server address", self.host, self.port),
            ));
        }
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        let timeout = Duration::from_millis(self.timeout_ms);
        let transport = TcpTransport::connect(&self.host, self.port, timeout)
            .map_err(|e| e.in_record(cx.record_name()))?;
        let client = JsonLineClient::new(transport).with_timeout(timeout);
        info!("'{}' connected to {}", cx.record_name(), client.describe());
        self.slot.attach(Box::new(client));
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

    fn as_network_server(&mut self) -> Option<&mut dyn NetworkServerOps> {
        Some(&mut self.slot)
    }
}

// =============================================================================
// loopback_server
// =============================================================================

#[derive(Debug, Default)]
pub struct LoopbackServer {
    slot: ClientSlot,
}

mx_core::field_accessors!(LoopbackServer {});

impl LoopbackServer {
    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("loopback_server", RecordClass::NetworkServer, &[], || {
            Box::<LoopbackServer>::default()
        })
    }

    /// Installs an arbitrary client; must happen before the record is opened.
    pub fn attach_client(&mut self, client: Box<dyn RemoteFieldClient>) {
        self.slot.attach(client);
    }

    /// Connects to a field server in this process through the JSON-line
    /// encoding.
    pub fn attach_field_server(&mut self, server: Arc<Mutex<FieldServer>>) {
        self.slot
            .attach(Box::new(JsonLineClient::new(LoopbackTransport::new(server))));
    }
}

impl RecordDriver for LoopbackServer {
    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        if !self.slot.is_connected() {
            return Err(MxError::not_ready(
                "open",
                format!("no peer was attached to '{}'", cx.record_name()),
            ));
        }
        Ok(())
    }

    fn as_network_server(&mut self) -> Option<&mut dyn NetworkServerOps> {
        Some(&mut self.slot)
    }
}
