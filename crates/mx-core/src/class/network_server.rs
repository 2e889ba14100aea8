//! Network server records: the local end of a connection to a peer process.
//!
//! Remote-proxy drivers reference a server record and reach the peer only
//! through the four field-access operations below.

use tracing::debug;

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::remote::{RemoteField, RemoteFieldClient};
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::NetworkServer;

/// Transport of a network server record.
pub trait NetworkServerOps {
    fn get(&mut self, _cx: &mut DriverContext<'_>, _field: &RemoteField, _kind: FieldKind) -> Result<FieldValue> {
        Err(MxError::unsupported(CLASS, "get"))
    }

    fn put(&mut self, _cx: &mut DriverContext<'_>, _field: &RemoteField, _value: &FieldValue) -> Result<()> {
        Err(MxError::unsupported(CLASS, "put"))
    }

    fn get_array(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _field: &RemoteField,
        _kind: FieldKind,
        _dims: &[usize],
    ) -> Result<FieldValue> {
        Err(MxError::unsupported(CLASS, "get_array"))
    }

    fn put_array(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _field: &RemoteField,
        _value: &FieldValue,
        _dims: &[usize],
    ) -> Result<()> {
        Err(MxError::unsupported(CLASS, "put_array"))
    }
}

/// Connection slot shared by server drivers that forward to a client.
#[derive(Default)]
pub struct ClientSlot {
    client: Option<Box<dyn RemoteFieldClient>>,
}

impl ClientSlot {
    pub fn attach(&mut self, client: Box<dyn RemoteFieldClient>) {
        self.client = Some(client);
    }

    pub fn detach(&mut self) -> Option<Box<dyn RemoteFieldClient>> {
        self.client.take()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// The client, or `NotReady` if nothing is attached.
    pub fn client(&mut self, record: &str, operation: &str) -> Result<&mut dyn RemoteFieldClient> {
        match self.client.as_deref_mut() {
            Some(client) => Ok(client),
            None => Err(MxError::not_ready(
                operation,
                format!("server record '{}' has no connection", record),
            )),
        }
    }
}

impl std::fmt::Debug for ClientSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.client {
            Some(client) => write!(f, "ClientSlot({})", client.describe()),
            None => write!(f, "ClientSlot(disconnected)"),
        }
    }
}

/// Forwards every slot to the attached client.
impl NetworkServerOps for ClientSlot {
    fn get(&mut self, cx: &mut DriverContext<'_>, field: &RemoteField, kind: FieldKind) -> Result<FieldValue> {
        self.client(cx.record_name(), "get")?.get(field, kind)
    }

    fn put(&mut self, cx: &mut DriverContext<'_>, field: &RemoteField, value: &FieldValue) -> Result<()> {
        self.client(cx.record_name(), "put")?.put(field, value)
    }

    fn get_array(
        &mut self,
        cx: &mut DriverContext<'_>,
        field: &RemoteField,
        kind: FieldKind,
        dims: &[usize],
    ) -> Result<FieldValue> {
        self.client(cx.record_name(), "get_array")?
            .get_array(field, kind, dims)
    }

    fn put_array(
        &mut self,
        cx: &mut DriverContext<'_>,
        field: &RemoteField,
        value: &FieldValue,
        dims: &[usize],
    ) -> Result<()> {
        self.client(cx.record_name(), "put_array")?
            .put_array(field, value, dims)
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn NetworkServerOps> {
    driver
        .as_network_server()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads a scalar field of a record on the peer.
pub fn get(db: &mut RecordDatabase, server: RecordId, field: &RemoteField, kind: FieldKind) -> Result<FieldValue> {
    const OP: &str = "get";
    db.dispatch(server, CLASS, OP, |cx, _, driver| {
        debug!("'{}' get {}", cx.record_name(), field);
        contract(driver, OP)?.get(cx, field, kind)
    })
}

/// Writes a scalar field of a record on the peer.
pub fn put(db: &mut RecordDatabase, server: RecordId, field: &RemoteField, value: FieldValue) -> Result<()> {
    const OP: &str = "put";
    db.dispatch(server, CLASS, OP, |cx, _, driver| {
        debug!("'{}' put {} = {:?}", cx.record_name(), field, value);
        contract(driver, OP)?.put(cx, field, &value)
    })
}

/// Reads an array field of a record on the peer, checked against `dims`.
pub fn get_array(
    db: &mut RecordDatabase,
    server: RecordId,
    field: &RemoteField,
    kind: FieldKind,
    dims: &[usize],
) -> Result<FieldValue> {
    const OP: &str = "get_array";
    db.dispatch(server, CLASS, OP, |cx, _, driver| {
        debug!("'{}' get_array {} {:?}", cx.record_name(), field, dims);
        contract(driver, OP)?.get_array(cx, field, kind, dims)
    })
}

/// Writes an array field of a record on the peer.
pub fn put_array(
    db: &mut RecordDatabase,
    server: RecordId,
    field: &RemoteField,
    value: FieldValue,
    dims: &[usize],
) -> Result<()> {
    const OP: &str = "put_array";
    db.dispatch(server, CLASS, OP, |cx, _, driver| {
        debug!("'{}' put_array {} {:?}", cx.record_name(), field, dims);
        contract(driver, OP)?.put_array(cx, field, &value, dims)
    })
}
