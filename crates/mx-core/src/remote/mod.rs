//! Remote field access.
//!
//! A remote-proxy driver keeps no hardware handle; it forwards each class
//! operation as named field reads and writes addressed to a record owned by
//! a peer process. The client side is the [`RemoteFieldClient`] contract,
//! which is all a proxy driver ever sees (through its network server record).
//! The byte encoding is pluggable:
//!
//! ```text
//! network_wvout ──▶ NETWORK_SERVER record ──▶ dyn RemoteFieldClient
//!                                               ├─ RecordingClient   (tests)
//!                                               └─ JsonLineClient<T: Transport>
//!                                                     ├─ TcpTransport
//!                                                     └─ LoopbackTransport ──▶ FieldServer
//! ```
//!
//! [`FieldServer`] is the serving side: it answers requests against a local
//! [`RecordDatabase`](crate::database::RecordDatabase) using the field engine
//! plus the class process hooks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{MxError, Result};
use crate::field::{FieldKind, FieldValue};

pub mod loopback;
pub mod protocol;
pub mod server;

pub use loopback::LoopbackTransport;
pub use protocol::{JsonLineClient, Request, Response};
pub use server::FieldServer;

/// Address of a field on a remote record: `record.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteField {
    pub record: String,
    pub field: String,
}

impl RemoteField {
    pub fn new(record: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            field: field.into(),
        }
    }

    /// Parses `record.field`.
    pub fn parse(address: &str) -> Result<Self> {
        match address.split_once('.') {
            Some((record, field)) if !record.is_empty() && !field.is_empty() => {
                Ok(Self::new(record, field))
            }
            _ => Err(MxError::illegal_argument(
                "parse_remote_field",
                format!("'{}' is not of the form record.field", address),
            )),
        }
    }
}

impl std::fmt::Display for RemoteField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

/// Client half of remote field access.
pub trait RemoteFieldClient: Send {
    fn get(&mut self, field: &RemoteField, kind: FieldKind) -> Result<FieldValue>;

    fn put(&mut self, field: &RemoteField, value: &FieldValue) -> Result<()>;

    fn get_array(&mut self, field: &RemoteField, kind: FieldKind, dims: &[usize]) -> Result<FieldValue>;

    fn put_array(&mut self, field: &RemoteField, value: &FieldValue, dims: &[usize]) -> Result<()>;

    /// Peer description for log messages.
    fn describe(&self) -> String;
}

/// Converts a reply to the kind and rank the caller asked for.
pub fn coerce(value: FieldValue, kind: FieldKind, rank: usize, field: &RemoteField) -> Result<FieldValue> {
    let value = match (value, kind, rank) {
        (FieldValue::Int(v), FieldKind::Float, 0) => FieldValue::Float(v as f64),
        (FieldValue::Int(v), FieldKind::Bool, 0) => FieldValue::Bool(v != 0),
        (FieldValue::UInt(v), FieldKind::Float, 0) => FieldValue::Float(v as f64),
        (FieldValue::UInt(v), FieldKind::Bool, 0) => FieldValue::Bool(v != 0),
        (FieldValue::IntArray(v), FieldKind::Float, 1) => {
            FieldValue::FloatArray(v.into_iter().map(|x| x as f64).collect())
        }
        (FieldValue::Float(v), k, 0) if k.is_integer() && v.fract() == 0.0 => FieldValue::Int(v as i64),
        (other, _, _) => other,
    };
    if value.fits(&kind, rank) {
        Ok(value)
    } else {
        Err(MxError::type_mismatch(
            "remote_get",
            format!(
                "remote field '{}' returned {}, expected rank {} {}",
                field,
                value.label(),
                rank,
                kind.label()
            ),
        ))
    }
}

/// Rank of an array value, checked against the dimension vector of a call.
pub fn check_dims(value: &FieldValue, dims: &[usize], field: &RemoteField) -> Result<()> {
    let fits = match (value, dims) {
        (FieldValue::IntArray(v), [n]) => v.len() <= *n,
        (FieldValue::FloatArray(v), [n]) => v.len() <= *n,
        (FieldValue::FloatMatrix(rows), [r, c]) => rows.len() <= *r && rows.iter().all(|row| row.len() <= *c),
        _ => false,
    };
    if fits {
        Ok(())
    } else {
        Err(MxError::illegal_argument(
            "remote_put_array",
            format!(
                "{} does not fit dimensions {:?} of remote field '{}'",
                value.label(),
                dims,
                field
            ),
        ))
    }
}

// =============================================================================
// Recording client
// =============================================================================

/// One call observed by a [`RecordingClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Get { field: String },
    Put { field: String, value: FieldValue },
    GetArray { field: String, dims: Vec<usize> },
    PutArray { field: String, value: FieldValue, dims: Vec<usize> },
}

impl RemoteCall {
    pub fn field(&self) -> &str {
        match self {
            RemoteCall::Get { field }
            | RemoteCall::Put { field, .. }
            | RemoteCall::GetArray { field, .. }
            | RemoteCall::PutArray { field, .. } => field,
        }
    }
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<RemoteCall>,
    values: HashMap<String, FieldValue>,
    failures: HashMap<String, MxError>,
}

/// In-memory peer that records every call.
///
/// Puts store the value under the field address and gets return it, so the
/// client behaves like a peer with plain fields and no process hooks.
/// Clones share one recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets the value a get of `address` returns.
    pub fn set(&self, address: &str, value: FieldValue) {
        self.inner.lock().values.insert(address.to_string(), value);
    }

    pub fn value(&self, address: &str) -> Option<FieldValue> {
        self.inner.lock().values.get(address).cloned()
    }

    /// Makes every call on `address` fail with `error`.
    pub fn fail(&self, address: &str, error: MxError) {
        self.inner.lock().failures.insert(address.to_string(), error);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    fn record(&self, call: RemoteCall) -> Result<()> {
        let mut inner = self.inner.lock();
        let failure = inner.failures.get(call.field()).cloned();
        inner.calls.push(call);
        failure.map_or(Ok(()), Err)
    }

    fn lookup(&self, field: &RemoteField) -> Result<FieldValue> {
        let address = field.to_string();
        self.inner.lock().values.get(&address).cloned().ok_or_else(|| {
            MxError::not_found("remote_get", format!("remote field '{}' has no value", address))
        })
    }
}

impl RemoteFieldClient for RecordingClient {
    fn get(&mut self, field: &RemoteField, kind: FieldKind) -> Result<FieldValue> {
        self.record(RemoteCall::Get {
            field: field.to_string(),
        })?;
        coerce(self.lookup(field)?, kind, 0, field)
    }

    fn put(&mut self, field: &RemoteField, value: &FieldValue) -> Result<()> {
        self.record(RemoteCall::Put {
            field: field.to_string(),
            value: value.clone(),
        })?;
        self.set(&field.to_string(), value.clone());
        Ok(())
    }

    fn get_array(&mut self, field: &RemoteField, kind: FieldKind, dims: &[usize]) -> Result<FieldValue> {
        self.record(RemoteCall::GetArray {
            field: field.to_string(),
            dims: dims.to_vec(),
        })?;
        let value = crate::field::view_array(self.lookup(field)?, dims);
        coerce(value, kind, dims.len(), field)
    }

    fn put_array(&mut self, field: &RemoteField, value: &FieldValue, dims: &[usize]) -> Result<()> {
        check_dims(value, dims, field)?;
        self.record(RemoteCall::PutArray {
            field: field.to_string(),
            value: value.clone(),
            dims: dims.to_vec(),
        })?;
        self.set(&field.to_string(), value.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "recording client".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_remote_field() {
        let f = RemoteField::parse("wvout1.channel_data").unwrap();
        assert_eq!(f.record, "wvout1");
        assert_eq!(f.field, "channel_data");
        assert_eq!(f.to_string(), "wvout1.channel_data");
        assert!(RemoteField::parse("nodot").is_err());
        assert!(RemoteField::parse(".field").is_err());
    }

    #[test]
    fn test_coerce_numbers() {
        let f = RemoteField::new("r", "x");
        assert_eq!(
            coerce(FieldValue::Int(3), FieldKind::Float, 0, &f).unwrap(),
            FieldValue::Float(3.0)
        );
        let err = coerce(FieldValue::Str("no".into()), FieldKind::Float, 0, &f).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_recording_client_put_then_get() {
        let handle = RecordingClient::new();
        let mut client = handle.clone();
        let f = RemoteField::new("wv", "frequency");
        client.put(&f, &FieldValue::Float(10.0)).unwrap();
        assert_eq!(client.get(&f, FieldKind::Float).unwrap(), FieldValue::Float(10.0));
        assert_eq!(handle.calls().len(), 2);
    }

    #[test]
    fn test_recording_client_failure_is_recorded() {
        let handle = RecordingClient::new();
        let mut client = handle.clone();
        handle.fail("wv.arm", MxError::device_io("put", "link down"));
        let err = client
            .put(&RemoteField::new("wv", "arm"), &FieldValue::Bool(true))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceIo);
        assert_eq!(handle.calls().len(), 1);
    }

    #[test]
    fn test_put_array_checks_dims() {
        let mut client = RecordingClient::new();
        let f = RemoteField::new("wv", "channel_data");
        let err = client
            .put_array(&f, &FieldValue::FloatArray(vec![0.0; 5]), &[4])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }
}
