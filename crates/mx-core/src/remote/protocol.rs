//! Newline-delimited JSON encoding of remote field access.
//!
//! One request object per line, one response object per line:
//!
//! ```text
//! -> {"op":"put","field":"wv.channel_index","value":{"type":"int","value":2}}
//! <- {"status":"ok"}
//! -> {"op":"get","field":"wv.busy"}
//! <- {"status":"ok","value":{"type":"bool","value":false}}
//! <- {"status":"error","error":{"kind":"not_found","operation":"find","message":"..."}}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_dims, coerce, RemoteField, RemoteFieldClient};
use crate::error::{MxError, Result};
use crate::field::{FieldKind, FieldValue};
use crate::limits::DEFAULT_TRANSPORT_TIMEOUT;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Get {
        field: String,
    },
    Put {
        field: String,
        value: FieldValue,
    },
    GetArray {
        field: String,
        dims: Vec<usize>,
    },
    PutArray {
        field: String,
        value: FieldValue,
        dims: Vec<usize>,
    },
}

impl Request {
    pub fn field(&self) -> &str {
        match self {
            Request::Get { field }
            | Request::Put { field, .. }
            | Request::GetArray { field, .. }
            | Request::PutArray { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<FieldValue>,
    },
    Error {
        error: MxError,
    },
}

impl Response {
    pub fn from_result(result: Result<Option<FieldValue>>) -> Self {
        match result {
            Ok(value) => Response::Ok { value },
            Err(error) => Response::Error { error },
        }
    }
}

/// Encodes one message as a JSON line, including the newline.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message).map_err(|e| {
        MxError::illegal_argument("encode", format!("cannot encode message: {}", e))
    })?;
    line.push(b'\n');
    Ok(line)
}

/// [`RemoteFieldClient`] speaking the JSON-line encoding over a transport.
pub struct JsonLineClient<T: Transport> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> JsonLineClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn call(&mut self, request: &Request) -> Result<Option<FieldValue>> {
        debug!("{} -> {:?}", self.transport.describe(), request);
        self.transport.write_all(&encode_line(request)?)?;
        let line = self.transport.read_until(b"\n", self.timeout)?;
        let response: Response = serde_json::from_slice(&line).map_err(|e| {
            MxError::device_io(
                "remote_call",
                format!(
                    "malformed reply from {} to '{}': {}",
                    self.transport.describe(),
                    request.field(),
                    e
                ),
            )
        })?;
        match response {
            Response::Ok { value } => Ok(value),
            Response::Error { error } => Err(error),
        }
    }

    fn call_for_value(&mut self, request: &Request) -> Result<FieldValue> {
        self.call(request)?.ok_or_else(|| {
            MxError::device_io(
                "remote_get",
                format!("reply for '{}' carried no value", request.field()),
            )
        })
    }
}

impl<T: Transport> RemoteFieldClient for JsonLineClient<T> {
    fn get(&mut self, field: &RemoteField, kind: FieldKind) -> Result<FieldValue> {
        let value = self.call_for_value(&Request::Get {
            field: field.to_string(),
        })?;
        coerce(value, kind, 0, field)
    }

    fn put(&mut self, field: &RemoteField, value: &FieldValue) -> Result<()> {
        self.call(&Request::Put {
            field: field.to_string(),
            value: value.clone(),
        })?;
        Ok(())
    }

    fn get_array(&mut self, field: &RemoteField, kind: FieldKind, dims: &[usize]) -> Result<FieldValue> {
        let value = self.call_for_value(&Request::GetArray {
            field: field.to_string(),
            dims: dims.to_vec(),
        })?;
        coerce(value, kind, dims.len(), field)
    }

    fn put_array(&mut self, field: &RemoteField, value: &FieldValue, dims: &[usize]) -> Result<()> {
        check_dims(value, dims, field)?;
        self.call(&Request::PutArray {
            field: field.to_string(),
            value: value.clone(),
            dims: dims.to_vec(),
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json-line {}", self.transport.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::MockTransport;

    #[test]
    fn test_request_encoding() {
        let line = encode_line(&Request::Put {
            field: "wv.channel_index".into(),
            value: FieldValue::Int(2),
        })
        .unwrap();
        let text = String::from_utf8(line).unwrap();
        assert_eq!(
            text,
            "{\"op\":\"put\",\"field\":\"wv.channel_index\",\"value\":{\"type\":\"int\",\"value\":2}}\n"
        );
    }

    #[test]
    fn test_client_get_decodes_reply() {
        let handle = MockTransport::new();
        handle.push_reply("{\"status\":\"ok\",\"value\":{\"type\":\"bool\",\"value\":true}}\n");
        let mut client = JsonLineClient::new(handle.clone());
        let value = client
            .get(&RemoteField::new("wv", "busy"), FieldKind::Bool)
            .unwrap();
        assert_eq!(value, FieldValue::Bool(true));

        let sent = handle.written_lines(b"\n");
        let request: Request = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(request, Request::Get { field: "wv.busy".into() });
    }

    #[test]
    fn test_client_surfaces_remote_error() {
        let handle = MockTransport::new();
        let error = MxError::not_found("find", "no record named 'wv'");
        let reply = encode_line(&Response::Error { error }).unwrap();
        handle.push_reply(reply);
        let mut client = JsonLineClient::new(handle);
        let err = client
            .put(&RemoteField::new("wv", "arm"), &FieldValue::Bool(true))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_client_rejects_garbage() {
        let handle = MockTransport::new();
        handle.push_reply("not json\n");
        let mut client = JsonLineClient::new(handle);
        let err = client
            .get(&RemoteField::new("wv", "busy"), FieldKind::Bool)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceIo);
    }

    #[test]
    fn test_client_times_out_without_reply() {
        let mut client =
            JsonLineClient::new(MockTransport::new()).with_timeout(Duration::from_millis(5));
        let err = client
            .get(&RemoteField::new("wv", "busy"), FieldKind::Bool)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TimedOut);
    }
}
