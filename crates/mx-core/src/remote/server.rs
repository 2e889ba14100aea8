//! Serving side of remote field access.

use std::io::{BufRead, Read, Write};

use tracing::{debug, info, warn};

use super::protocol::{encode_line, Request, Response};
use super::RemoteField;
use crate::class::{process_get, process_put};
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{view_array, FieldValue};
use crate::limits::MAX_LINE_LENGTH;

/// Answers remote field requests against a local database.
///
/// A `get` first runs the class hook that refreshes the field. A `put` of a
/// field tied to a class operation runs that operation instead of a plain
/// store.
#[derive(Debug)]
pub struct FieldServer {
    db: RecordDatabase,
}

impl FieldServer {
    pub fn new(db: RecordDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &RecordDatabase {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut RecordDatabase {
        &mut self.db
    }

    pub fn into_database(self) -> RecordDatabase {
        self.db
    }

    pub fn handle(&mut self, request: Request) -> Response {
        let address = request.field().to_string();
        let result = self.execute(request);
        if let Err(err) = &result {
            debug!("Request for '{}' failed: {}", address, err);
        }
        Response::from_result(result)
    }

    fn execute(&mut self, request: Request) -> Result<Option<FieldValue>> {
        match request {
            Request::Get { field } => self.get(&field).map(Some),
            Request::Put { field, value } => self.put(&field, value).map(|_| None),
            Request::GetArray { field, dims } => {
                let value = self.get(&field)?;
                Ok(Some(view_array(value, &dims)))
            }
            Request::PutArray { field, value, dims } => {
                super::check_dims(&value, &dims, &RemoteField::parse(&field)?)?;
                self.put(&field, value).map(|_| None)
            }
        }
    }

    fn get(&mut self, address: &str) -> Result<FieldValue> {
        let target = RemoteField::parse(address)?;
        let id = self.db.find(&target.record)?;
        process_get(&mut self.db, id, &target.field)?;
        self.db.read_field(id, &target.field)
    }

    fn put(&mut self, address: &str, value: FieldValue) -> Result<()> {
        let target = RemoteField::parse(address)?;
        let id = self.db.find(&target.record)?;
        if process_put(&mut self.db, id, &target.field, &value)? {
            return Ok(());
        }
        self.db.write_field(id, &target.field, value)
    }

    /// Handles one encoded request line and returns the encoded response.
    pub fn handle_line(&mut self, line: &[u8]) -> Vec<u8> {
        let response = match serde_json::from_slice::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => Response::Error {
                error: MxError::illegal_argument("decode", format!("malformed request: {}", e)),
            },
        };
        encode_line(&response).unwrap_or_else(|err| {
            warn!("Cannot encode response: {}", err);
            b"{\"status\":\"error\",\"error\":{\"kind\":\"corrupt_state\",\"operation\":\"encode\",\"message\":\"unencodable response\"}}\n".to_vec()
        })
    }

    /// Serves requests from one connection until the peer closes it.
    ///
    /// Returns the number of requests handled.
    pub fn serve<R: BufRead, W: Write>(&mut self, mut reader: R, mut writer: W) -> Result<usize> {
        let mut handled = 0;
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader
                .by_ref()
                .take(MAX_LINE_LENGTH as u64 + 1)
                .read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if line.last() != Some(&b'\n') && n > MAX_LINE_LENGTH {
                return Err(MxError::device_io(
                    "serve",
                    format!("request longer than {} bytes", MAX_LINE_LENGTH),
                ));
            }
            let request = line.strip_suffix(b"\n").unwrap_or(&line);
            writer.write_all(&self.handle_line(request))?;
            writer.flush()?;
            handled += 1;
        }
        info!("Field service connection closed after {} requests", handled);
        Ok(handled)
    }
}
