//! In-process transport to a [`FieldServer`].
//!
//! Lets a client database talk to a serving database in the same process
//! through the full encode/decode path, without sockets.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::server::FieldServer;
use crate::error::{MxError, Result};
use crate::transport::{take_terminated, Transport};

/// Transport whose peer is a shared [`FieldServer`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    server: Arc<Mutex<FieldServer>>,
    outgoing: Vec<u8>,
    incoming: Vec<u8>,
}

impl LoopbackTransport {
    pub fn new(server: Arc<Mutex<FieldServer>>) -> Self {
        Self {
            server,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn server(&self) -> &Arc<Mutex<FieldServer>> {
        &self.server
    }
}

impl Transport for LoopbackTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.outgoing.extend_from_slice(bytes);
        while let Some(line) = take_terminated(&mut self.outgoing, b"\n") {
            let reply = self.server.lock().handle_line(&line);
            self.incoming.extend(reply);
        }
        Ok(())
    }

    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        take_terminated(&mut self.incoming, terminator).ok_or_else(|| {
            MxError::timed_out(
                "read_until",
                format!("loopback server sent no reply within {:?}", timeout),
            )
        })
    }

    fn discard_unread_input(&mut self) -> Result<()> {
        self.incoming.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}
