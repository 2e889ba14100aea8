//! Blocking byte transports used by protocol drivers.
//!
//! Reads block for at most the caller-supplied timeout and then fail with
//! `TimedOut`; nothing in this module waits forever.
//!
//! - [`TcpTransport`]: a TCP socket.
//! - [`MockTransport`]: scripted replies plus a record of every write, for
//!   tests. Clones share the same script, so a test keeps one handle while
//!   the driver owns the other.
//!
//! The serial-line transport lives in the hardware crate behind its `serial`
//! feature.

use std::collections::VecDeque;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{MxError, Result};
use crate::limits::MAX_LINE_LENGTH;

/// A blocking, bidirectional byte stream.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reads through `terminator` and returns the bytes before it.
    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    fn discard_unread_input(&mut self) -> Result<()>;

    fn discard_unwritten_output(&mut self) -> Result<()> {
        Ok(())
    }

    /// Peer description for log messages.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        (**self).read_until(terminator, timeout)
    }

    fn discard_unread_input(&mut self) -> Result<()> {
        (**self).discard_unread_input()
    }

    fn discard_unwritten_output(&mut self) -> Result<()> {
        (**self).discard_unwritten_output()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Splits a complete terminated message off the front of `buffer`.
pub fn take_terminated(buffer: &mut Vec<u8>, terminator: &[u8]) -> Option<Vec<u8>> {
    if terminator.is_empty() {
        return None;
    }
    let at = buffer
        .windows(terminator.len())
        .position(|window| window == terminator)?;
    let mut message: Vec<u8> = buffer.drain(..at + terminator.len()).collect();
    message.truncate(at);
    Some(message)
}

fn line_too_long(peer: &str) -> MxError {
    MxError::device_io(
        "read_until",
        format!(
            "{} sent more than {} bytes without a terminator",
            peer, MAX_LINE_LENGTH
        ),
    )
}

// =============================================================================
// TCP
// =============================================================================

/// Line transport over a TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
    buffer: Vec<u8>,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| MxError::not_found("connect", format!("cannot resolve '{}'", peer)))?;
        let stream = TcpStream::connect_timeout(&address, timeout).map_err(|e| {
            MxError::from(e).in_record(&peer)
        })?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;
        debug!("Connected to {}", peer);
        Ok(Self::from_stream(stream, peer))
    }

    pub fn from_stream(stream: TcpStream, peer: String) -> Self {
        Self {
            stream,
            peer,
            buffer: Vec::new(),
        }
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(message) = take_terminated(&mut self.buffer, terminator) {
                return Ok(message);
            }
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(line_too_long(&self.peer));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MxError::timed_out(
                    "read_until",
                    format!("no complete reply from {} within {:?}", self.peer, timeout),
                ));
            }
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(MxError::device_io(
                        "read_until",
                        format!("{} closed the connection", self.peer),
                    ))
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut) => {}
                Err(e) if e.kind() == IoErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn discard_unread_input(&mut self) -> Result<()> {
        self.buffer.clear();
        self.stream.set_nonblocking(true)?;
        let mut chunk = [0u8; 1024];
        let drained = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == IoErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(MxError::from(e)),
            }
        };
        self.stream.set_nonblocking(false)?;
        drained
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

// =============================================================================
// Mock
// =============================================================================

#[derive(Debug, Default)]
struct MockScript {
    written: Vec<u8>,
    replies: VecDeque<u8>,
    fail_writes: Option<String>,
    discards: usize,
}

/// Scripted transport for tests.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<MockScript>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes the peer will "send".
    pub fn push_reply(&self, reply: impl AsRef<[u8]>) {
        self.script.lock().replies.extend(reply.as_ref());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.script.lock().written.clone()
    }

    /// Written data split on `terminator`, without the terminators.
    pub fn written_lines(&self, terminator: &[u8]) -> Vec<String> {
        let mut buffer = self.written();
        std::iter::from_fn(|| take_terminated(&mut buffer, terminator))
            .map(|line| String::from_utf8_lossy(&line).into_owned())
            .collect()
    }

    /// Makes every following write fail with `DeviceIo`.
    pub fn fail_writes(&self, message: &str) {
        self.script.lock().fail_writes = Some(message.to_string());
    }

    pub fn discard_count(&self) -> usize {
        self.script.lock().discards
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut script = self.script.lock();
        if let Some(message) = &script.fail_writes {
            return Err(MxError::device_io("write", message.clone()));
        }
        script.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let mut script = self.script.lock();
        let mut pending: Vec<u8> = script.replies.iter().copied().collect();
        match take_terminated(&mut pending, terminator) {
            Some(message) => {
                script.replies = pending.into();
                Ok(message)
            }
            None => Err(MxError::timed_out(
                "read_until",
                format!("mock peer sent no terminated reply within {:?}", timeout),
            )),
        }
    }

    fn discard_unread_input(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        script.replies.clear();
        script.discards += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_take_terminated() {
        let mut buffer = b"abc\r\ndef\r\nx".to_vec();
        assert_eq!(take_terminated(&mut buffer, b"\r\n"), Some(b"abc".to_vec()));
        assert_eq!(take_terminated(&mut buffer, b"\r\n"), Some(b"def".to_vec()));
        assert_eq!(take_terminated(&mut buffer, b"\r\n"), None);
        assert_eq!(buffer, b"x".to_vec());
    }

    #[test]
    fn test_mock_replies_and_timeout() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.push_reply("OK\n");
        assert_eq!(
            transport.read_until(b"\n", Duration::from_millis(10)).unwrap(),
            b"OK".to_vec()
        );
        let err = transport
            .read_until(b"\n", Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TimedOut);
    }

    #[test]
    fn test_mock_records_writes() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        transport.write_all(b"*RST\r\n").unwrap();
        transport.write_all(b"SENS 9\r\n").unwrap();
        assert_eq!(handle.written_lines(b"\r\n"), vec!["*RST", "SENS 9"]);

        handle.fail_writes("cable unplugged");
        let err = transport.write_all(b"x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceIo);
    }

    #[test]
    fn test_tcp_round_trip() {
        use std::io::BufRead;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut stream = stream;
            stream.write_all(format!("echo {}", line).as_bytes()).unwrap();
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        transport.write_all(b"ping\n").unwrap();
        let reply = transport.read_until(b"\n", Duration::from_secs(2)).unwrap();
        assert_eq!(reply, b"echo ping".to_vec());
        server.join().unwrap();
    }
}
