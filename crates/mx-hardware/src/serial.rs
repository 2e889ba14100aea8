//! Blocking serial-port [`Transport`] built on the `serialport` crate.

use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::time::{Duration, Instant};

use mx_core::limits::MAX_LINE_LENGTH;
use mx_core::transport::take_terminated;
use mx_core::{MxError, Result, Transport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

fn serial_error(operation: &str, port: &str, err: serialport::Error) -> MxError {
    MxError::device_io(operation, format!("serial port {}: {}", port, err))
}

/// 8N1 serial line without flow control.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    buffer: Vec<u8>,
}

impl SerialTransport {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| serial_error("open", name, e))?;
        debug!("Opened serial port {} at {} baud", name, baud_rate);
        Ok(Self {
            port,
            name: name.to_string(),
            buffer: Vec::new(),
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_until(&mut self, terminator: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];
        loop {
            if let Some(message) = take_terminated(&mut self.buffer, terminator) {
                return Ok(message);
            }
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(MxError::device_io(
                    "read_until",
                    format!("{} sent more than {} bytes without a terminator", self.name, MAX_LINE_LENGTH),
                ));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MxError::timed_out(
                    "read_until",
                    format!("no complete reply from {} within {:?}", self.name, timeout),
                ));
            }
            self.port
                .set_timeout(remaining)
                .map_err(|e| serial_error("read_until", &self.name, e))?;
            match self.port.read(&mut chunk) {
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::Interrupted) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn discard_unread_input(&mut self) -> Result<()> {
        self.buffer.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| serial_error("discard_unread_input", &self.name, e))
    }

    fn discard_unwritten_output(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Output)
            .map_err(|e| serial_error("discard_unwritten_output", &self.name, e))
    }

    fn describe(&self) -> String {
        format!("serial://{}", self.name)
    }
}
