use std::io::{BufRead, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialport::SerialPort;

use super::constants::SERIAL_READ_TIMEOUT_MS;
use super::error::SerialReaderError;

/// Open the serial device for reading.
///
/// The port gets a short read timeout so the reader can notice a stop request while the
/// mill is quiet.
pub fn open_port(port: &str, baudrate: u32) -> Result<Box<dyn SerialPort>, SerialReaderError> {
    serialport::new(port, baudrate)
        .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
        .open()
        .map_err(|source| SerialReaderError::PortOpen {
            port: port.to_string(),
            source,
        })
}

/// LinePump turns a byte stream into complete text lines.
///
/// Partial lines survive read timeouts: bytes are kept until the terminating `\n` arrives.
/// Lines come back without their `\r\n`. Invalid UTF-8 is replaced rather than rejected,
/// the parser downstream will refuse the line anyway.
#[derive(Debug)]
pub struct LinePump<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    stop: Arc<AtomicBool>,
}

impl<R: BufRead> LinePump<R> {
    pub fn new(reader: R, stop: Arc<AtomicBool>) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            stop,
        }
    }

    /// Get the next complete line
    ///
    /// Returns `Ok(None)` once the stream ends or a stop was requested.
    pub fn next_line(&mut self) -> Result<Option<String>, SerialReaderError> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(None);
            }

            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    // End of stream; hand out whatever is left
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.take_line()));
                }
                Ok(_) => {
                    if self.buffer.ends_with(b"\n") {
                        return Ok(Some(self.take_line()));
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => return Err(SerialReaderError::IOError(e)),
            }
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buffer)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buffer.clear();
        line
    }
}
