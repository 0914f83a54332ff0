//! # Serial Link
//!
//! Line-oriented access to the scale's serial port.
//!
//! ## Seam
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ScaleController<O: LinkOpener>                                       │
//! │        │ open(port, baud)                                               │
//! │        ▼                                                                │
//! │   ┌──────────────────┐        ┌───────────────────────────────────┐    │
//! │   │  LinkOpener      │───────►│  SerialLink                       │    │
//! │   │  TokioSerial...  │        │  write_command / read_line        │    │
//! │   │  (tests: fakes)  │        │  backlog / discard_input / close  │    │
//! │   └──────────────────┘        └───────────────────────────────────┘    │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                              tokio-serial, 8 data bits,                 │
//! │                              no parity, 1 stop bit                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::{debug, info};

use crate::error::{DeviceError, DeviceResult};

/// Longest line kept while waiting for a terminator. Longer input is noise.
const MAX_LINE_BYTES: usize = 256;

/// Bound on a single command write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Traits
// =============================================================================

/// An open serial link carrying CR/LF-terminated ASCII lines.
#[async_trait]
pub trait SerialLink: Send {
    /// Writes raw command bytes and flushes.
    async fn write_command(&mut self, bytes: &[u8]) -> DeviceResult<()>;

    /// Reads one complete line, without its terminator.
    ///
    /// Returns `Ok(None)` if no complete line arrives within `wait`.
    /// Partial input is kept for the next call.
    async fn read_line(&mut self, wait: Duration) -> DeviceResult<Option<String>>;

    /// Bytes received but not yet consumed.
    fn backlog(&self) -> DeviceResult<usize>;

    /// Drops everything received so far.
    fn discard_input(&mut self) -> DeviceResult<()>;

    /// Flushes and releases the port.
    async fn close(&mut self) -> DeviceResult<()>;
}

/// Opens serial links.
#[async_trait]
pub trait LinkOpener: Send + Sync {
    type Link: SerialLink + 'static;

    async fn open(&self, port: &str, baud_rate: u32) -> DeviceResult<Self::Link>;
}

// =============================================================================
// tokio-serial Implementation
// =============================================================================

/// Opens real ports with 8N1 framing and no flow control.
#[derive(Debug, Clone, Default)]
pub struct TokioSerialOpener;

#[async_trait]
impl LinkOpener for TokioSerialOpener {
    type Link = TokioSerialLink;

    async fn open(&self, port: &str, baud_rate: u32) -> DeviceResult<TokioSerialLink> {
        debug!(%port, baud_rate, "Opening serial port");

        let stream = tokio_serial::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| DeviceError::open_failed(port, e))?;

        info!(%port, baud_rate, "Serial port opened");
        Ok(TokioSerialLink::new(port, stream))
    }
}

/// Serial link over a [`SerialStream`].
#[derive(Debug)]
pub struct TokioSerialLink {
    port: String,
    stream: SerialStream,
    pending: Vec<u8>,
}

impl TokioSerialLink {
    fn new(port: &str, stream: SerialStream) -> Self {
        TokioSerialLink {
            port: port.to_string(),
            stream,
            pending: Vec::with_capacity(MAX_LINE_BYTES),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

#[async_trait]
impl SerialLink for TokioSerialLink {
    async fn write_command(&mut self, bytes: &[u8]) -> DeviceResult<()> {
        let write = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        };

        match timeout(WRITE_TIMEOUT, write).await {
            Ok(result) => result.map_err(DeviceError::from),
            Err(_) => Err(DeviceError::Timeout(WRITE_TIMEOUT)),
        }
    }

    async fn read_line(&mut self, wait: Duration) -> DeviceResult<Option<String>> {
        let deadline = Instant::now() + wait;
        let mut chunk = [0u8; 64];

        loop {
            if let Some(line) = take_line(&mut self.pending) {
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            let read = match timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => return Ok(None),
            };

            if read == 0 {
                return Err(DeviceError::Disconnected);
            }
            self.pending.extend_from_slice(&chunk[..read]);

            if self.pending.len() > MAX_LINE_BYTES && !has_terminator(&self.pending) {
                debug!(port = %self.port, bytes = self.pending.len(), "Dropping unterminated serial input");
                self.pending.clear();
            }
        }
    }

    fn backlog(&self) -> DeviceResult<usize> {
        let waiting = self.stream.bytes_to_read()?;
        Ok(waiting as usize + self.pending.len())
    }

    fn discard_input(&mut self) -> DeviceResult<()> {
        self.pending.clear();
        self.stream.clear(ClearBuffer::Input)?;
        Ok(())
    }

    async fn close(&mut self) -> DeviceResult<()> {
        self.stream.shutdown().await?;
        info!(port = %self.port, "Serial port closed");
        Ok(())
    }
}

// =============================================================================
// Line Framing
// =============================================================================

fn has_terminator(buf: &[u8]) -> bool {
    buf.iter().any(|b| *b == b'\n' || *b == b'\r')
}

/// Splits the first CR/LF-terminated line off `buf`.
///
/// Returns `Some("")` for a bare terminator so callers can skip it.
pub(crate) fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let end = buf.iter().position(|b| *b == b'\n' || *b == b'\r')?;
    let line = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    buf.drain(..=end);
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_crlf() {
        let mut buf = b"  12.5 kg *\r\n  12.6 kg".to_vec();

        assert_eq!(take_line(&mut buf).as_deref(), Some("12.5 kg *"));
        // The LF half of CRLF is a bare terminator
        assert_eq!(take_line(&mut buf).as_deref(), Some(""));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(buf, b"  12.6 kg".to_vec());
    }

    #[test]
    fn test_take_line_lossy_utf8() {
        let mut buf = vec![b'1', 0xFF, b'2', b'\n'];
        let line = take_line(&mut buf).unwrap();
        assert!(line.starts_with('1'));
        assert!(line.ends_with('2'));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_has_terminator() {
        assert!(has_terminator(b"abc\r"));
        assert!(!has_terminator(b"abc"));
    }
}
