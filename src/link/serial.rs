//! Serial port abstraction: the UART underneath the framed transport.
//!
//! Concrete implementations:
//! - ESP-IDF `UartDriver` (`adapters::uart`, firmware builds)
//! - In-memory mock (integration tests)
//!
//! [`Transport`](super::transport::Transport) is generic over `SerialPort`,
//! so swapping the UART for another byte channel requires no changes to
//! the framing logic. All methods take `&self`: the transmit side is
//! serialised by the transport's mutex and the receive side is owned by a
//! single task, so implementations only need interior mutability where the
//! underlying driver does.

use crate::error::LinkError;

/// Driver-level notifications.
///
/// The transport consumes only `TxDone`; receive errors are counted and
/// forwarded to its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialEvent {
    /// A `write_async` transfer has physically left the UART.
    TxDone,
    /// Receive data available.
    RxData,
    /// RX FIFO or ring buffer overflowed.
    RxOverflow,
    /// Stop-bit error.
    FrameError,
    ParityError,
    /// Line break detected.
    Break,
}

/// Full-duplex byte channel.
pub trait SerialPort: Send + Sync {
    /// Blocking write. Returns the number of bytes accepted before
    /// `timeout_ms` expired.
    fn write(&self, data: &[u8], timeout_ms: u32) -> Result<usize, LinkError>;

    /// Start a non-blocking write of the whole of `data`.
    ///
    /// The driver copies `data` before returning and later reports
    /// completion as [`SerialEvent::TxDone`] to whoever owns the event
    /// callback.
    fn write_async(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`
    /// (`0` = non-blocking). Returns the number of bytes read.
    fn read(&self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, LinkError>;

    /// Bytes waiting in the receive buffer.
    fn available(&self) -> usize;

    /// Discard everything in the receive buffer.
    fn flush_rx(&self);
}

/// A null port that discards all writes and never reads.
/// Used when the link is disabled; async writes never complete.
pub struct NullSerial;

impl SerialPort for NullSerial {
    fn write(&self, data: &[u8], _timeout_ms: u32) -> Result<usize, LinkError> {
        Ok(data.len())
    }

    fn write_async(&self, _data: &[u8]) -> Result<(), LinkError> {
        Ok(())
    }

    fn read(&self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, LinkError> {
        Ok(0)
    }

    fn available(&self) -> usize {
        0
    }

    fn flush_rx(&self) {}
}
