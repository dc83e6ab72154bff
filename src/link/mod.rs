//! Framed serial link to the host MCU.
//!
//! ```text
//! ┌──────┬──────────┬──────────────┬──────────┬──────┐
//! │ 0xAA │ LEN (LE) │ payload      │ CRC (LE) │ 0x55 │
//! └──────┴──────────┴──────────────┴──────────┴──────┘
//! ```
//!
//! CRC-16/CCITT-FALSE over the payload only.

pub mod codec;
pub mod crc;
pub mod io_task;
pub mod serial;
pub mod transport;

pub use serial::{SerialEvent, SerialPort};
pub use transport::{RxPump, Transport, TransportStats};
