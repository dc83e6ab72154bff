//! Command/response protocol carried inside link frames.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  link frame payload                                      │
//! │  ┌────────────────────── 6 B header ─┬─────────────────┐ │
//! │  │ type │ cmd_id │ seq │ status │ len │ payload ≤ 256 B │ │
//! │  └───────────────────────────────────┴─────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`packet`]: header/payload layouts and encoders
//! - [`handler`]: the command dispatcher
//! - [`stream`]: the periodic NOTIFY task

pub mod handler;
pub mod packet;
pub mod stream;

pub use handler::ProtocolHandler;
pub use packet::{CommandId, PacketType, RespStatus, SensorType};
