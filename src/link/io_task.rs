//! Receive task: drains the UART into the frame decoder.
//!
//! ```text
//!  ┌────────────────────────────── link-rx (Core 0) ─┐
//!  │  loop {                                          │
//!  │    RxPump::poll(uptime) ──▶ on_packet(payload)   │
//!  │    sleep(poll interval)                          │
//!  │  }                                               │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! Valid payloads are handed to `on_packet` on this thread, so the
//! dispatcher runs here too; responses go out on the async transmit path
//! and never stall the receive loop for longer than one frame.

use log::info;

use super::serial::SerialPort;
use super::transport::RxPump;
use crate::app::ports::Clock;
use crate::drivers::task_pin::{self, Core, Poller};
use crate::error::Error;

const RX_PRIORITY: u8 = 10;
const RX_STACK_KB: usize = 6;

/// Spawn the receive task on the protocol core.
///
/// The task owns `pump`; stop it through the returned [`Poller`].
pub fn spawn<S, C, F>(
    mut pump: RxPump<S>,
    clock: C,
    poll_interval_ms: u32,
    mut on_packet: F,
) -> Result<Poller, Error>
where
    S: SerialPort + 'static,
    C: Clock + 'static,
    F: FnMut(&[u8]) + Send + 'static,
{
    info!("LINK: rx task polling every {}ms", poll_interval_ms);
    task_pin::spawn_poller(
        Core::Pro,
        RX_PRIORITY,
        RX_STACK_KB,
        "link-rx\0",
        poll_interval_ms,
        move || {
            pump.poll(clock.uptime_ms(), &mut on_packet);
        },
    )
    .map_err(|_| Error::Init("link rx task"))
}
