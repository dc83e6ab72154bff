//! Periodic sensor streaming task.
//!
//! One thread per active stream. Cancellation is cooperative: `stop`
//! raises a flag that the loop checks at the top of every iteration and
//! wakes the inter-sample sleep early, then waits (bounded) for the task
//! to acknowledge. A task that misses the deadline is detached, never
//! killed mid-send; it exits on its own at the next flag check.
//!
//! ```text
//!   loop {
//!     stop requested? ──yes──▶ mark inactive, signal finished, exit
//!     tick()                     (build sample, send NOTIFY)
//!     sleep(interval) ◀── woken early by stop
//!   }
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use futures_lite::future::block_on;
use log::{info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::Error;

const STREAM_PRIORITY: u8 = 5;
const STREAM_STACK_KB: usize = 4;

/// Shared between the task and its handle.
struct StreamControl {
    stop_requested: AtomicBool,
    active: AtomicBool,
    /// Wakes the inter-sample sleep.
    wake: Signal<CriticalSectionRawMutex, ()>,
    /// Raised once by the task on exit.
    finished: Signal<CriticalSectionRawMutex, ()>,
}

impl StreamControl {
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.signal(());
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Sleep for `ms`; returns `true` if woken early by a stop request.
    fn sleep(&self, ms: u32) -> bool {
        let timeout = Duration::from_millis(u64::from(ms));
        block_on(with_timeout(timeout, self.wake.wait())).is_ok()
    }
}

/// Handle to a running stream.
pub struct StreamHandle {
    control: Arc<StreamControl>,
    join: Option<JoinHandle<()>>,
    interval_ms: u32,
}

impl StreamHandle {
    /// `true` until the task has exited its loop.
    pub fn is_active(&self) -> bool {
        self.control.active.load(Ordering::Acquire)
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Request a stop and wait up to `timeout_ms` for the task to exit.
    /// Returns `true` if the task acknowledged in time.
    pub fn stop(mut self, timeout_ms: u32) -> bool {
        self.control.request_stop();

        let timeout = Duration::from_millis(u64::from(timeout_ms));
        let acked = !self.is_active()
            || block_on(with_timeout(timeout, self.control.finished.wait())).is_ok();

        match self.join.take() {
            Some(handle) if acked => {
                if handle.join().is_err() {
                    warn!("PROTO: stream task panicked");
                }
            }
            // Detach; the task exits at its next flag check.
            Some(_) => warn!("PROTO: stream task did not stop within {}ms", timeout_ms),
            None => {}
        }
        acked
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.control.request_stop();
    }
}

/// Spawn a stream calling `tick` every `interval_ms`.
pub fn spawn(interval_ms: u32, mut tick: impl FnMut() + Send + 'static) -> Result<StreamHandle, Error> {
    let control = Arc::new(StreamControl {
        stop_requested: AtomicBool::new(false),
        active: AtomicBool::new(true),
        wake: Signal::new(),
        finished: Signal::new(),
    });

    let task_control = Arc::clone(&control);
    let join = task_pin::spawn_on_core(
        Core::App,
        STREAM_PRIORITY,
        STREAM_STACK_KB,
        "proto-stream\0",
        move || {
            info!("PROTO: stream task started ({}ms)", interval_ms);
            while !task_control.stop_requested() {
                tick();
                if task_control.sleep(interval_ms) {
                    break;
                }
            }
            task_control.active.store(false, Ordering::Release);
            task_control.finished.signal(());
            info!("PROTO: stream task exiting");
        },
    )
    .map_err(|_| Error::Init("stream task"))?;

    Ok(StreamHandle {
        control,
        join: Some(join),
        interval_ms,
    })
}
