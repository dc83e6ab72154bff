//! ESP-IDF UART adapter: [`SerialPort`] over `UartDriver`.
//!
//! The driver is split into its TX and RX halves so the receive task and
//! the transmit path never contend. `write_async` hands the frame to the
//! driver's TX ring buffer and wakes a watcher thread that blocks on
//! `wait_tx_done` and reports [`SerialEvent::TxDone`] to the installed
//! handler (normally `Transport::on_serial_event`).

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use esp_idf_svc::hal::delay::{NON_BLOCK, TickType};
use esp_idf_svc::hal::uart::{UartDriver, UartRxDriver, UartTxDriver};
use futures_lite::future::block_on;
use log::{info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::{Error, LinkError};
use crate::link::serial::{SerialEvent, SerialPort};

const WATCHER_PRIORITY: u8 = 11;
const WATCHER_STACK_KB: usize = 3;

/// Upper bound on one frame draining at the slowest supported baud rate.
const TX_DONE_TIMEOUT_MS: u64 = 100;

pub type EventHandler = Box<dyn Fn(SerialEvent) + Send + Sync>;

struct Inner {
    tx: Mutex<UartTxDriver<'static>>,
    rx: Mutex<UartRxDriver<'static>>,
    tx_started: Signal<CriticalSectionRawMutex, ()>,
    handler: OnceLock<EventHandler>,
}

impl Inner {
    fn emit(&self, event: SerialEvent) {
        if let Some(handler) = self.handler.get() {
            handler(event);
        }
    }
}

/// UART serial port for the link.
pub struct EspUart {
    inner: Arc<Inner>,
}

impl EspUart {
    /// Take ownership of a configured driver and start the TX watcher.
    pub fn new(driver: UartDriver<'static>) -> Result<Self, Error> {
        let (tx, rx) = driver.into_split();
        let inner = Arc::new(Inner {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            tx_started: Signal::new(),
            handler: OnceLock::new(),
        });

        let watcher = Arc::clone(&inner);
        task_pin::spawn_on_core(
            Core::Pro,
            WATCHER_PRIORITY,
            WATCHER_STACK_KB,
            "uart-txdone\0",
            move || loop {
                block_on(watcher.tx_started.wait());
                let done = watcher
                    .tx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .wait_done(TickType::new_millis(TX_DONE_TIMEOUT_MS).ticks());
                if let Err(e) = done {
                    warn!("UART: tx drain wait failed: {}", e);
                }
                // Always release the transport; it times out on its own
                // if the bytes really did not leave.
                watcher.emit(SerialEvent::TxDone);
            },
        )
        .map_err(|_| Error::Init("uart tx watcher"))?;

        info!("UART: link port ready");
        Ok(Self { inner })
    }

    /// Route driver events. Only the first call takes effect.
    pub fn set_event_handler(&self, handler: EventHandler) -> bool {
        self.inner.handler.set(handler).is_ok()
    }
}

impl SerialPort for EspUart {
    fn write(&self, data: &[u8], timeout_ms: u32) -> Result<usize, LinkError> {
        let tx = self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let n = tx.write(data).map_err(|_| LinkError::Serial)?;
        tx.wait_done(TickType::new_millis(u64::from(timeout_ms)).ticks())
            .map_err(|_| LinkError::Timeout)?;
        Ok(n)
    }

    fn write_async(&self, data: &[u8]) -> Result<(), LinkError> {
        let tx = self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let n = tx.write(data).map_err(|_| LinkError::Serial)?;
        drop(tx);
        if n < data.len() {
            return Err(LinkError::TxFailed);
        }
        self.inner.tx_started.signal(());
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, LinkError> {
        let ticks = if timeout_ms == 0 {
            NON_BLOCK
        } else {
            TickType::new_millis(u64::from(timeout_ms)).ticks()
        };
        let rx = self.inner.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.read(buf, ticks) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.inner.emit(SerialEvent::FrameError);
                warn!("UART: read failed: {}", e);
                Err(LinkError::Serial)
            }
        }
    }

    fn available(&self) -> usize {
        self.inner
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
            .unwrap_or(0) as usize
    }

    fn flush_rx(&self) {
        if let Err(e) = self
            .inner
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear()
        {
            warn!("UART: rx flush failed: {}", e);
        }
    }
}
