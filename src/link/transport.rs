//! Framed packet transport over a [`SerialPort`].
//!
//! ```text
//!  senders ──▶ TX mutex ──▶ shared frame buffer ──▶ write / write_async
//!                                     ▲                     │
//!                     tx_done signal ─┘◀── SerialEvent::TxDone
//!
//!  rx task ──▶ RxPump (owns FrameDecoder) ──▶ on_packet callback
//! ```
//!
//! One `Transport` per link, shared behind an `Arc`. The transmit side is
//! usable from any task; the receive side lives in the [`RxPump`] so the
//! decoder has exactly one owner and needs no locking.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};
use futures_lite::future::block_on;
use log::{debug, info, warn};

use super::codec::{Decoded, FrameDecoder, FramingFault, MAX_FRAME_PAYLOAD, MAX_PACKET_SIZE, encode_frame};
use super::serial::{SerialEvent, SerialPort};
use crate::config::LinkConfig;
use crate::error::{Error, LinkError};

/// Bytes pulled from the serial port per read call.
const RX_CHUNK: usize = 64;

/// Events reported to the optional transport observer.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportEvent<'a> {
    /// A frame passed CRC and framing checks.
    PacketReceived(&'a [u8]),
    /// An async transmission physically completed.
    TxComplete,
    /// The serial driver reported a line-level receive error.
    RxError(SerialEvent),
    CrcError { expected: u16, computed: u16 },
    FramingError(FramingFault),
    /// A partial frame was dropped after the inter-byte timeout.
    Timeout,
}

/// Observer callback. Runs on whichever task raised the event, including
/// the context delivering `TxDone`; keep it short.
pub type Observer = Box<dyn Fn(&TransportEvent<'_>) + Send + Sync>;

/// Point-in-time copy of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub crc_errors: u32,
    pub framing_errors: u32,
    pub timeout_errors: u32,
    /// Overflow, frame, parity and break errors from the driver.
    pub line_errors: u32,
}

#[derive(Default)]
struct Counters {
    packets_sent: AtomicU32,
    packets_received: AtomicU32,
    crc_errors: AtomicU32,
    framing_errors: AtomicU32,
    timeout_errors: AtomicU32,
    line_errors: AtomicU32,
}

impl Counters {
    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            line_errors: self.line_errors.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for c in [
            &self.packets_sent,
            &self.packets_received,
            &self.crc_errors,
            &self.framing_errors,
            &self.timeout_errors,
            &self.line_errors,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    rx_timeout_ms: u32,
    tx_mutex_timeout_ms: u32,
    tx_complete_timeout_ms: u32,
}

type TxBuffer = [u8; MAX_PACKET_SIZE];

/// Framed packet transport.
pub struct Transport<S: SerialPort> {
    serial: S,
    timing: Timing,
    /// Serialises every producer of outbound frames.
    tx: Mutex<CriticalSectionRawMutex, TxBuffer>,
    /// `Signal` wakes a single waiter; this admits them one at a time.
    tx_waiter: Mutex<CriticalSectionRawMutex, ()>,
    tx_in_progress: AtomicBool,
    tx_done: Signal<CriticalSectionRawMutex, ()>,
    initialized: AtomicBool,
    counters: Counters,
    observer: OnceLock<Observer>,
}

impl<S: SerialPort> Transport<S> {
    /// Bring up the transport on `serial`.
    ///
    /// Returns the shared transmit handle and the receive pump, which must
    /// be driven by exactly one task.
    pub fn new(serial: S, config: &LinkConfig) -> Result<(Arc<Self>, RxPump<S>), Error> {
        config.validate().map_err(Error::Config)?;

        let transport = Arc::new(Self {
            serial,
            timing: Timing {
                rx_timeout_ms: config.rx_timeout_ms,
                tx_mutex_timeout_ms: config.tx_mutex_timeout_ms,
                tx_complete_timeout_ms: config.tx_complete_timeout_ms,
            },
            tx: Mutex::new([0; MAX_PACKET_SIZE]),
            tx_waiter: Mutex::new(()),
            tx_in_progress: AtomicBool::new(false),
            tx_done: Signal::new(),
            initialized: AtomicBool::new(true),
            counters: Counters::default(),
            observer: OnceLock::new(),
        });

        info!(
            "LINK: transport up (rx timeout {}ms, tx timeout {}ms)",
            config.rx_timeout_ms, config.tx_complete_timeout_ms
        );

        let pump = RxPump {
            transport: Arc::clone(&transport),
            decoder: FrameDecoder::new(),
        };
        Ok((transport, pump))
    }

    /// Install the event observer. Only the first call takes effect.
    pub fn set_observer(&self, observer: Observer) -> bool {
        self.observer.set(observer).is_ok()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Shut the transport down. Later sends fail with `NotInitialized`
    /// and anyone blocked on an outstanding transfer is released.
    pub fn deinit(&self) {
        if self.initialized.swap(false, Ordering::AcqRel) {
            self.tx_in_progress.store(false, Ordering::Release);
            self.tx_done.signal(());
            info!("LINK: transport down");
        }
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    // ── Transmit ──────────────────────────────────────────────

    /// Frame `payload` and write it synchronously.
    ///
    /// Fails with `TxFailed` if the driver accepts fewer bytes than the
    /// frame length.
    pub fn send_packet(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(LinkError::PayloadTooLarge);
        }

        let written = {
            let mut tx = self.lock_tx()?;
            let len = encode_frame(payload, &mut tx[..]).ok_or(LinkError::PayloadTooLarge)?;
            let written = self.serial.write(&tx[..len], self.timing.tx_complete_timeout_ms)?;
            if written < len {
                warn!("LINK: short write {}/{} bytes", written, len);
                return Err(LinkError::TxFailed);
            }
            written
        };

        Counters::bump(&self.counters.packets_sent);
        debug!("LINK: sent {} bytes", written);
        Ok(())
    }

    /// Frame `payload` into the shared buffer and start a background write.
    ///
    /// Blocks only while a previous async transfer is still draining the
    /// shared buffer (bounded by the completion timeout). The mutex is
    /// released as soon as the driver has accepted the frame.
    pub fn send_packet_async(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(LinkError::PayloadTooLarge);
        }

        let mut tx = self.lock_tx()?;
        self.wait_idle(self.timing.tx_complete_timeout_ms)?;
        self.ensure_initialized()?;

        let len = encode_frame(payload, &mut tx[..]).ok_or(LinkError::PayloadTooLarge)?;

        self.tx_done.reset();
        self.tx_in_progress.store(true, Ordering::Release);
        if let Err(e) = self.serial.write_async(&tx[..len]) {
            warn!("LINK: async write failed: {}", e);
            self.complete_tx();
            return Err(e);
        }
        drop(tx);

        Counters::bump(&self.counters.packets_sent);
        Ok(())
    }

    /// Write raw bytes without framing (diagnostics).
    pub fn send_raw(&self, data: &[u8]) -> Result<(), LinkError> {
        self.ensure_initialized()?;
        let _tx = self.lock_tx()?;
        let written = self.serial.write(data, self.timing.tx_complete_timeout_ms)?;
        if written < data.len() {
            return Err(LinkError::TxFailed);
        }
        Ok(())
    }

    /// `true` while an async transfer has not reported `TxDone`.
    pub fn tx_busy(&self) -> bool {
        self.tx_in_progress.load(Ordering::Acquire)
    }

    /// Block until no async transfer is outstanding.
    pub fn wait_tx_complete(&self, timeout_ms: u32) -> Result<(), LinkError> {
        self.wait_idle(timeout_ms)
    }

    /// Entry point for driver notifications. Safe to call from the
    /// driver's completion context: it only touches atomics and the signal.
    pub fn on_serial_event(&self, event: SerialEvent) {
        match event {
            SerialEvent::TxDone => {
                if self.complete_tx() {
                    self.notify(&TransportEvent::TxComplete);
                }
            }
            // Receive data is polled by the RxPump.
            SerialEvent::RxData => {}
            SerialEvent::RxOverflow
            | SerialEvent::FrameError
            | SerialEvent::ParityError
            | SerialEvent::Break => {
                Counters::bump(&self.counters.line_errors);
                self.notify(&TransportEvent::RxError(event));
            }
        }
    }

    // ── Stats ─────────────────────────────────────────────────

    pub fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    // ── Internal ──────────────────────────────────────────────

    fn ensure_initialized(&self) -> Result<(), LinkError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LinkError::NotInitialized)
        }
    }

    fn lock_tx(&self) -> Result<MutexGuard<'_, CriticalSectionRawMutex, TxBuffer>, LinkError> {
        let timeout = Duration::from_millis(u64::from(self.timing.tx_mutex_timeout_ms));
        block_on(with_timeout(timeout, self.tx.lock())).map_err(|_| {
            warn!("LINK: tx mutex timeout");
            LinkError::Busy
        })
    }

    /// Clear the in-progress flag and release the completion signal.
    /// Returns `false` if no transfer was outstanding, so each transfer
    /// signals at most once.
    fn complete_tx(&self) -> bool {
        if self.tx_in_progress.swap(false, Ordering::AcqRel) {
            self.tx_done.signal(());
            true
        } else {
            false
        }
    }

    fn wait_idle(&self, timeout_ms: u32) -> Result<(), LinkError> {
        if !self.tx_busy() {
            return Ok(());
        }

        let wait = async {
            let _gate = self.tx_waiter.lock().await;
            while self.tx_busy() {
                self.tx_done.wait().await;
            }
        };

        let timeout = Duration::from_millis(u64::from(timeout_ms));
        block_on(with_timeout(timeout, wait)).map_err(|_| {
            warn!("LINK: tx completion timeout ({}ms)", timeout_ms);
            LinkError::Timeout
        })
    }

    fn notify(&self, event: &TransportEvent<'_>) {
        if let Some(observer) = self.observer.get() {
            observer(event);
        }
    }
}

// ── Receive side ─────────────────────────────────────────────

/// Receive half of the transport. Owns the frame decoder.
pub struct RxPump<S: SerialPort> {
    transport: Arc<Transport<S>>,
    decoder: FrameDecoder,
}

impl<S: SerialPort> RxPump<S> {
    pub fn transport(&self) -> &Arc<Transport<S>> {
        &self.transport
    }

    /// Feed one received byte. `on_packet` runs for every valid frame.
    pub fn process_byte(&mut self, byte: u8, now_ms: u64, on_packet: &mut impl FnMut(&[u8])) {
        let transport = &self.transport;

        if self.decoder.check_timeout(now_ms, transport.timing.rx_timeout_ms) {
            Counters::bump(&transport.counters.timeout_errors);
            warn!("LINK: rx timeout, partial frame dropped");
            transport.notify(&TransportEvent::Timeout);
        }

        match self.decoder.push(byte) {
            None => {}
            Some(Decoded::Packet(payload)) => {
                Counters::bump(&transport.counters.packets_received);
                transport.notify(&TransportEvent::PacketReceived(payload));
                on_packet(payload);
            }
            Some(Decoded::CrcMismatch { expected, computed }) => {
                Counters::bump(&transport.counters.crc_errors);
                warn!(
                    "LINK: CRC mismatch (expected 0x{:04X}, got 0x{:04X})",
                    expected, computed
                );
                transport.notify(&TransportEvent::CrcError { expected, computed });
            }
            Some(Decoded::Framing(fault)) => {
                Counters::bump(&transport.counters.framing_errors);
                warn!("LINK: framing error {:?}", fault);
                transport.notify(&TransportEvent::FramingError(fault));
            }
        }
    }

    /// Drain whatever the serial port has buffered. Returns bytes consumed.
    pub fn poll(&mut self, now_ms: u64, mut on_packet: impl FnMut(&[u8])) -> usize {
        if !self.transport.is_initialized() {
            return 0;
        }

        let mut buf = [0u8; RX_CHUNK];
        let mut total = 0;
        while self.transport.serial.available() > 0 {
            let n = match self.transport.serial.read(&mut buf, 0) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("LINK: read failed: {}", e);
                    break;
                }
            };
            for &b in &buf[..n] {
                self.process_byte(b, now_ms, &mut on_packet);
            }
            total += n;
        }
        total
    }

    /// Drop any partial frame and discard buffered input.
    pub fn flush(&mut self) {
        self.decoder.reset();
        self.transport.serial.flush_rx();
    }
}
