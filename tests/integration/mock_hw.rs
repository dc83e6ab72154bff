//! Mock hardware adapters for integration tests.
//!
//! - `MockSerial` records every transmitted frame, serves injected RX
//!   bytes and completes async writes immediately (like a UART with an
//!   instant TX-done interrupt).
//! - `MockSensor` returns a programmable reading and records open/close.
//! - `ManualClock` only moves when the test advances it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use powerbridge::app::ports::{Clock, ClockError, PowerReading, PowerSensor};
use powerbridge::config::LinkConfig;
use powerbridge::error::{LinkError, SensorError};
use powerbridge::link::codec::{Decoded, FrameDecoder, encode_frame, MAX_PACKET_SIZE};
use powerbridge::link::serial::{SerialEvent, SerialPort};
use powerbridge::link::transport::{RxPump, Transport};
use powerbridge::measurement::SensorProfile;
use powerbridge::protocol::packet::{MAX_PACKET_LEN, PacketType, PacketView, encode_packet};

// ── MockSerial ────────────────────────────────────────────────

type Handler = Box<dyn Fn(SerialEvent) + Send + Sync>;

pub struct MockSerial {
    written: Mutex<Vec<u8>>,
    rx: Mutex<VecDeque<u8>>,
    handler: OnceLock<Handler>,
    auto_complete: AtomicBool,
    async_writes: AtomicUsize,
}

#[allow(dead_code)]
impl MockSerial {
    pub fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            rx: Mutex::new(VecDeque::new()),
            handler: OnceLock::new(),
            auto_complete: AtomicBool::new(true),
            async_writes: AtomicUsize::new(0),
        }
    }

    pub fn set_event_handler(&self, handler: Handler) {
        let _ = self.handler.set(handler);
    }

    /// Stop reporting TX-done, as if the UART stalled.
    pub fn stall_tx(&self) {
        self.auto_complete.store(false, Ordering::Release);
    }

    pub fn inject(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn async_writes(&self) -> usize {
        self.async_writes.load(Ordering::Relaxed)
    }

    pub fn raw_written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Decode everything written so far into frame payloads.
    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        let bytes = self.raw_written();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for b in bytes {
            if let Some(Decoded::Packet(p)) = decoder.push(b) {
                out.push(p.to_vec());
            }
        }
        out
    }

    pub fn clear_written(&self) {
        self.written.lock().unwrap().clear();
    }
}

impl SerialPort for MockSerial {
    fn write(&self, data: &[u8], _timeout_ms: u32) -> Result<usize, LinkError> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn write_async(&self, data: &[u8]) -> Result<(), LinkError> {
        self.written.lock().unwrap().extend_from_slice(data);
        self.async_writes.fetch_add(1, Ordering::Relaxed);
        if self.auto_complete.load(Ordering::Acquire) {
            if let Some(h) = self.handler.get() {
                h(SerialEvent::TxDone);
            }
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, LinkError> {
        let mut rx = self.rx.lock().unwrap();
        let n = buf.len().min(rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = rx.pop_front().unwrap();
        }
        Ok(n)
    }

    fn available(&self) -> usize {
        self.rx.lock().unwrap().len()
    }

    fn flush_rx(&self) {
        self.rx.lock().unwrap().clear();
    }
}

/// Transport over a `MockSerial` with TX-done routed back into it.
pub fn mock_link(cfg: &LinkConfig) -> (Arc<Transport<MockSerial>>, RxPump<MockSerial>) {
    let (transport, pump) = Transport::new(MockSerial::new(), cfg).unwrap();
    let weak = Arc::downgrade(&transport);
    transport.serial().set_event_handler(Box::new(move |e| {
        if let Some(t) = weak.upgrade() {
            t.on_serial_event(e);
        }
    }));
    (transport, pump)
}

/// Fast timeouts so failure paths don't slow the suite.
pub fn fast_config() -> LinkConfig {
    LinkConfig {
        tx_mutex_timeout_ms: 100,
        tx_complete_timeout_ms: 100,
        stream_stop_timeout_ms: 500,
        ..LinkConfig::default()
    }
}

/// Build a complete wire frame carrying a CMD packet.
#[allow(dead_code)]
pub fn cmd_frame(cmd_id: u8, seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = [0u8; MAX_PACKET_LEN];
    let len = encode_packet(PacketType::Cmd, cmd_id, seq, 0, payload, &mut packet).unwrap();
    let mut frame = [0u8; MAX_PACKET_SIZE];
    let n = encode_frame(&packet[..len], &mut frame).unwrap();
    frame[..n].to_vec()
}

/// Parsed copy of a sent packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub packet_type: u8,
    pub cmd_id: u8,
    pub seq: u8,
    pub status: u8,
    pub payload: Vec<u8>,
}

#[allow(dead_code)]
pub fn parse_sent(serial: &MockSerial) -> Vec<Sent> {
    serial
        .sent_payloads()
        .iter()
        .map(|p| {
            let view = PacketView::parse(p).unwrap();
            Sent {
                packet_type: view.header.packet_type,
                cmd_id: view.header.cmd_id,
                seq: view.header.seq,
                status: view.header.status,
                payload: view.payload.to_vec(),
            }
        })
        .collect()
}

// ── MockSensor ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SensorLog {
    pub open: bool,
    pub opens: u32,
    pub closes: u32,
    pub reads: u32,
    pub last_profile: Option<SensorProfile>,
    pub reading: PowerReading,
    pub fail_open: bool,
    pub fail_read: bool,
}

/// Power sensor whose state the test keeps a handle to.
#[derive(Clone, Default)]
pub struct MockSensor {
    pub log: Arc<Mutex<SensorLog>>,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reading(&self, current_ma: f32, voltage_v: f32) {
        self.log.lock().unwrap().reading = PowerReading {
            current_ma,
            voltage_v,
            power_mw: current_ma * voltage_v,
        };
    }
}

impl PowerSensor for MockSensor {
    fn open(&mut self, profile: &SensorProfile) -> Result<(), SensorError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_open {
            return Err(SensorError::Bus);
        }
        log.open = true;
        log.opens += 1;
        log.last_profile = Some(*profile);
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.open {
            log.closes += 1;
        }
        log.open = false;
    }

    fn is_open(&self) -> bool {
        self.log.lock().unwrap().open
    }

    fn read(&mut self) -> Result<PowerReading, SensorError> {
        let mut log = self.log.lock().unwrap();
        if !log.open {
            return Err(SensorError::NotOpen);
        }
        if log.fail_read {
            return Err(SensorError::Bus);
        }
        log.reads += 1;
        Ok(log.reading)
    }
}

// ── ManualClock ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
    rtc: Arc<Mutex<Option<(u32, u64)>>>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(ms: u64) -> Self {
        let c = Self::default();
        c.now_ms.store(ms, Ordering::Relaxed);
        c
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    fn rtc_now(&self) -> Option<u32> {
        let rtc = *self.rtc.lock().unwrap();
        rtc.map(|(base, set_at)| base + ((self.uptime_ms() - set_at) / 1000) as u32)
    }

    fn set_rtc(&self, unix_secs: u32) -> Result<(), ClockError> {
        if unix_secs == 0 {
            return Err(ClockError::Rejected);
        }
        *self.rtc.lock().unwrap() = Some((unix_secs, self.uptime_ms()));
        Ok(())
    }
}
