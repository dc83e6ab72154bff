//! Command dispatcher.
//!
//! [`ProtocolHandler`] turns transport payloads into protocol packets,
//! routes CMD packets to their handlers and answers every one of them
//! with exactly one RESP (same `cmd_id` and `seq`). Responses and
//! notifications go out on the async transmit path so command handling
//! never blocks on link throughput.
//!
//! ```text
//!  RxPump ──▶ handle_packet ──▶ validate ──▶ CommandId match ──▶ RESP
//!                                                │
//!                       START/STOP ──▶ stream task ──▶ NOTIFY (seq++)
//!                 STATUS/CONFIG/CLEAR ──▶ MeasurementSession
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, info, warn};

use super::packet::{
    CommandId, GetBufferDataRequest, MAX_PACKET_LEN, PROTOCOL_MAX_PAYLOAD, PacketType, PacketView,
    RespStatus, SensorSample, SensorType, SessionConfigRequest, SessionConfigResponse,
    SetRtcRequest, StartStreamRequest, StatusResponse, encode_packet,
};
use super::stream::{self, StreamHandle};
use crate::app::ports::{Clock, PowerSensor, SubscriptionId, TemperatureFeed, TemperatureUpdate};
use crate::config::LinkConfig;
use crate::error::{Error, SessionError};
use crate::link::serial::SerialPort;
use crate::link::transport::Transport;
use crate::measurement::{MeasurementSession, SessionConfig};

type Reply = heapless::Vec<u8, PROTOCOL_MAX_PAYLOAD>;

fn reply(bytes: &[u8]) -> Reply {
    Reply::from_slice(bytes).unwrap_or_default()
}

fn empty() -> Reply {
    Reply::new()
}

// ── Temperature cache ────────────────────────────────────────

/// Last good reading from the temperature topic.
pub struct TemperatureCache {
    latest: BlockingMutex<CriticalSectionRawMutex, Cell<Option<f32>>>,
}

impl Default for TemperatureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureCache {
    pub fn new() -> Self {
        Self {
            latest: BlockingMutex::new(Cell::new(None)),
        }
    }

    /// A failed read invalidates the cache.
    pub fn update(&self, update: &TemperatureUpdate) {
        let value = update.sensor_ok.then_some(update.temperature);
        self.latest.lock(|c| c.set(value));
    }

    pub fn latest(&self) -> Option<f32> {
        self.latest.lock(Cell::get)
    }
}

// ── Notifier ─────────────────────────────────────────────────

/// NOTIFY sender with its own sequence counter, independent of requests.
pub struct Notifier<S: SerialPort> {
    transport: Arc<Transport<S>>,
    seq: AtomicU8,
}

impl<S: SerialPort> Notifier<S> {
    fn new(transport: Arc<Transport<S>>) -> Self {
        Self {
            transport,
            seq: AtomicU8::new(0),
        }
    }

    pub fn send(&self, cmd_id: u8, payload: &[u8]) -> Result<(), Error> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut buf = [0u8; MAX_PACKET_LEN];
        let len = encode_packet(PacketType::Notify, cmd_id, seq, 0, payload, &mut buf)?;
        self.transport.send_packet_async(&buf[..len])?;
        Ok(())
    }

    pub fn send_sample(&self, sample: &SensorSample) -> Result<(), Error> {
        self.send(CommandId::NotifySensorData as u8, &sample.to_bytes())
    }
}

/// Build one streamed sample. Failed reads report zero; the stream keeps
/// running.
fn build_sample<P: PowerSensor, C: Clock>(
    sensor: SensorType,
    session: &MeasurementSession<P, C>,
    cache: &TemperatureCache,
) -> SensorSample {
    let value = match sensor {
        // centi-°C
        SensorType::Temperature => cache.latest().map_or(0, |t| (t * 100.0) as i32),
        // mA → µA
        SensorType::Current => session
            .instant_reading()
            .map_or(0, |r| (r.current_ma * 1000.0) as i32),
        SensorType::Other(_) => 0,
    };
    SensorSample {
        sensor_type: sensor.as_u8(),
        timestamp: session.clock().uptime_ms() as u32,
        value,
    }
}

// ── Dispatcher ───────────────────────────────────────────────

/// Protocol dispatcher for one link.
pub struct ProtocolHandler<S: SerialPort, P: PowerSensor, C: Clock> {
    transport: Arc<Transport<S>>,
    session: Arc<MeasurementSession<P, C>>,
    notifier: Arc<Notifier<S>>,
    temperature: Arc<TemperatureCache>,
    stream: Mutex<Option<StreamHandle>>,
    subscription: Mutex<Option<SubscriptionId>>,
    stream_stop_timeout_ms: u32,
    min_stream_interval_ms: u32,
}

impl<S, P, C> ProtocolHandler<S, P, C>
where
    S: SerialPort + 'static,
    P: PowerSensor + 'static,
    C: Clock + 'static,
{
    pub fn new(
        transport: Arc<Transport<S>>,
        session: Arc<MeasurementSession<P, C>>,
        config: &LinkConfig,
    ) -> Self {
        Self {
            notifier: Arc::new(Notifier::new(Arc::clone(&transport))),
            transport,
            session,
            temperature: Arc::new(TemperatureCache::new()),
            stream: Mutex::new(None),
            subscription: Mutex::new(None),
            stream_stop_timeout_ms: config.stream_stop_timeout_ms,
            min_stream_interval_ms: config.min_stream_interval_ms.max(1),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Subscribe to the temperature topic.
    pub fn init(&self, feed: &dyn TemperatureFeed) {
        let mut sub = lock(&self.subscription);
        if sub.is_some() {
            return;
        }
        let cache = Arc::clone(&self.temperature);
        *sub = Some(feed.subscribe(Arc::new(move |u| cache.update(u))));
        info!("PROTO: handler initialised");
    }

    /// Stop streaming and unsubscribe.
    pub fn deinit(&self, feed: &dyn TemperatureFeed) {
        self.stop_stream();
        if let Some(id) = lock(&self.subscription).take() {
            feed.unsubscribe(id);
        }
        info!("PROTO: handler shut down");
    }

    pub fn session(&self) -> &Arc<MeasurementSession<P, C>> {
        &self.session
    }

    pub fn temperature(&self) -> &TemperatureCache {
        &self.temperature
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Entry point for every valid transport payload.
    pub fn handle_packet(&self, bytes: &[u8]) {
        let packet = match PacketView::parse(bytes) {
            Ok(p) => p,
            Err(e) => {
                // The sequence number may be garbage too; don't answer.
                warn!("PROTO: dropping packet: {}", e);
                return;
            }
        };

        let header = packet.header;
        if PacketType::from_u8(header.packet_type) != Some(PacketType::Cmd) {
            warn!("PROTO: unexpected packet type 0x{:02X}", header.packet_type);
            return;
        }

        let (status, payload) = match CommandId::from_u8(header.cmd_id) {
            None | Some(CommandId::NotifySensorData) => {
                warn!("PROTO: unknown command 0x{:02X}", header.cmd_id);
                (RespStatus::InvalidCmd, empty())
            }
            Some(cmd) if packet.payload.len() < cmd.min_request_len() => {
                warn!(
                    "PROTO: {:?} payload {} < {} bytes",
                    cmd,
                    packet.payload.len(),
                    cmd.min_request_len()
                );
                (RespStatus::InvalidParam, empty())
            }
            Some(cmd) => {
                debug!("PROTO: {:?} seq={}", cmd, header.seq);
                self.dispatch(cmd, packet.payload)
            }
        };

        if let Err(e) = self.send_response(header.cmd_id, header.seq, status, &payload) {
            warn!("PROTO: response to 0x{:02X} failed: {}", header.cmd_id, e);
        }
    }

    fn dispatch(&self, cmd: CommandId, payload: &[u8]) -> (RespStatus, Reply) {
        match cmd {
            CommandId::GetStatus => self.cmd_get_status(),
            CommandId::SetRtc => self.cmd_set_rtc(payload),
            CommandId::StartMeasurement => self.cmd_start_measurement(payload),
            CommandId::StopMeasurement => {
                self.stop_stream();
                (RespStatus::Ok, empty())
            }
            CommandId::GetBufferData => self.cmd_get_buffer_data(payload),
            CommandId::ClearBuffer => {
                self.session.clear();
                (RespStatus::Ok, empty())
            }
            CommandId::GetConfig => self.cmd_get_config(),
            CommandId::SetConfig => self.cmd_set_config(payload),
            CommandId::NotifySensorData => (RespStatus::InvalidCmd, empty()),
        }
    }

    fn cmd_get_status(&self) -> (RespStatus, Reply) {
        let status = self.session.status();
        let stats = self.session.stats();
        let resp = StatusResponse {
            state: status as u8,
            error_code: 0,
            buffer_count: stats.samples_captured.min(u32::from(u16::MAX)) as u16,
            uptime_sec: (self.session.clock().uptime_ms() / 1000) as u32,
        };
        (RespStatus::Ok, reply(&resp.to_bytes()))
    }

    fn cmd_set_rtc(&self, payload: &[u8]) -> (RespStatus, Reply) {
        let Some(req) = SetRtcRequest::from_bytes(payload) else {
            return (RespStatus::InvalidParam, empty());
        };
        match self.session.clock().set_rtc(req.unix_time) {
            Ok(()) => {
                info!("PROTO: RTC set to {}", req.unix_time);
                (RespStatus::Ok, empty())
            }
            Err(e) => {
                warn!("PROTO: RTC set failed: {}", e);
                (RespStatus::Error, empty())
            }
        }
    }

    fn cmd_start_measurement(&self, payload: &[u8]) -> (RespStatus, Reply) {
        let Some(req) = StartStreamRequest::from_bytes(payload) else {
            return (RespStatus::InvalidParam, empty());
        };
        match self.start_stream(req.sensor_type, req.interval_ms) {
            Ok(()) => (RespStatus::Ok, empty()),
            Err(e) => {
                warn!("PROTO: stream start failed: {}", e);
                (RespStatus::Error, empty())
            }
        }
    }

    fn cmd_get_buffer_data(&self, payload: &[u8]) -> (RespStatus, Reply) {
        if let Some(req) = GetBufferDataRequest::from_bytes(payload) {
            debug!(
                "PROTO: buffer data start={} count={} (not served)",
                req.start_index, req.count
            );
        }
        (RespStatus::NoData, empty())
    }

    fn cmd_get_config(&self) -> (RespStatus, Reply) {
        let status = self.session.status();
        let stats = self.session.stats();
        let config = self.session.config();
        let resp = SessionConfigResponse {
            status: status as u8,
            progress_percent: stats.progress_percent,
            sample_period_ms: stats.sample_period_ms as u16,
            duration_sec: config.map_or(0, |c| c.duration_sec),
            samples_captured: stats.samples_captured,
            buffer_overruns: stats.buffer_overruns,
        };
        (RespStatus::Ok, reply(&resp.to_bytes()))
    }

    fn cmd_set_config(&self, payload: &[u8]) -> (RespStatus, Reply) {
        let Some(req) = SessionConfigRequest::from_bytes(payload) else {
            return (RespStatus::InvalidParam, empty());
        };
        let result = SessionConfig::from_raw(req.duration_sec, u32::from(req.sample_period_ms))
            .and_then(|cfg| self.session.restart(cfg));
        match result {
            Ok(()) => (RespStatus::Ok, empty()),
            Err(SessionError::Sensor(e)) => {
                warn!("PROTO: session start failed: {}", e);
                (RespStatus::Error, empty())
            }
            Err(SessionError::AlreadyRunning) => (RespStatus::Busy, empty()),
            Err(e) => {
                warn!("PROTO: session config rejected: {}", e);
                (RespStatus::InvalidParam, empty())
            }
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Send a RESP echoing `cmd_id`/`seq`.
    pub fn send_response(
        &self,
        cmd_id: u8,
        seq: u8,
        status: RespStatus,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut buf = [0u8; MAX_PACKET_LEN];
        let len = encode_packet(PacketType::Resp, cmd_id, seq, status as u8, payload, &mut buf)?;
        self.transport.send_packet_async(&buf[..len])?;
        Ok(())
    }

    /// Send an unsolicited NOTIFY.
    pub fn send_notify(&self, cmd_id: u8, payload: &[u8]) -> Result<(), Error> {
        self.notifier.send(cmd_id, payload)
    }

    pub fn send_sensor_sample(&self, sample: &SensorSample) -> Result<(), Error> {
        self.notifier.send_sample(sample)
    }

    // ── Streaming ─────────────────────────────────────────────

    /// Start streaming `sensor` every `interval_ms`, replacing any
    /// existing stream.
    pub fn start_stream(&self, sensor: SensorType, interval_ms: u32) -> Result<(), Error> {
        let mut slot = lock(&self.stream);
        if let Some(old) = slot.take() {
            old.stop(self.stream_stop_timeout_ms);
        }

        let interval_ms = interval_ms.max(self.min_stream_interval_ms);
        let notifier = Arc::clone(&self.notifier);
        let session = Arc::clone(&self.session);
        let cache = Arc::clone(&self.temperature);

        let handle = stream::spawn(interval_ms, move || {
            let sample = build_sample(sensor, &session, &cache);
            if let Err(e) = notifier.send_sample(&sample) {
                debug!("PROTO: sample dropped: {}", e);
            }
        })?;

        *slot = Some(handle);
        info!(
            "PROTO: streaming sensor {} @ {}ms",
            sensor.as_u8(),
            interval_ms
        );
        Ok(())
    }

    /// Stop the active stream, if any. Returns `false` if the task did
    /// not acknowledge within the stop timeout.
    pub fn stop_stream(&self) -> bool {
        let Some(handle) = lock(&self.stream).take() else {
            return true;
        };
        let acked = handle.stop(self.stream_stop_timeout_ms);
        self.session.release_sensor();
        info!("PROTO: streaming stopped");
        acked
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.stream).as_ref().is_some_and(StreamHandle::is_active)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
