//! Dispatcher tests: full CMD → RESP round trips over a mock UART.

use std::sync::Arc;
use std::time::Duration;

use powerbridge::adapters::event_bus::TemperatureBus;
use powerbridge::app::ports::{Clock, TemperatureUpdate};
use powerbridge::link::transport::{RxPump, Transport};
use powerbridge::measurement::{MeasurementSession, MeasurementStatus, SamplePeriod, SensorProfile};
use powerbridge::protocol::ProtocolHandler;
use powerbridge::protocol::packet::{
    PacketType, RespStatus, SensorSample, SessionConfigRequest, SessionConfigResponse,
    StartStreamRequest, StatusResponse, SensorType, encode_packet, MAX_PACKET_LEN,
};
use powerbridge::link::codec::{encode_frame, MAX_PACKET_SIZE};

use crate::mock_hw::{
    cmd_frame, fast_config, mock_link, parse_sent, ManualClock, MockSensor, MockSerial, Sent,
};

const GET_BUFFER_DATA: u8 = 0x01;
const START_MEASUREMENT: u8 = 0x02;
const STOP_MEASUREMENT: u8 = 0x03;
const SET_RTC: u8 = 0x04;
const GET_STATUS: u8 = 0x05;
const CLEAR_BUFFER: u8 = 0x06;
const GET_CONFIG: u8 = 0x07;
const SET_CONFIG: u8 = 0x08;
const NOTIFY_SENSOR_DATA: u8 = 0x80;

type Handler = ProtocolHandler<MockSerial, MockSensor, ManualClock>;

struct Rig {
    transport: Arc<Transport<MockSerial>>,
    pump: RxPump<MockSerial>,
    handler: Handler,
    session: Arc<MeasurementSession<MockSensor, ManualClock>>,
    sensor: MockSensor,
    clock: ManualClock,
    bus: TemperatureBus,
}

impl Rig {
    fn new() -> Self {
        let cfg = fast_config();
        let (transport, pump) = mock_link(&cfg);
        let sensor = MockSensor::new();
        let clock = ManualClock::at(12_345);
        let session = Arc::new(MeasurementSession::new(sensor.clone(), clock.clone()));
        let handler = ProtocolHandler::new(Arc::clone(&transport), Arc::clone(&session), &cfg);
        let bus = TemperatureBus::new();
        handler.init(&bus);
        Self {
            transport,
            pump,
            handler,
            session,
            sensor,
            clock,
            bus,
        }
    }

    fn inject(&mut self, bytes: &[u8]) {
        self.transport.serial().inject(bytes);
        let now = self.clock.uptime_ms();
        let handler = &self.handler;
        self.pump.poll(now, |p| handler.handle_packet(p));
    }

    fn command(&mut self, cmd_id: u8, seq: u8, payload: &[u8]) -> Sent {
        self.transport.serial().clear_written();
        self.inject(&cmd_frame(cmd_id, seq, payload));
        let mut resps = self.responses();
        assert_eq!(resps.len(), 1, "exactly one RESP per CMD");
        resps.remove(0)
    }

    fn responses(&self) -> Vec<Sent> {
        parse_sent(self.transport.serial())
            .into_iter()
            .filter(|s| s.packet_type == PacketType::Resp as u8)
            .collect()
    }

    fn notifies(&self) -> Vec<Sent> {
        parse_sent(self.transport.serial())
            .into_iter()
            .filter(|s| s.packet_type == PacketType::Notify as u8)
            .collect()
    }
}

fn set_config(duration_sec: u32, period_ms: u16) -> Vec<u8> {
    SessionConfigRequest {
        duration_sec,
        sample_period_ms: period_ms,
    }
    .to_bytes()
    .to_vec()
}

fn start_stream(sensor: u8, interval_ms: u32) -> Vec<u8> {
    StartStreamRequest {
        sensor_type: SensorType::from_u8(sensor),
        interval_ms,
    }
    .to_bytes()
    .to_vec()
}

// ── Basic commands ────────────────────────────────────────────

#[test]
fn get_status_echoes_cmd_and_seq() {
    let mut rig = Rig::new();
    let resp = rig.command(GET_STATUS, 7, &[]);

    assert_eq!(resp.cmd_id, GET_STATUS);
    assert_eq!(resp.seq, 7);
    assert_eq!(resp.status, RespStatus::Ok as u8);

    let status = StatusResponse::from_bytes(&resp.payload).unwrap();
    assert_eq!(status.state, MeasurementStatus::Idle as u8);
    assert_eq!(status.error_code, 0);
    assert_eq!(status.buffer_count, 0);
    assert_eq!(status.uptime_sec, 12);
}

#[test]
fn unknown_command_is_invalid_cmd() {
    let mut rig = Rig::new();
    let resp = rig.command(0x7F, 3, &[]);
    assert_eq!(resp.cmd_id, 0x7F);
    assert_eq!(resp.seq, 3);
    assert_eq!(resp.status, RespStatus::InvalidCmd as u8);
    assert!(resp.payload.is_empty());
}

#[test]
fn notify_id_as_command_is_invalid_cmd() {
    let mut rig = Rig::new();
    let resp = rig.command(NOTIFY_SENSOR_DATA, 1, &[]);
    assert_eq!(resp.status, RespStatus::InvalidCmd as u8);
}

#[test]
fn short_payloads_are_invalid_param() {
    let mut rig = Rig::new();
    for (cmd, len) in [
        (SET_RTC, 3),
        (START_MEASUREMENT, 4),
        (SET_CONFIG, 5),
        (GET_BUFFER_DATA, 7),
    ] {
        let resp = rig.command(cmd, 9, &vec![0u8; len]);
        assert_eq!(resp.status, RespStatus::InvalidParam as u8, "cmd 0x{cmd:02X}");
    }
    assert!(!rig.handler.is_streaming());
    assert_eq!(rig.session.status(), MeasurementStatus::Idle);
}

#[test]
fn non_command_packets_are_dropped() {
    let mut rig = Rig::new();
    for packet_type in [PacketType::Resp, PacketType::Notify] {
        let mut packet = [0u8; MAX_PACKET_LEN];
        let len = encode_packet(packet_type, GET_STATUS, 1, 0, &[], &mut packet).unwrap();
        let mut frame = [0u8; MAX_PACKET_SIZE];
        let n = encode_frame(&packet[..len], &mut frame).unwrap();
        rig.inject(&frame[..n]);
    }
    assert!(rig.transport.serial().sent_payloads().is_empty());
}

#[test]
fn malformed_packet_is_dropped() {
    let mut rig = Rig::new();
    // Header declares 10 payload bytes, frame carries 2.
    let packet = [0x01, GET_STATUS, 1, 0, 10, 0, 0xAA, 0xBB];
    let mut frame = [0u8; MAX_PACKET_SIZE];
    let n = encode_frame(&packet, &mut frame).unwrap();
    rig.inject(&frame[..n]);

    // Too short for a header at all.
    let n = encode_frame(&[0x01, 0x05], &mut frame).unwrap();
    rig.inject(&frame[..n]);

    assert!(rig.transport.serial().sent_payloads().is_empty());
}

#[test]
fn packet_over_protocol_limit_is_dropped() {
    let mut rig = Rig::new();
    // 300-byte payload: fits a frame, not a protocol packet.
    let mut packet = vec![0x01, GET_STATUS, 1, 0, 0x2C, 0x01];
    packet.resize(6 + 300, 0);
    let mut frame = [0u8; MAX_PACKET_SIZE];
    let n = encode_frame(&packet, &mut frame).unwrap();
    rig.inject(&frame[..n]);

    assert!(rig.transport.serial().sent_payloads().is_empty());
}

#[test]
fn set_rtc_updates_clock() {
    let mut rig = Rig::new();
    let resp = rig.command(SET_RTC, 4, &1_700_000_000u32.to_le_bytes());
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert_eq!(rig.clock.rtc_now(), Some(1_700_000_000));

    let rejected = rig.command(SET_RTC, 5, &0u32.to_le_bytes());
    assert_eq!(rejected.status, RespStatus::Error as u8);
}

#[test]
fn get_buffer_data_has_no_data() {
    let mut rig = Rig::new();
    let mut req = 0u32.to_le_bytes().to_vec();
    req.extend_from_slice(&16u32.to_le_bytes());
    let resp = rig.command(GET_BUFFER_DATA, 2, &req);
    assert_eq!(resp.status, RespStatus::NoData as u8);
    assert!(resp.payload.is_empty());
}

// ── Session commands ──────────────────────────────────────────

#[test]
fn set_config_starts_session() {
    let mut rig = Rig::new();
    let resp = rig.command(SET_CONFIG, 1, &set_config(10, 100));
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert_eq!(rig.session.status(), MeasurementStatus::Running);

    let log = rig.sensor.log.lock().unwrap();
    assert_eq!(
        log.last_profile,
        Some(SensorProfile::for_period(SamplePeriod::Ms100))
    );
}

#[test]
fn set_config_while_running_restarts() {
    let mut rig = Rig::new();
    rig.command(SET_CONFIG, 1, &set_config(10, 100));
    let resp = rig.command(SET_CONFIG, 2, &set_config(5, 10));
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert_eq!(rig.session.config().unwrap().sample_period, SamplePeriod::Ms10);
    assert_eq!(rig.sensor.log.lock().unwrap().opens, 2);
}

#[test]
fn set_config_rejects_bad_parameters() {
    let mut rig = Rig::new();
    for payload in [
        set_config(10, 50),
        set_config(0, 100),
        set_config(3601, 1000),
        // 10 000 samples exceed storage
        set_config(10, 1),
    ] {
        let resp = rig.command(SET_CONFIG, 1, &payload);
        assert_eq!(resp.status, RespStatus::InvalidParam as u8);
    }
    assert_eq!(rig.session.status(), MeasurementStatus::Idle);
    assert_eq!(rig.sensor.log.lock().unwrap().opens, 0);
}

#[test]
fn set_config_sensor_failure_is_error() {
    let mut rig = Rig::new();
    rig.sensor.log.lock().unwrap().fail_open = true;
    let resp = rig.command(SET_CONFIG, 1, &set_config(10, 100));
    assert_eq!(resp.status, RespStatus::Error as u8);
    assert_eq!(rig.session.status(), MeasurementStatus::Error);
}

#[test]
fn get_config_reports_progress() {
    let mut rig = Rig::new();
    rig.command(SET_CONFIG, 1, &set_config(1, 100));
    for _ in 0..5 {
        rig.clock.advance(100);
        rig.session.on_data_ready();
        rig.session.process();
    }

    let resp = rig.command(GET_CONFIG, 2, &[]);
    assert_eq!(resp.status, RespStatus::Ok as u8);
    let cfg = SessionConfigResponse::from_bytes(&resp.payload).unwrap();
    assert_eq!(cfg.status, MeasurementStatus::Running as u8);
    assert_eq!(cfg.sample_period_ms, 100);
    assert_eq!(cfg.duration_sec, 1);
    assert_eq!(cfg.samples_captured, 5);
    assert_eq!(cfg.progress_percent, 50);
    assert_eq!(cfg.buffer_overruns, 0);

    let status = StatusResponse::from_bytes(&rig.command(GET_STATUS, 3, &[]).payload).unwrap();
    assert_eq!(status.buffer_count, 5);
}

#[test]
fn clear_buffer_resets_session() {
    let mut rig = Rig::new();
    rig.command(SET_CONFIG, 1, &set_config(10, 100));
    rig.session.on_data_ready();
    rig.session.process();
    assert_eq!(rig.session.stats().samples_captured, 1);

    let resp = rig.command(CLEAR_BUFFER, 2, &[]);
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert_eq!(rig.session.status(), MeasurementStatus::Idle);
    assert_eq!(rig.session.stats().samples_captured, 0);
}

// ── Streaming ─────────────────────────────────────────────────

#[test]
fn current_stream_sends_notifies_until_stopped() {
    let mut rig = Rig::new();
    rig.sensor.set_reading(12.5, 5.0);

    let resp = rig.command(START_MEASUREMENT, 10, &start_stream(0x02, 10));
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert!(rig.handler.is_streaming());

    std::thread::sleep(Duration::from_millis(120));
    assert!(rig.notifies().len() >= 3);

    let resp = rig.command(STOP_MEASUREMENT, 11, &[]);
    assert_eq!(resp.status, RespStatus::Ok as u8);
    assert!(!rig.handler.is_streaming());

    rig.transport.serial().clear_written();
    std::thread::sleep(Duration::from_millis(50));
    assert!(rig.notifies().is_empty(), "no NOTIFY after stop");
}

#[test]
fn current_stream_releases_sensor_on_stop() {
    let mut rig = Rig::new();
    rig.command(START_MEASUREMENT, 1, &start_stream(0x02, 5));
    std::thread::sleep(Duration::from_millis(30));
    assert!(rig.sensor.log.lock().unwrap().open);

    rig.command(STOP_MEASUREMENT, 2, &[]);
    assert!(!rig.sensor.log.lock().unwrap().open);
}

#[test]
fn stream_stop_leaves_running_session_sampling() {
    let mut rig = Rig::new();
    rig.command(SET_CONFIG, 1, &set_config(10, 100));
    rig.command(START_MEASUREMENT, 2, &start_stream(0x02, 5));
    std::thread::sleep(Duration::from_millis(20));

    rig.command(STOP_MEASUREMENT, 3, &[]);
    assert_eq!(rig.session.status(), MeasurementStatus::Running);
    assert!(rig.sensor.log.lock().unwrap().open);
}

#[test]
fn stream_samples_carry_scaled_values_and_own_sequence() {
    let mut rig = Rig::new();
    rig.sensor.set_reading(12.5, 5.0);

    rig.transport.serial().clear_written();
    rig.inject(&cmd_frame(START_MEASUREMENT, 200, &start_stream(0x02, 5)));
    std::thread::sleep(Duration::from_millis(80));
    assert!(rig.handler.stop_stream());

    let notes = rig.notifies();
    assert!(notes.len() >= 3, "only {} notifies", notes.len());
    for (i, n) in notes.iter().enumerate() {
        assert_eq!(n.cmd_id, NOTIFY_SENSOR_DATA);
        assert_eq!(n.status, 0);
        assert_eq!(n.seq, i as u8);
        let sample = SensorSample::from_bytes(&n.payload).unwrap();
        assert_eq!(sample.sensor_type, 0x02);
        assert_eq!(sample.value, 12_500);
        assert_eq!(sample.timestamp, 12_345);
    }

    let resps = rig.responses();
    assert_eq!(resps.len(), 1);
    assert_eq!(resps[0].seq, 200);
}

#[test]
fn temperature_stream_uses_latest_bus_value() {
    let mut rig = Rig::new();
    rig.bus.publish(&TemperatureUpdate {
        temperature: 25.5,
        humidity: 40.0,
        sensor_ok: true,
    });

    rig.transport.serial().clear_written();
    rig.inject(&cmd_frame(START_MEASUREMENT, 1, &start_stream(0x01, 5)));
    std::thread::sleep(Duration::from_millis(40));
    rig.handler.stop_stream();

    let notes = rig.notifies();
    assert!(!notes.is_empty());
    let sample = SensorSample::from_bytes(&notes[0].payload).unwrap();
    assert_eq!(sample.sensor_type, 0x01);
    assert_eq!(sample.value, 2550);
}

#[test]
fn stream_reports_zero_without_data() {
    let mut rig = Rig::new();
    rig.sensor.log.lock().unwrap().fail_open = true;

    for sensor in [0x01, 0x02, 0x09] {
        rig.transport.serial().clear_written();
        rig.inject(&cmd_frame(START_MEASUREMENT, 1, &start_stream(sensor, 5)));
        std::thread::sleep(Duration::from_millis(30));
        rig.handler.stop_stream();

        let notes = rig.notifies();
        assert!(!notes.is_empty(), "sensor 0x{sensor:02X}");
        let sample = SensorSample::from_bytes(&notes[0].payload).unwrap();
        assert_eq!(sample.sensor_type, sensor);
        assert_eq!(sample.value, 0);
    }
}

#[test]
fn restarting_stream_replaces_previous() {
    let mut rig = Rig::new();
    rig.command(START_MEASUREMENT, 1, &start_stream(0x02, 1000));
    rig.command(START_MEASUREMENT, 2, &start_stream(0x02, 20));
    assert!(rig.handler.is_streaming());
    assert!(rig.handler.stop_stream());
    assert!(!rig.handler.is_streaming());
    // Stopping twice is harmless.
    assert!(rig.handler.stop_stream());
}

#[test]
fn deinit_stops_stream_and_unsubscribes() {
    let mut rig = Rig::new();
    assert_eq!(rig.bus.subscriber_count(), 1);
    rig.command(START_MEASUREMENT, 1, &start_stream(0x02, 10));

    rig.handler.deinit(&rig.bus);
    assert!(!rig.handler.is_streaming());
    assert_eq!(rig.bus.subscriber_count(), 0);
}
