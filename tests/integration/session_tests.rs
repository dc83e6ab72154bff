//! Measurement session scenarios driven the way the firmware drives them:
//! interrupt → `on_data_ready`, task loop → `process`.

use powerbridge::app::ports::Clock;
use powerbridge::measurement::{
    CurrentSample, MeasurementSession, MeasurementStatus, SamplePeriod, SessionConfig,
};

use crate::mock_hw::{ManualClock, MockSensor};

fn session() -> (MeasurementSession<MockSensor, ManualClock>, MockSensor, ManualClock) {
    let sensor = MockSensor::new();
    let clock = ManualClock::at(5_000);
    let s = MeasurementSession::new(sensor.clone(), clock.clone());
    (s, sensor, clock)
}

fn tick(s: &MeasurementSession<MockSensor, ManualClock>, clock: &ManualClock, ms: u64) {
    clock.advance(ms);
    s.on_data_ready();
    s.process();
}

#[test]
fn full_session_runs_to_completion() {
    let (s, sensor, clock) = session();
    sensor.set_reading(250.0, 3.3);
    clock.set_rtc(1_700_000_000).unwrap();

    s.start(SessionConfig::from_raw(1, 100).unwrap()).unwrap();
    assert_eq!(s.status(), MeasurementStatus::Running);

    for _ in 0..10 {
        tick(&s, &clock, 100);
    }
    assert_eq!(s.status(), MeasurementStatus::Complete);
    assert!(!sensor.log.lock().unwrap().open, "sensor closed on completion");

    let mut out = [CurrentSample::default(); 16];
    let n = s.read_measurement(&mut out);
    assert_eq!(n, 10);
    assert_eq!(out[0].timestamp_sec, 1_700_000_000);
    assert_eq!(out[0].timestamp_ms, 100);
    assert_eq!(out[9].timestamp_sec, 1_700_000_001);
    assert_eq!(out[9].timestamp_ms, 0);
    assert!((out[4].current_ma - 250.0).abs() < f32::EPSILON);

    let stats = s.stats();
    assert_eq!(stats.samples_captured, 10);
    assert_eq!(stats.progress_percent, 100);
    assert!((stats.actual_sample_rate_hz - 10.0).abs() < 0.01);
}

#[test]
fn stopped_session_withholds_samples() {
    let (s, _sensor, clock) = session();
    clock.advance(250);
    s.start(SessionConfig::from_raw(10, 10).unwrap()).unwrap();
    tick(&s, &clock, 800);
    tick(&s, &clock, 10);
    s.stop();

    // Only complete sessions hand out data.
    let mut out = [CurrentSample::default(); 4];
    assert_eq!(s.read_measurement(&mut out), 0);
    assert_eq!(s.stats().samples_captured, 2);
}

#[test]
fn duration_elapses_without_samples() {
    let (s, _sensor, clock) = session();
    s.start(SessionConfig::from_raw(2, 1000).unwrap()).unwrap();
    clock.advance(1999);
    assert_eq!(s.process(), MeasurementStatus::Running);
    clock.advance(1);
    assert_eq!(s.process(), MeasurementStatus::Complete);
    assert_eq!(s.stats().samples_captured, 0);
}

#[test]
fn interrupts_after_completion_are_ignored() {
    let (s, sensor, clock) = session();
    s.start(SessionConfig {
        duration_sec: 1,
        sample_period: SamplePeriod::Ms1000,
    })
    .unwrap();

    // max_samples = 1; the first capture completes the session.
    tick(&s, &clock, 1);
    assert_eq!(s.status(), MeasurementStatus::Complete);
    tick(&s, &clock, 1);
    assert_eq!(s.stats().samples_captured, 1);
    assert_eq!(sensor.log.lock().unwrap().reads, 1);
}

#[test]
fn coalesced_interrupts_capture_once() {
    let (s, _sensor, clock) = session();
    s.start(SessionConfig::from_raw(10, 100).unwrap()).unwrap();
    clock.advance(100);
    s.on_data_ready();
    s.on_data_ready();
    s.on_data_ready();
    s.process();
    s.process();
    let stats = s.stats();
    assert_eq!(stats.samples_captured, 1);
    assert_eq!(stats.missed_interrupts, 2);
    assert_eq!(stats.buffer_overruns, 0);

    // A fresh session starts with a clean count.
    s.restart(SessionConfig::from_raw(10, 100).unwrap()).unwrap();
    assert_eq!(s.stats().missed_interrupts, 0);
}

#[test]
fn stray_stop_keeps_completed_capture() {
    let (s, _sensor, clock) = session();
    s.start(SessionConfig::from_raw(1, 1000).unwrap()).unwrap();
    tick(&s, &clock, 1000);
    assert_eq!(s.status(), MeasurementStatus::Complete);

    s.stop();
    assert_eq!(s.status(), MeasurementStatus::Complete);
    let mut out = [CurrentSample::default(); 2];
    assert_eq!(s.read_measurement(&mut out), 1);
}

#[test]
fn second_start_rejected_while_running() {
    let (s, _sensor, _clock) = session();
    let cfg = SessionConfig::from_raw(10, 100).unwrap();
    s.start(cfg).unwrap();
    assert!(s.start(cfg).is_err());
    s.restart(cfg).unwrap();
    assert_eq!(s.status(), MeasurementStatus::Running);
}

#[test]
fn failed_reads_skip_the_sample() {
    let (s, sensor, clock) = session();
    s.start(SessionConfig::from_raw(10, 100).unwrap()).unwrap();
    sensor.log.lock().unwrap().fail_read = true;
    tick(&s, &clock, 100);
    assert_eq!(s.stats().samples_captured, 0);
    sensor.log.lock().unwrap().fail_read = false;
    tick(&s, &clock, 100);
    assert_eq!(s.stats().samples_captured, 1);
    assert_eq!(s.status(), MeasurementStatus::Running);
}

#[test]
fn machine_state_tags_samples() {
    let (s, _sensor, clock) = session();
    s.start(SessionConfig::from_raw(1, 1000).unwrap()).unwrap();
    s.set_machine_state(4);
    tick(&s, &clock, 1000);
    let mut out = [CurrentSample::default(); 1];
    assert_eq!(s.read_measurement(&mut out), 1);
    assert_eq!(out[0].machine_state, 4);
    assert_eq!(s.clock().uptime_ms(), 6_000);
}
