//! Measurement session state machine.
//!
//! Control operations (`start`, `stop`, `clear`, completion) serialise on
//! the sensor lock. Session state sits behind a critical-section mutex so
//! status reads never observe a half-applied transition. The data-ready
//! interrupt only raises an [`IsrFlag`]; [`MeasurementSession::process`]
//! does the I2C read and append from task context.

use core::cell::RefCell;
use std::sync::{Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, warn};

use super::{
    CurrentSample, MAX_SAMPLES, MeasurementStatus, SensorProfile, SessionConfig, SessionStats,
};
use crate::app::ports::{Clock, PowerReading, PowerSensor};
use crate::error::{SensorError, SessionError};
use crate::events::IsrFlag;

struct SessionState {
    status: MeasurementStatus,
    config: Option<SessionConfig>,
    max_samples: u32,
    start_uptime_ms: u64,
    /// Wall-clock (or uptime) base for sample timestamps.
    base_sec: u32,
    base_ms: u16,
    samples: Vec<CurrentSample>,
    samples_captured: u32,
    buffer_overruns: u32,
    first_read_time_ms: u64,
    last_read_time_ms: u64,
    progress: u8,
    machine_state: u8,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: MeasurementStatus::Idle,
            config: None,
            max_samples: 0,
            start_uptime_ms: 0,
            base_sec: 0,
            base_ms: 0,
            samples: Vec::with_capacity(MAX_SAMPLES),
            samples_captured: 0,
            buffer_overruns: 0,
            first_read_time_ms: 0,
            last_read_time_ms: 0,
            progress: 0,
            machine_state: 0,
        }
    }

    fn reset_capture(&mut self) {
        self.samples.clear();
        self.samples_captured = 0;
        self.buffer_overruns = 0;
        self.first_read_time_ms = 0;
        self.last_read_time_ms = 0;
        self.progress = 0;
    }

    fn at_capacity(&self) -> bool {
        self.samples.len() >= MAX_SAMPLES || self.samples_captured >= self.max_samples
    }

    fn completion_due(&self, now_ms: u64) -> bool {
        let Some(config) = self.config else {
            return false;
        };
        self.status == MeasurementStatus::Running
            && (now_ms.saturating_sub(self.start_uptime_ms) >= u64::from(config.duration_ms())
                || self.samples_captured >= self.max_samples)
    }

    /// `base + elapsed`, carrying milliseconds into seconds.
    fn timestamp_at(&self, elapsed_ms: u64) -> (u32, u16) {
        let total_ms = u64::from(self.base_ms) + elapsed_ms;
        let sec = self.base_sec.wrapping_add((total_ms / 1000) as u32);
        (sec, (total_ms % 1000) as u16)
    }

    fn sample_rate_hz(&self) -> f32 {
        let span = self.last_read_time_ms.saturating_sub(self.first_read_time_ms);
        if self.samples_captured < 2 || span == 0 {
            return 0.0;
        }
        (self.samples_captured - 1) as f32 * 1000.0 / span as f32
    }
}

/// Timed acquisition over a [`PowerSensor`].
pub struct MeasurementSession<P: PowerSensor, C: Clock> {
    sensor: Mutex<P>,
    clock: C,
    state: BlockingMutex<CriticalSectionRawMutex, RefCell<SessionState>>,
    data_ready: IsrFlag,
}

impl<P: PowerSensor, C: Clock> MeasurementSession<P, C> {
    pub fn new(sensor: P, clock: C) -> Self {
        Self {
            sensor: Mutex::new(sensor),
            clock,
            state: BlockingMutex::new(RefCell::new(SessionState::new())),
            data_ready: IsrFlag::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Control ───────────────────────────────────────────────

    /// Start a session. Rejected without any state change if `config` is
    /// out of bounds or a session is already running.
    pub fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        let max_samples = config.validate()?;

        let mut sensor = self.lock_sensor();
        if self.read_state(|s| s.status) == MeasurementStatus::Running {
            warn!("MEAS: start rejected, session already running");
            return Err(SessionError::AlreadyRunning);
        }

        self.data_ready.reset();
        self.with_state(|s| {
            s.reset_capture();
            s.config = Some(config);
            s.max_samples = max_samples;
        });

        if let Err(e) = sensor.open(&SensorProfile::for_period(config.sample_period)) {
            error!("MEAS: sensor open failed: {}", e);
            self.with_state(|s| s.status = MeasurementStatus::Error);
            return Err(e.into());
        }

        let now = self.clock.uptime_ms();
        let (base_sec, base_ms) = match self.clock.rtc_now() {
            Some(unix) => (unix, 0),
            None => ((now / 1000) as u32, (now % 1000) as u16),
        };

        self.with_state(|s| {
            s.start_uptime_ms = now;
            s.base_sec = base_sec;
            s.base_ms = base_ms;
            s.status = MeasurementStatus::Running;
        });

        info!(
            "MEAS: started {}s @ {}ms ({} samples)",
            config.duration_sec,
            config.sample_period.as_ms(),
            max_samples
        );
        Ok(())
    }

    /// Stop whatever is running, then start `config`.
    pub fn restart(&self, config: SessionConfig) -> Result<(), SessionError> {
        config.validate()?;
        if self.read_state(|s| s.status) == MeasurementStatus::Running {
            self.stop();
        }
        self.start(config)
    }

    /// Abort a RUNNING session: close the sensor and return to IDLE
    /// regardless of progress. Any other status is left alone, so a
    /// COMPLETE capture stays readable.
    pub fn stop(&self) {
        let mut sensor = self.lock_sensor();
        let stopped = self.with_state(|s| {
            if s.status != MeasurementStatus::Running {
                return false;
            }
            s.status = MeasurementStatus::Idle;
            true
        });
        if stopped {
            sensor.close();
            self.data_ready.clear();
            info!("MEAS: stopped");
        }
    }

    /// Stop and drop all captured samples.
    pub fn clear(&self) {
        let mut sensor = self.lock_sensor();
        sensor.close();
        self.data_ready.reset();
        self.with_state(|s| {
            s.reset_capture();
            s.status = MeasurementStatus::Idle;
        });
        info!("MEAS: cleared");
    }

    // ── Data-ready path ───────────────────────────────────────

    /// Conversion-ready interrupt entry. Lock-free; only raises a flag.
    pub fn on_data_ready(&self) {
        self.data_ready.raise();
    }

    /// Deferred handler: capture a pending sample, then run the
    /// completion check. Call from the measurement task.
    pub fn process(&self) -> MeasurementStatus {
        if self.data_ready.take() {
            self.capture_sample();
        }
        self.check_completion()
    }

    fn capture_sample(&self) {
        let room = self.with_state(|s| {
            if s.status != MeasurementStatus::Running {
                return false;
            }
            if s.at_capacity() {
                // Bounded capture; never overwrite.
                s.buffer_overruns += 1;
                return false;
            }
            true
        });
        if !room {
            return;
        }

        let reading = match self.lock_sensor().read() {
            Ok(r) => r,
            Err(e) => {
                warn!("MEAS: sample read failed: {}", e);
                return;
            }
        };
        let now = self.clock.uptime_ms();

        self.with_state(|s| {
            // A stop may have landed during the read.
            if s.status != MeasurementStatus::Running || s.at_capacity() {
                return;
            }
            let (timestamp_sec, timestamp_ms) =
                s.timestamp_at(now.saturating_sub(s.start_uptime_ms));
            s.samples.push(CurrentSample {
                timestamp_sec,
                timestamp_ms,
                machine_state: s.machine_state,
                current_ma: reading.current_ma,
                voltage_v: reading.voltage_v,
                power_mw: reading.power_mw,
            });
            if s.samples_captured == 0 {
                s.first_read_time_ms = now;
            }
            s.samples_captured += 1;
            s.last_read_time_ms = now;
            s.progress = (u64::from(s.samples_captured) * 100 / u64::from(s.max_samples.max(1)))
                .min(100) as u8;
        });
    }

    fn check_completion(&self) -> MeasurementStatus {
        let now = self.clock.uptime_ms();
        if self.read_state(|s| s.completion_due(now)) {
            let mut sensor = self.lock_sensor();
            let completed = self.with_state(|s| {
                if !s.completion_due(now) {
                    return false;
                }
                s.status = MeasurementStatus::Complete;
                s.progress = 100;
                true
            });
            if completed {
                sensor.close();
                info!(
                    "MEAS: complete, {} samples",
                    self.read_state(|s| s.samples_captured)
                );
            }
        }
        self.read_state(|s| s.status)
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current status, after running the completion check.
    pub fn status(&self) -> MeasurementStatus {
        self.check_completion()
    }

    /// Copy captured samples into `out`. Only a COMPLETE session yields
    /// data; any other status reads zero samples.
    pub fn read_measurement(&self, out: &mut [CurrentSample]) -> usize {
        if self.status() != MeasurementStatus::Complete {
            return 0;
        }
        self.read_state(|s| {
            let n = out.len().min(s.samples.len());
            out[..n].copy_from_slice(&s.samples[..n]);
            n
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.read_state(|s| SessionStats {
            samples_captured: s.samples_captured,
            buffer_overruns: s.buffer_overruns,
            missed_interrupts: self.data_ready.coalesced(),
            last_read_time_ms: s.last_read_time_ms,
            buffer_full: s.max_samples > 0 && s.at_capacity(),
            sample_period_ms: s.config.map_or(0, |c| c.sample_period.as_ms()),
            actual_sample_rate_hz: s.sample_rate_hz(),
            status: s.status,
            progress_percent: s.progress,
        })
    }

    /// Configuration of the current (or last) session.
    pub fn config(&self) -> Option<SessionConfig> {
        self.read_state(|s| s.config)
    }

    /// One reading outside the sampling path, opening the sensor with the
    /// instant profile if no session holds it open.
    pub fn instant_reading(&self) -> Result<PowerReading, SensorError> {
        let mut sensor = self.lock_sensor();
        if !sensor.is_open() {
            sensor.open(&SensorProfile::instant())?;
        }
        sensor.read()
    }

    /// Power the sensor down unless a session is sampling. Pairs with
    /// [`instant_reading`](Self::instant_reading) once on-demand reads end.
    pub fn release_sensor(&self) {
        let mut sensor = self.lock_sensor();
        if self.read_state(|s| s.status) == MeasurementStatus::Running {
            return;
        }
        if sensor.is_open() {
            sensor.close();
            debug!("MEAS: sensor released");
        }
    }

    /// Tag stored in every subsequent sample.
    pub fn set_machine_state(&self, state: u8) {
        self.with_state(|s| s.machine_state = state);
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock_sensor(&self) -> MutexGuard<'_, P> {
        self.sensor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn read_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        self.state.lock(|cell| f(&cell.borrow()))
    }
}
