//! Timed current/voltage/power acquisition.
//!
//! A session captures at most `duration / period` samples into bounded,
//! pre-sized storage, driven by the power sensor's conversion-ready
//! interrupt. State machine:
//!
//! ```text
//!          start()                 elapsed ≥ duration
//!  IDLE ───────────▶ RUNNING ─────────────────────────▶ COMPLETE
//!   ▲                  │  │       or max_samples hit        │
//!   │      stop()      │  │ sensor open failure             │
//!   ├──────────────────┘  └────────────▶ ERROR              │
//!   └──────────────── clear() / stop() ◀──────────┴─────────┘
//! ```

pub mod profile;
pub mod session;

pub use profile::{Averaging, ConversionTime, OperatingMode, SensorProfile};
pub use session::MeasurementSession;

use crate::error::SessionError;

/// Sample storage capacity.
pub const MAX_SAMPLES: usize = 4096;

/// Shortest session, seconds.
pub const MIN_DURATION_SEC: u32 = 1;

/// Longest session, seconds.
pub const MAX_DURATION_SEC: u32 = 3600;

/// Session state as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MeasurementStatus {
    #[default]
    Idle = 0,
    Running = 1,
    Complete = 2,
    Error = 3,
}

/// Supported sample periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePeriod {
    Ms1,
    Ms10,
    Ms100,
    Ms1000,
}

impl SamplePeriod {
    pub fn from_ms(ms: u32) -> Option<Self> {
        match ms {
            1 => Some(Self::Ms1),
            10 => Some(Self::Ms10),
            100 => Some(Self::Ms100),
            1000 => Some(Self::Ms1000),
            _ => None,
        }
    }

    pub const fn as_ms(self) -> u32 {
        match self {
            Self::Ms1 => 1,
            Self::Ms10 => 10,
            Self::Ms100 => 100,
            Self::Ms1000 => 1000,
        }
    }
}

/// Requested session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub duration_sec: u32,
    pub sample_period: SamplePeriod,
}

impl SessionConfig {
    /// Build from raw wire values, rejecting unsupported periods.
    pub fn from_raw(duration_sec: u32, sample_period_ms: u32) -> Result<Self, SessionError> {
        let sample_period = SamplePeriod::from_ms(sample_period_ms)
            .ok_or(SessionError::InvalidPeriod(sample_period_ms))?;
        let config = Self {
            duration_sec,
            sample_period,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check bounds; returns the number of samples the session will take.
    pub fn validate(&self) -> Result<u32, SessionError> {
        if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&self.duration_sec) {
            return Err(SessionError::InvalidDuration(self.duration_sec));
        }
        let max_samples = self.duration_ms() / self.sample_period.as_ms();
        if max_samples as usize > MAX_SAMPLES {
            return Err(SessionError::TooManySamples(max_samples));
        }
        Ok(max_samples)
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_sec * 1000
    }
}

/// One captured sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurrentSample {
    pub timestamp_sec: u32,
    /// Millisecond part, 0..=999.
    pub timestamp_ms: u16,
    /// Caller-supplied machine state tag at capture time.
    pub machine_state: u8,
    pub current_ma: f32,
    pub voltage_v: f32,
    pub power_mw: f32,
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    pub samples_captured: u32,
    /// Data-ready events dropped because storage or `max_samples` was full.
    pub buffer_overruns: u32,
    /// Data-ready interrupts that arrived while one was still pending and
    /// so never produced a sample.
    pub missed_interrupts: u32,
    pub last_read_time_ms: u64,
    pub buffer_full: bool,
    pub sample_period_ms: u32,
    pub actual_sample_rate_hz: f32,
    pub status: MeasurementStatus,
    pub progress_percent: u8,
}
