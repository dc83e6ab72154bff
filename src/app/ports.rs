//! Port traits: the boundary between the link/measurement core and hardware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ MeasurementSession / ProtocolHandler
//! ```
//!
//! Driven adapters (clock, power sensor, temperature feed) implement these
//! traits. The core consumes them via generics, so the session and the
//! dispatcher run unchanged against the mocks in `tests/integration`.

use std::sync::Arc;

use crate::error::SensorError;
use crate::measurement::SensorProfile;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic uptime plus an optional wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Wall-clock Unix seconds, or `None` if the RTC has never been set.
    fn rtc_now(&self) -> Option<u32>;

    /// Set the wall clock.
    fn set_rtc(&self, unix_secs: u32) -> Result<(), ClockError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The platform rejected the new time.
    Rejected,
}

impl core::fmt::Display for ClockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rejected => write!(f, "clock rejected new time"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Power sensor port
// ───────────────────────────────────────────────────────────────

/// One converted current/voltage/power reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerReading {
    pub current_ma: f32,
    pub voltage_v: f32,
    pub power_mw: f32,
}

/// Current/voltage/power monitor with a conversion-ready interrupt.
///
/// `open` applies an averaging/conversion profile and arms the
/// data-ready output; the interrupt itself is routed by the adapter to
/// [`MeasurementSession::on_data_ready`](crate::measurement::MeasurementSession::on_data_ready).
pub trait PowerSensor: Send {
    fn open(&mut self, profile: &SensorProfile) -> Result<(), SensorError>;

    /// Power down / disarm. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Read the latest conversion.
    fn read(&mut self) -> Result<PowerReading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Temperature feed port (intra-firmware event bus)
// ───────────────────────────────────────────────────────────────

/// Payload of the "temperature updated" topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureUpdate {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity, percent
    pub humidity: f32,
    /// `false` when the sensor read failed; the values are then stale.
    pub sensor_ok: bool,
}

/// Handle returned by [`TemperatureFeed::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(pub u32);

pub type TemperatureListener = Arc<dyn Fn(&TemperatureUpdate) + Send + Sync>;

/// Subscribe side of the temperature topic.
pub trait TemperatureFeed: Send + Sync {
    fn subscribe(&self, listener: TemperatureListener) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}
