//! Climate sensing: AHT25 driver and the poller feeding the temperature
//! topic.
//!
//! The poller owns the driver and publishes a [`TemperatureUpdate`] every
//! tick: a good reading with `sensor_ok = true`, or a zeroed update with
//! `sensor_ok = false` so subscribers drop stale values.

pub mod aht25;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, warn};

use crate::adapters::event_bus::TemperatureBus;
use crate::app::ports::TemperatureUpdate;
use aht25::Aht25;

/// Sensor read cadence.
pub const CLIMATE_INTERVAL_MS: u32 = 1000;

pub struct ClimatePoller<I, D> {
    sensor: Aht25<I, D>,
    consecutive_failures: u32,
}

impl<I: I2c, D: DelayNs> ClimatePoller<I, D> {
    pub fn new(sensor: Aht25<I, D>) -> Self {
        Self {
            sensor,
            consecutive_failures: 0,
        }
    }

    /// Read once and publish. Re-opens the sensor after a failure.
    pub fn tick(&mut self, bus: &TemperatureBus) -> TemperatureUpdate {
        if !self.sensor.is_open() {
            if let Err(e) = self.sensor.open() {
                debug!("CLIMATE: open failed: {}", e);
            }
        }

        let update = match self.sensor.read() {
            Ok(r) => {
                self.consecutive_failures = 0;
                TemperatureUpdate {
                    temperature: r.temperature,
                    humidity: r.humidity,
                    sensor_ok: true,
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == 1 {
                    warn!("CLIMATE: read failed: {}", e);
                }
                self.sensor.close();
                TemperatureUpdate {
                    temperature: 0.0,
                    humidity: 0.0,
                    sensor_ok: false,
                }
            }
        };

        bus.publish(&update);
        update
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
