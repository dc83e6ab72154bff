//! INA226 current/voltage/power monitor driver.
//!
//! Generic over `embedded_hal::i2c::I2c`, so the same code drives the
//! ESP-IDF I2C peripheral on target and a register-map mock in tests.
//!
//! `open` resets the part, programs calibration from the profile's shunt
//! and full-scale current, enables the conversion-ready ALERT output and
//! starts continuous conversion. The ALERT edge is routed by the caller
//! to `MeasurementSession::on_data_ready`.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::{PowerReading, PowerSensor};
use crate::error::SensorError;
use crate::measurement::{OperatingMode, SensorProfile};

/// 7-bit address with A0/A1 tied to GND.
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// "TI" in ASCII.
pub const MANUFACTURER_ID: u16 = 0x5449;

mod reg {
    pub const CONFIG: u8 = 0x00;
    pub const BUS_VOLTAGE: u8 = 0x02;
    pub const POWER: u8 = 0x03;
    pub const CURRENT: u8 = 0x04;
    pub const CALIBRATION: u8 = 0x05;
    pub const MASK_ENABLE: u8 = 0x06;
    pub const MANUFACTURER_ID: u8 = 0xFE;
}

const CONFIG_RESET: u16 = 0x8000;
/// ALERT asserts on conversion ready.
const MASK_CNVR: u16 = 0x0400;

/// 1.25 mV per bus-voltage LSB.
const BUS_LSB_V: f32 = 0.001_25;
/// Fixed internal scaling of the calibration equation.
const CAL_SCALE: f32 = 0.005_12;
/// Power LSB is 25 × current LSB.
const POWER_LSB_RATIO: f32 = 25.0;

const RESET_DELAY_MS: u32 = 1;

/// Config register value for `profile`.
pub fn config_word(profile: &SensorProfile) -> u16 {
    ((profile.averaging as u16) << 9)
        | ((profile.bus_conversion as u16) << 6)
        | ((profile.shunt_conversion as u16) << 3)
        | profile.mode as u16
}

/// Current LSB in amps and the matching calibration register value.
pub fn calibration(profile: &SensorProfile) -> (f32, u16) {
    let current_lsb = profile.max_current_a / 32_768.0;
    let cal = CAL_SCALE / (current_lsb * profile.shunt_ohms);
    (current_lsb, cal.min(f32::from(u16::MAX)) as u16)
}

/// INA226 on an I2C bus.
pub struct Ina226<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    current_lsb: f32,
    open: bool,
}

impl<I: I2c, D: DelayNs> Ina226<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            current_lsb: 0.0,
            open: false,
        }
    }

    /// Hand back the bus.
    pub fn release(self) -> I {
        self.i2c
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<(), SensorError> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[reg, hi, lo])
            .map_err(|_| SensorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(|_| SensorError::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read Mask/Enable, which also clears the conversion-ready flag and
    /// releases the latched ALERT line.
    pub fn ack_alert(&mut self) -> Result<bool, SensorError> {
        Ok(self.read_reg(reg::MASK_ENABLE)? & 0x0008 != 0)
    }
}

impl<I, D> PowerSensor for Ina226<I, D>
where
    I: I2c + Send,
    D: DelayNs + Send,
{
    fn open(&mut self, profile: &SensorProfile) -> Result<(), SensorError> {
        let id = self.read_reg(reg::MANUFACTURER_ID)?;
        if id != MANUFACTURER_ID {
            warn!("INA226: unexpected manufacturer id 0x{:04X}", id);
            return Err(SensorError::WrongDevice(id));
        }

        self.write_reg(reg::CONFIG, CONFIG_RESET)?;
        self.delay.delay_ms(RESET_DELAY_MS);

        let (current_lsb, cal) = calibration(profile);
        self.write_reg(reg::CALIBRATION, cal)?;
        self.write_reg(reg::MASK_ENABLE, MASK_CNVR)?;
        self.write_reg(reg::CONFIG, config_word(profile))?;

        self.current_lsb = current_lsb;
        self.open = true;
        info!(
            "INA226: open (avg {}, conv {}us, cal {})",
            profile.averaging.count(),
            profile.conversion_us(),
            cal
        );
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let result = self
            .write_reg(reg::MASK_ENABLE, 0)
            .and_then(|()| self.write_reg(reg::CONFIG, OperatingMode::PowerDown as u16));
        if let Err(e) = result {
            warn!("INA226: power-down failed: {}", e);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<PowerReading, SensorError> {
        if !self.open {
            return Err(SensorError::NotOpen);
        }
        let bus = self.read_reg(reg::BUS_VOLTAGE)?;
        let current = self.read_reg(reg::CURRENT)? as i16;
        let power = self.read_reg(reg::POWER)?;
        // Releases ALERT for the next conversion.
        self.ack_alert()?;

        Ok(PowerReading {
            current_ma: f32::from(current) * self.current_lsb * 1000.0,
            voltage_v: f32::from(bus) * BUS_LSB_V,
            power_mw: f32::from(power) * POWER_LSB_RATIO * self.current_lsb * 1000.0,
        })
    }
}
