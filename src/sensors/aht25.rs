//! AHT25 temperature/humidity sensor driver.
//!
//! One measurement is a trigger command, an 80 ms conversion wait and a
//! 7-byte read: status, 20-bit humidity, 20-bit temperature, CRC-8.
//!
//! ```text
//!  byte:  0       1        2        3          4        5        6
//!        [status][hum 19:12][hum 11:4][hum 3:0|t 19:16][t 15:8][t 7:0][crc]
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::error::SensorError;

/// Fixed 7-bit address.
pub const ADDRESS: u8 = 0x38;

const CMD_STATUS: u8 = 0x71;
const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];
/// Calibration-loaded bits in the status byte.
const STATUS_CALIBRATED: u8 = 0x18;
const STATUS_BUSY: u8 = 0x80;

const POWER_UP_MS: u32 = 100;
const CONVERSION_MS: u32 = 80;

/// 2^20, full scale of both channels.
const FULL_SCALE: f32 = 1_048_576.0;

/// CRC-8, polynomial 0x31, init 0xFF.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Converted climate reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// Degrees Celsius, -50..150
    pub temperature: f32,
    /// Relative humidity, 0..100 %
    pub humidity: f32,
}

/// Decode a 7-byte measurement frame.
pub fn decode(frame: &[u8; 7]) -> Result<ClimateReading, SensorError> {
    if frame[0] & STATUS_BUSY != 0 {
        return Err(SensorError::Busy);
    }
    if crc8(&frame[..6]) != frame[6] {
        return Err(SensorError::Crc);
    }

    let raw_hum = (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temp = (u32::from(frame[3] & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    Ok(ClimateReading {
        temperature: raw_temp as f32 / FULL_SCALE * 200.0 - 50.0,
        humidity: raw_hum as f32 / FULL_SCALE * 100.0,
    })
}

pub struct Aht25<I, D> {
    i2c: I,
    delay: D,
    ready: bool,
}

impl<I: I2c, D: DelayNs> Aht25<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            ready: false,
        }
    }

    /// Wait out power-up and confirm the factory calibration is loaded.
    pub fn open(&mut self) -> Result<(), SensorError> {
        self.ready = false;
        self.delay.delay_ms(POWER_UP_MS);

        let mut status = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[CMD_STATUS], &mut status)
            .map_err(|_| SensorError::Bus)?;
        if status[0] & STATUS_CALIBRATED != STATUS_CALIBRATED {
            warn!("AHT25: not calibrated (status 0x{:02X})", status[0]);
            return Err(SensorError::WrongDevice(u16::from(status[0])));
        }

        self.ready = true;
        info!("AHT25: ready");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.ready
    }

    /// Trigger and read one measurement. Blocks for the conversion time.
    pub fn read(&mut self) -> Result<ClimateReading, SensorError> {
        if !self.ready {
            return Err(SensorError::NotOpen);
        }
        self.i2c
            .write(ADDRESS, &CMD_TRIGGER)
            .map_err(|_| SensorError::Bus)?;
        self.delay.delay_ms(CONVERSION_MS);

        let mut frame = [0u8; 7];
        self.i2c
            .read(ADDRESS, &mut frame)
            .map_err(|_| SensorError::Bus)?;
        decode(&frame)
    }

    pub fn close(&mut self) {
        self.ready = false;
    }
}
