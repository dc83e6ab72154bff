//! Power-sensor acquisition profiles.
//!
//! Each sample period gets an averaging count and conversion times whose
//! product fits inside the period: a full averaged shunt+bus conversion
//! must finish before the next data-ready edge is due.

use super::SamplePeriod;

/// Samples averaged per reported conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Averaging {
    X1 = 0,
    X4 = 1,
    X16 = 2,
    X64 = 3,
    X128 = 4,
    X256 = 5,
    X512 = 6,
    X1024 = 7,
}

impl Averaging {
    pub const fn count(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X4 => 4,
            Self::X16 => 16,
            Self::X64 => 64,
            Self::X128 => 128,
            Self::X256 => 256,
            Self::X512 => 512,
            Self::X1024 => 1024,
        }
    }
}

/// ADC conversion time per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ConversionTime {
    Us140 = 0,
    Us204 = 1,
    Us332 = 2,
    Us588 = 3,
    Us1100 = 4,
    Us2116 = 5,
    Us4156 = 6,
    Us8244 = 7,
}

impl ConversionTime {
    pub const fn micros(self) -> u32 {
        match self {
            Self::Us140 => 140,
            Self::Us204 => 204,
            Self::Us332 => 332,
            Self::Us588 => 588,
            Self::Us1100 => 1100,
            Self::Us2116 => 2116,
            Self::Us4156 => 4156,
            Self::Us8244 => 8244,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OperatingMode {
    PowerDown = 0,
    ShuntTriggered = 1,
    BusTriggered = 2,
    ShuntBusTriggered = 3,
    ShuntContinuous = 5,
    BusContinuous = 6,
    ShuntBusContinuous = 7,
}

/// Everything the sensor needs to start converting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorProfile {
    pub averaging: Averaging,
    pub bus_conversion: ConversionTime,
    pub shunt_conversion: ConversionTime,
    pub mode: OperatingMode,
    /// Shunt resistor, ohms.
    pub shunt_ohms: f32,
    /// Full-scale current used for calibration, amps.
    pub max_current_a: f32,
}

/// Board shunt resistor.
pub const SHUNT_OHMS: f32 = 0.1;

/// 81.92 mV full-scale shunt range across 0.1 Ω.
pub const MAX_CURRENT_A: f32 = 0.8;

impl SensorProfile {
    /// Profile for a session sampling every `period`.
    pub const fn for_period(period: SamplePeriod) -> Self {
        let (averaging, conversion) = match period {
            SamplePeriod::Ms1 => (Averaging::X1, ConversionTime::Us140),
            SamplePeriod::Ms10 => (Averaging::X4, ConversionTime::Us588),
            SamplePeriod::Ms100 => (Averaging::X16, ConversionTime::Us1100),
            SamplePeriod::Ms1000 => (Averaging::X64, ConversionTime::Us4156),
        };
        Self {
            averaging,
            bus_conversion: conversion,
            shunt_conversion: conversion,
            mode: OperatingMode::ShuntBusContinuous,
            shunt_ohms: SHUNT_OHMS,
            max_current_a: MAX_CURRENT_A,
        }
    }

    /// Profile for one-off reads outside a session.
    pub const fn instant() -> Self {
        Self::for_period(SamplePeriod::Ms100)
    }

    /// Time for one averaged shunt+bus conversion, microseconds.
    pub const fn conversion_us(&self) -> u32 {
        (self.bus_conversion.micros() + self.shunt_conversion.micros()) * self.averaging.count()
    }
}
