//! Unified error types for the PowerBridge firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! binary's error handling uniform. All variants are `Copy` so they can be
//! returned from interrupt-adjacent paths and stored in stats without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Serial link / framing transport failure.
    Link(LinkError),
    /// Malformed protocol packet.
    Protocol(ProtocolError),
    /// Measurement session rejected or failed an operation.
    Session(SessionError),
    /// Power sensor could not be configured or read.
    Sensor(SensorError),
    /// Subsystem initialisation failed (thread or primitive creation).
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Transport was de-initialised (or never initialised).
    NotInitialized,
    /// Transmit mutex could not be acquired within the timeout.
    Busy,
    /// A bounded wait (TX completion, mutex) expired.
    Timeout,
    /// Payload does not fit in a frame.
    PayloadTooLarge,
    /// The serial driver accepted fewer bytes than the frame length.
    TxFailed,
    /// The serial driver reported an I/O error.
    Serial,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "transport not initialised"),
            Self::Busy => write!(f, "transmit mutex busy"),
            Self::Timeout => write!(f, "timed out"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::TxFailed => write!(f, "short write"),
            Self::Serial => write!(f, "serial driver error"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than a packet header.
    TooShort,
    /// Header length field exceeds the bytes actually present.
    LengthMismatch { declared: u16, available: usize },
    /// Payload exceeds the protocol maximum.
    PayloadTooLarge,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "packet shorter than header"),
            Self::LengthMismatch {
                declared,
                available,
            } => write!(f, "declared {declared} bytes, {available} present"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Measurement session errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Duration outside 1..=3600 s.
    InvalidDuration(u32),
    /// Sample period is not one of the supported discrete values.
    InvalidPeriod(u32),
    /// `duration / period` exceeds the sample storage.
    TooManySamples(u32),
    /// A session is already running.
    AlreadyRunning,
    /// Sensor failed while opening the session.
    Sensor(SensorError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDuration(s) => write!(f, "invalid duration {s}s"),
            Self::InvalidPeriod(ms) => write!(f, "unsupported sample period {ms}ms"),
            Self::TooManySamples(n) => write!(f, "{n} samples exceed storage"),
            Self::AlreadyRunning => write!(f, "session already running"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
        }
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

impl From<SensorError> for SessionError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// I2C transaction failed.
    Bus,
    /// Device ID register did not match.
    WrongDevice(u16),
    /// Read attempted before `open`.
    NotOpen,
    /// Measurement still in progress.
    Busy,
    /// Checksum over the sensor response did not match.
    Crc,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "I2C bus error"),
            Self::WrongDevice(id) => write!(f, "unexpected device id 0x{id:04X}"),
            Self::NotOpen => write!(f, "sensor not open"),
            Self::Busy => write!(f, "sensor busy"),
            Self::Crc => write!(f, "sensor checksum mismatch"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
