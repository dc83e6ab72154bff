//! Protocol packet layout.
//!
//! ```text
//! ┌──────┬────────┬─────┬────────┬────────┬────────┬─────────────────┐
//! │ type │ cmd_id │ seq │ status │ LEN_LO │ LEN_HI │ payload (LEN B) │
//! └──────┴────────┴─────┴────────┴────────┴────────┴─────────────────┘
//! ```
//!
//! Every multi-byte field is little-endian. `status` is only meaningful in
//! RESP packets and is zero elsewhere.

use crate::error::ProtocolError;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest command-specific payload.
pub const PROTOCOL_MAX_PAYLOAD: usize = 256;

/// Largest encoded packet.
pub const MAX_PACKET_LEN: usize = HEADER_SIZE + PROTOCOL_MAX_PAYLOAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Cmd = 0x01,
    Resp = 0x02,
    Notify = 0x03,
}

impl PacketType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Cmd),
            0x02 => Some(Self::Resp),
            0x03 => Some(Self::Notify),
            _ => None,
        }
    }
}

/// Command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetBufferData = 0x01,
    StartMeasurement = 0x02,
    StopMeasurement = 0x03,
    SetRtc = 0x04,
    GetStatus = 0x05,
    ClearBuffer = 0x06,
    GetConfig = 0x07,
    SetConfig = 0x08,
    /// Unsolicited sensor sample (NOTIFY only).
    NotifySensorData = 0x80,
}

impl CommandId {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::GetBufferData),
            0x02 => Some(Self::StartMeasurement),
            0x03 => Some(Self::StopMeasurement),
            0x04 => Some(Self::SetRtc),
            0x05 => Some(Self::GetStatus),
            0x06 => Some(Self::ClearBuffer),
            0x07 => Some(Self::GetConfig),
            0x08 => Some(Self::SetConfig),
            0x80 => Some(Self::NotifySensorData),
            _ => None,
        }
    }

    /// Minimum request payload for the command.
    pub const fn min_request_len(self) -> usize {
        match self {
            Self::GetBufferData => GetBufferDataRequest::SIZE,
            Self::StartMeasurement => StartStreamRequest::SIZE,
            Self::SetRtc => SetRtcRequest::SIZE,
            Self::SetConfig => SessionConfigRequest::SIZE,
            Self::StopMeasurement
            | Self::GetStatus
            | Self::ClearBuffer
            | Self::GetConfig
            | Self::NotifySensorData => 0,
        }
    }
}

/// RESP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RespStatus {
    Ok = 0x00,
    Error = 0x01,
    InvalidCmd = 0x02,
    InvalidParam = 0x03,
    Busy = 0x04,
    Timeout = 0x05,
    NoData = 0x06,
}

/// Streamable sensor sources. Unknown values are kept so the peer gets
/// back exactly the selector it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Temperature,
    Current,
    Other(u8),
}

impl SensorType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x01 => Self::Temperature,
            0x02 => Self::Current,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Temperature => 0x01,
            Self::Current => 0x02,
            Self::Other(raw) => raw,
        }
    }
}

// ── Header + view ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw type byte; validate with [`PacketType::from_u8`].
    pub packet_type: u8,
    pub cmd_id: u8,
    pub seq: u8,
    pub status: u8,
    pub length: u16,
}

impl PacketHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::TooShort);
        }
        Ok(Self {
            packet_type: bytes[0],
            cmd_id: bytes[1],
            seq: bytes[2],
            status: bytes[3],
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn write(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0] = self.packet_type;
        out[1] = self.cmd_id;
        out[2] = self.seq;
        out[3] = self.status;
        out[4..6].copy_from_slice(&self.length.to_le_bytes());
    }
}

/// Borrowed, validated packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketView<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Parse a transport payload. The header length must not exceed
    /// [`PROTOCOL_MAX_PAYLOAD`] nor the bytes that follow the header.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        let header = PacketHeader::parse(bytes)?;
        let available = bytes.len() - HEADER_SIZE;
        let declared = header.length as usize;
        if declared > PROTOCOL_MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge);
        }
        if declared > available {
            return Err(ProtocolError::LengthMismatch {
                declared: header.length,
                available,
            });
        }
        Ok(Self {
            header,
            payload: &bytes[HEADER_SIZE..HEADER_SIZE + declared],
        })
    }
}

/// Encode header + payload into `out`. Returns the packet length.
pub fn encode_packet(
    packet_type: PacketType,
    cmd_id: u8,
    seq: u8,
    status: u8,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, ProtocolError> {
    if payload.len() > PROTOCOL_MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let total = HEADER_SIZE + payload.len();
    if out.len() < total {
        return Err(ProtocolError::TooShort);
    }

    let header = PacketHeader {
        packet_type: packet_type as u8,
        cmd_id,
        seq,
        status,
        length: payload.len() as u16,
    };
    let mut head = [0u8; HEADER_SIZE];
    header.write(&mut head);
    out[..HEADER_SIZE].copy_from_slice(&head);
    out[HEADER_SIZE..total].copy_from_slice(payload);
    Ok(total)
}

// ── Payloads ─────────────────────────────────────────────────

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// GET_STATUS response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub state: u8,
    pub error_code: u8,
    pub buffer_count: u16,
    pub uptime_sec: u32,
}

impl StatusResponse {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0] = self.state;
        b[1] = self.error_code;
        b[2..4].copy_from_slice(&self.buffer_count.to_le_bytes());
        b[4..8].copy_from_slice(&self.uptime_sec.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            state: b[0],
            error_code: b[1],
            buffer_count: u16::from_le_bytes([b[2], b[3]]),
            uptime_sec: le_u32(&b[4..8]),
        })
    }
}

/// Streamed / buffered sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSample {
    pub sensor_type: u8,
    /// Milliseconds since boot.
    pub timestamp: u32,
    /// Fixed-point value: centi-°C for temperature, µA for current.
    pub value: i32,
}

impl SensorSample {
    pub const SIZE: usize = 9;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0] = self.sensor_type;
        b[1..5].copy_from_slice(&self.timestamp.to_le_bytes());
        b[5..9].copy_from_slice(&self.value.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            sensor_type: b[0],
            timestamp: le_u32(&b[1..5]),
            value: le_u32(&b[5..9]) as i32,
        })
    }
}

/// START_MEASUREMENT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartStreamRequest {
    pub sensor_type: SensorType,
    pub interval_ms: u32,
}

impl StartStreamRequest {
    pub const SIZE: usize = 5;

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            sensor_type: SensorType::from_u8(b[0]),
            interval_ms: le_u32(&b[1..5]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0] = self.sensor_type.as_u8();
        b[1..5].copy_from_slice(&self.interval_ms.to_le_bytes());
        b
    }
}

/// SET_RTC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetRtcRequest {
    pub unix_time: u32,
}

impl SetRtcRequest {
    pub const SIZE: usize = 4;

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        (b.len() >= Self::SIZE).then(|| Self {
            unix_time: le_u32(b),
        })
    }
}

/// GET_BUFFER_DATA request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetBufferDataRequest {
    pub start_index: u32,
    pub count: u32,
}

impl GetBufferDataRequest {
    pub const SIZE: usize = 8;

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        (b.len() >= Self::SIZE).then(|| Self {
            start_index: le_u32(&b[0..4]),
            count: le_u32(&b[4..8]),
        })
    }
}

/// SET_CONFIG request: measurement session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfigRequest {
    pub duration_sec: u32,
    pub sample_period_ms: u16,
}

impl SessionConfigRequest {
    pub const SIZE: usize = 6;

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        (b.len() >= Self::SIZE).then(|| Self {
            duration_sec: le_u32(&b[0..4]),
            sample_period_ms: u16::from_le_bytes([b[4], b[5]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0..4].copy_from_slice(&self.duration_sec.to_le_bytes());
        b[4..6].copy_from_slice(&self.sample_period_ms.to_le_bytes());
        b
    }
}

/// GET_CONFIG response: session parameters and progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfigResponse {
    pub status: u8,
    pub progress_percent: u8,
    pub sample_period_ms: u16,
    pub duration_sec: u32,
    pub samples_captured: u32,
    pub buffer_overruns: u32,
}

impl SessionConfigResponse {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        b[0] = self.status;
        b[1] = self.progress_percent;
        b[2..4].copy_from_slice(&self.sample_period_ms.to_le_bytes());
        b[4..8].copy_from_slice(&self.duration_sec.to_le_bytes());
        b[8..12].copy_from_slice(&self.samples_captured.to_le_bytes());
        b[12..16].copy_from_slice(&self.buffer_overruns.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            status: b[0],
            progress_percent: b[1],
            sample_period_ms: u16::from_le_bytes([b[2], b[3]]),
            duration_sec: le_u32(&b[4..8]),
            samples_captured: le_u32(&b[8..12]),
            buffer_overruns: le_u32(&b[12..16]),
        })
    }
}
