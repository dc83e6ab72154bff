//! Sentinel-delimited frame codec with CRC-16.
//!
//! Wire format:
//! ```text
//! ┌──────┬────────┬────────┬─────────────┬────────┬────────┬──────┐
//! │ 0xAA │ LEN_LO │ LEN_HI │ PAYLOAD (N) │ CRC_LO │ CRC_HI │ 0x55 │
//! └──────┴────────┴────────┴─────────────┴────────┴────────┴──────┘
//! ```
//!
//! The CRC covers the payload only. The decoder is fed one byte at a
//! time and self-heals to `Idle` after every success or error, so a
//! corrupted frame never poisons the ones that follow it.

use super::crc::crc16;

/// Frame start sentinel.
pub const START_MARKER: u8 = 0xAA;

/// Frame end sentinel.
pub const END_MARKER: u8 = 0x55;

/// Largest frame on the wire, sentinels and CRC included.
pub const MAX_PACKET_SIZE: usize = 512;

/// START + LEN(2) + CRC(2) + END.
pub const FRAME_OVERHEAD: usize = 6;

/// Largest payload a frame may declare.
pub const MAX_FRAME_PAYLOAD: usize = MAX_PACKET_SIZE - FRAME_OVERHEAD;

/// Receive state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Hunting for `START_MARKER`.
    Idle,
    LengthLow,
    LengthHigh,
    /// Accumulating payload bytes.
    Data,
    CrcLow,
    CrcHigh,
    /// Expecting `END_MARKER`.
    End,
}

/// Why a frame was rejected without a CRC check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingFault {
    /// Declared payload length exceeds `MAX_FRAME_PAYLOAD`.
    Oversize(u16),
    /// Byte found where `END_MARKER` was expected.
    MissingEnd(u8),
}

/// Outcome of a byte that completed (or aborted) a frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// Valid frame; slice is the payload.
    Packet(&'a [u8]),
    /// Frame complete but the checksum disagrees.
    CrcMismatch { expected: u16, computed: u16 },
    /// Structural error.
    Framing(FramingFault),
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: RxState,
    expected_len: usize,
    index: usize,
    expected_crc: u16,
    last_byte_ms: u64,
    payload_buf: [u8; MAX_FRAME_PAYLOAD],
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: RxState::Idle,
            expected_len: 0,
            index: 0,
            expected_crc: 0,
            last_byte_ms: 0,
            payload_buf: [0; MAX_FRAME_PAYLOAD],
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Record the arrival time of the next byte.
    ///
    /// Returns `true` if a partially received frame was abandoned because
    /// the gap since the previous byte exceeded `timeout_ms`. A timeout of
    /// `0` disables the check. Call this before [`push`](Self::push).
    pub fn check_timeout(&mut self, now_ms: u64, timeout_ms: u32) -> bool {
        let stalled = timeout_ms != 0
            && self.state != RxState::Idle
            && now_ms.saturating_sub(self.last_byte_ms) > u64::from(timeout_ms);
        self.last_byte_ms = now_ms;
        if stalled {
            self.reset();
        }
        stalled
    }

    /// Feed one byte into the decoder.
    ///
    /// Returns `Some` when the byte resolves the current frame one way or
    /// the other. A returned payload slice is valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<Decoded<'_>> {
        match self.state {
            RxState::Idle => {
                if byte == START_MARKER {
                    self.index = 0;
                    self.expected_len = 0;
                    self.state = RxState::LengthLow;
                }
            }

            RxState::LengthLow => {
                self.expected_len = byte as usize;
                self.state = RxState::LengthHigh;
            }

            RxState::LengthHigh => {
                self.expected_len |= (byte as usize) << 8;

                if self.expected_len > MAX_FRAME_PAYLOAD {
                    // Reject before touching the buffer.
                    self.state = RxState::Idle;
                    return Some(Decoded::Framing(FramingFault::Oversize(
                        self.expected_len as u16,
                    )));
                }

                self.state = if self.expected_len == 0 {
                    RxState::CrcLow
                } else {
                    RxState::Data
                };
            }

            RxState::Data => {
                self.payload_buf[self.index] = byte;
                self.index += 1;
                if self.index == self.expected_len {
                    self.state = RxState::CrcLow;
                }
            }

            RxState::CrcLow => {
                self.expected_crc = byte as u16;
                self.state = RxState::CrcHigh;
            }

            RxState::CrcHigh => {
                self.expected_crc |= (byte as u16) << 8;
                self.state = RxState::End;
            }

            RxState::End => {
                self.state = RxState::Idle;

                if byte != END_MARKER {
                    return Some(Decoded::Framing(FramingFault::MissingEnd(byte)));
                }

                let payload = &self.payload_buf[..self.expected_len];
                let computed = crc16(payload);
                if computed == self.expected_crc {
                    return Some(Decoded::Packet(payload));
                }
                return Some(Decoded::CrcMismatch {
                    expected: self.expected_crc,
                    computed,
                });
            }
        }

        None
    }

    /// Drop any partial frame (e.g. after an RX flush).
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.index = 0;
        self.expected_len = 0;
    }
}

/// Encode `payload` into a complete frame.
///
/// Writes `START | LEN | payload | CRC | END` into `out_buf` and returns
/// the total number of bytes written.
pub fn encode_frame(payload: &[u8], out_buf: &mut [u8]) -> Option<usize> {
    let total = payload.len() + FRAME_OVERHEAD;
    if payload.len() > MAX_FRAME_PAYLOAD || total > out_buf.len() {
        return None;
    }

    let len = (payload.len() as u16).to_le_bytes();
    let crc = crc16(payload).to_le_bytes();

    out_buf[0] = START_MARKER;
    out_buf[1..3].copy_from_slice(&len);
    out_buf[3..3 + payload.len()].copy_from_slice(payload);
    out_buf[3 + payload.len()..5 + payload.len()].copy_from_slice(&crc);
    out_buf[total - 1] = END_MARKER;

    Some(total)
}
