//! Link and session configuration parameters
//!
//! All tunable parameters for the serial link, the streaming task and
//! measurement sessions. Timeouts are in milliseconds; `0` disables the
//! receive inter-byte timeout.

use serde::{Deserialize, Serialize};

/// Serial link + transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- UART ---
    /// Line rate in baud
    pub baud_rate: u32,
    /// Hardware RTS/CTS flow control
    pub flow_control: bool,

    // --- Transport timing ---
    /// Inter-byte receive timeout while a frame is in progress (0 = off)
    pub rx_timeout_ms: u32,
    /// Maximum wait for the transmit mutex
    pub tx_mutex_timeout_ms: u32,
    /// Maximum wait for a previous async transmission to finish
    pub tx_complete_timeout_ms: u32,
    /// Receive task poll interval
    pub rx_poll_interval_ms: u32,

    // --- Streaming ---
    /// Maximum wait for the streaming task to acknowledge a stop
    pub stream_stop_timeout_ms: u32,
    /// Lower bound applied to the requested stream interval
    pub min_stream_interval_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            // UART
            baud_rate: 921_600,
            flow_control: true,

            // Transport timing
            rx_timeout_ms: 1000,
            tx_mutex_timeout_ms: 1000,
            tx_complete_timeout_ms: 1000,
            rx_poll_interval_ms: 1,

            // Streaming
            stream_stop_timeout_ms: 1000,
            min_stream_interval_ms: 1,
        }
    }
}

impl LinkConfig {
    /// Reject values that would make the link unusable.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.baud_rate == 0 {
            return Err("baud_rate must be non-zero");
        }
        if self.tx_mutex_timeout_ms == 0 || self.tx_complete_timeout_ms == 0 {
            return Err("transmit timeouts must be non-zero");
        }
        if self.rx_poll_interval_ms == 0 {
            return Err("rx_poll_interval_ms must be non-zero");
        }
        if self.min_stream_interval_ms == 0 {
            return Err("min_stream_interval_ms must be non-zero");
        }
        Ok(())
    }
}

/// Measurement session applied at boot when the peer never sends SET_CONFIG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Session length in seconds
    pub duration_sec: u32,
    /// Sample period in milliseconds (1, 10, 100 or 1000)
    pub sample_period_ms: u32,
    /// Start a session immediately after boot
    pub autostart: bool,
    /// Deferred data-ready processing interval
    pub process_interval_ms: u32,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            duration_sec: 60,
            sample_period_ms: 100, // 10 Hz
            autostart: false,
            process_interval_ms: 1,
        }
    }
}
