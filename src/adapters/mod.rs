//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements       | Connects to                |
//! |-------------|------------------|----------------------------|
//! | `event_bus` | TemperatureFeed  | Climate poller             |
//! | `time`      | Clock            | ESP32 system timer + RTC   |
//! | `uart`      | SerialPort       | ESP-IDF UART driver        |

pub mod event_bus;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
