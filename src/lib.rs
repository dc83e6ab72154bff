//! PowerBridge node firmware library.
//!
//! Exposes the link, protocol and measurement layers for integration
//! testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod link;
pub mod measurement;
pub mod protocol;
pub mod sensors;

#[cfg(target_os = "espidf")]
mod esp_link_shims;

pub use error::{Error, Result};
