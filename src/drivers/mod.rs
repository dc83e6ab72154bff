//! Peripheral drivers and task helpers.

pub mod ina226;
pub mod task_pin;
