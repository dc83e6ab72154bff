//! Application boundary.
//!
//! The link, protocol and measurement layers talk to hardware only
//! through the **port traits** in [`ports`], keeping them fully testable
//! without real peripherals.

pub mod ports;
