//! System clock adapter.
//!
//! Implements [`Clock`] for the node.
//!
//! - **`target_os = "espidf"`**: uptime from `esp_timer_get_time()`
//!   (microsecond precision, monotonic); wall clock from the newlib
//!   `gettimeofday`/`settimeofday` pair backed by the RTC.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` plus a
//!   software RTC offset, for host-side testing and simulation.

use crate::app::ports::{Clock, ClockError};

/// Wall-clock values before 2020-01-01 mean the RTC was never set.
const EPOCH_2020: i64 = 1_577_836_800;

/// Clock adapter for the ESP32-S3 platform.
#[derive(Clone)]
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    /// `unix_secs - uptime_secs`, or `i64::MIN` when unset.
    #[cfg(not(target_os = "espidf"))]
    rtc_offset: std::sync::Arc<core::sync::atomic::AtomicI64>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            rtc_offset: std::sync::Arc::new(core::sync::atomic::AtomicI64::new(i64::MIN)),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Clock for SystemClock {
    fn uptime_ms(&self) -> u64 {
        // SAFETY: reads the free-running high-resolution timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    fn rtc_now(&self) -> Option<u32> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-pointer; timezone is unused.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = i64::from(tv.tv_sec);
        if secs < EPOCH_2020 || secs > i64::from(u32::MAX) {
            return None;
        }
        Some(secs as u32)
    }

    fn set_rtc(&self, unix_secs: u32) -> Result<(), ClockError> {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: unix_secs as _,
            tv_usec: 0,
        };
        // SAFETY: `tv` outlives the call; timezone is unused.
        if unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) } == 0 {
            Ok(())
        } else {
            Err(ClockError::Rejected)
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SystemClock {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn rtc_now(&self) -> Option<u32> {
        use core::sync::atomic::Ordering;

        let offset = self.rtc_offset.load(Ordering::Acquire);
        if offset == i64::MIN {
            return None;
        }
        let secs = offset + (self.uptime_ms() / 1000) as i64;
        u32::try_from(secs).ok()
    }

    fn set_rtc(&self, unix_secs: u32) -> Result<(), ClockError> {
        use core::sync::atomic::Ordering;

        if i64::from(unix_secs) < EPOCH_2020 {
            return Err(ClockError::Rejected);
        }
        let offset = i64::from(unix_secs) - (self.uptime_ms() / 1000) as i64;
        self.rtc_offset.store(offset, Ordering::Release);
        Ok(())
    }
}
