//! Interrupt → task handoff.
//!
//! Interrupt handlers must stay short and may not take a mutex, so they
//! only raise a flag here. The owning task drains it later from normal
//! context and does the real work (I2C reads, buffer appends).
//!
//! ```text
//! ┌─────────────┐  raise()  ┌──────────┐  take()  ┌──────────────────┐
//! │ GPIO ISR    │──────────▶│ IsrFlag  │─────────▶│ deferred handler │
//! │ (producer)  │           │ (atomic) │          │ (consumer task)  │
//! └─────────────┘           └──────────┘          └──────────────────┘
//! ```
//!
//! Repeated raises before the consumer runs coalesce into one pending
//! event; the number of coalesced raises is kept for diagnostics.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Single-producer / single-consumer event flag.
#[derive(Debug, Default)]
pub struct IsrFlag {
    pending: AtomicBool,
    coalesced: AtomicU32,
}

impl IsrFlag {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            coalesced: AtomicU32::new(0),
        }
    }

    /// Mark the event pending.
    /// Safe to call from ISR context (lock-free).
    /// Returns `false` if an event was already pending.
    pub fn raise(&self) -> bool {
        let was_pending = self.pending.swap(true, Ordering::AcqRel);
        if was_pending {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        !was_pending
    }

    /// Consume the pending event, if any.
    /// Called from the deferred handler (single consumer).
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Check without consuming.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Raises that landed while an event was already pending.
    pub fn coalesced(&self) -> u32 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Drop any pending event.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Drop any pending event and zero the coalesced count.
    pub fn reset(&self) {
        self.pending.store(false, Ordering::Release);
        self.coalesced.store(0, Ordering::Relaxed);
    }
}
