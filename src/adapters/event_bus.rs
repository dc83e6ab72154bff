//! In-process temperature topic.
//!
//! Implements [`TemperatureFeed`] for subscribers and exposes `publish`
//! for the climate sensor poller. Listeners run synchronously on the
//! publisher's thread, outside the subscriber lock, so a listener may
//! unsubscribe itself.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::app::ports::{SubscriptionId, TemperatureFeed, TemperatureListener, TemperatureUpdate};

/// Fan-out bus for [`TemperatureUpdate`].
#[derive(Default)]
pub struct TemperatureBus {
    listeners: Mutex<Vec<(SubscriptionId, TemperatureListener)>>,
    next_id: AtomicU32,
}

impl TemperatureBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `update` to every current subscriber.
    pub fn publish(&self, update: &TemperatureUpdate) {
        let snapshot: Vec<TemperatureListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener(update);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TemperatureFeed for TemperatureBus {
    fn subscribe(&self, listener: TemperatureListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        debug!("BUS: temperature subscriber {} added", id.0);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| *sid != id);
    }
}
