//! In-process adapter event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use unihub_domain::adapter::{AdapterEvent, AdapterEventType};
use unihub_domain::id::AdapterId;

/// Fan-out bus for [`AdapterEvent`]s.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Clone)]
pub struct AdapterEventBus {
    sender: broadcast::Sender<AdapterEvent>,
}

impl AdapterEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Lossy when nobody listens.
    pub fn publish(&self, event: AdapterEvent) {
        // broadcast::send fails only when there are zero receivers,
        // which is fine — the event is simply dropped.
        let _ = self.sender.send(event);
    }

    /// Convenience: build and publish an event stamped now.
    pub fn emit(
        &self,
        event_type: AdapterEventType,
        adapter_id: &AdapterId,
        data: serde_json::Value,
    ) {
        self.publish(AdapterEvent::new(event_type, adapter_id.clone(), data));
    }
}

impl Default for AdapterEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
