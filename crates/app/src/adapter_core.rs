//! Shared adapter scaffolding: status bookkeeping, event emission with
//! connected/disconnected dedupe, and the reconnect loop driver.
//!
//! Every protocol adapter embeds one [`AdapterCore`] and reports through it;
//! the core guarantees the contract details that are easy to get wrong per
//! adapter (no duplicate connection events, attempt counters mirrored onto
//! the status, error events instead of crossed-boundary panics).

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::broadcast;

use unihub_domain::adapter::{AdapterEvent, AdapterEventType, AdapterStatus};
use unihub_domain::error::UnihubError;
use unihub_domain::id::{AdapterId, DeviceId};

use crate::reconnect::{Backoff, Reconnector};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Status, events, and reconnect state shared by all adapter
/// implementations.
pub struct AdapterCore {
    id: AdapterId,
    events: broadcast::Sender<AdapterEvent>,
    status: Mutex<AdapterStatus>,
    reconnector: Mutex<Reconnector>,
}

impl AdapterCore {
    #[must_use]
    pub fn new(id: impl Into<AdapterId>, reconnector: Reconnector) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            events,
            status: Mutex::new(AdapterStatus::default()),
            reconnector: Mutex::new(reconnector),
        }
    }

    #[must_use]
    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> AdapterStatus {
        self.status.lock().expect("status lock poisoned").clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Emit an event on this adapter's stream. Lossy when nobody listens.
    pub fn emit(&self, event_type: AdapterEventType, data: serde_json::Value) {
        let _ = self
            .events
            .send(AdapterEvent::new(event_type, self.id.clone(), data));
    }

    /// Record a connectivity transition. The Connected/Disconnected event
    /// fires only when the boolean actually changes.
    pub fn set_connected(&self, connected: bool) {
        let changed = {
            let mut status = self.status.lock().expect("status lock poisoned");
            let changed = status.connected != connected;
            status.connected = connected;
            if connected {
                status.healthy = true;
                status.error = None;
            }
            changed
        };
        if changed {
            let event_type = if connected {
                AdapterEventType::Connected
            } else {
                AdapterEventType::Disconnected
            };
            self.emit(event_type, serde_json::Value::Null);
        }
    }

    /// Capture an error on the status object and emit an `error` event.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            status.error = Some(message.clone());
            status.healthy = false;
        }
        self.emit(
            AdapterEventType::Error,
            serde_json::json!({ "message": message }),
        );
    }

    /// Stamp a successful discovery sync.
    pub fn mark_synced(&self) {
        let mut status = self.status.lock().expect("status lock poisoned");
        status.last_sync = Some(unihub_domain::time::now());
    }

    /// Stamp a health-check run and its result.
    pub fn mark_health_check(&self, healthy: bool) {
        let mut status = self.status.lock().expect("status lock poisoned");
        status.healthy = healthy;
        status.last_health_check = Some(unihub_domain::time::now());
    }

    /// Emit a `device_discovered` event.
    pub fn emit_device_discovered(&self, device_id: &DeviceId, name: &str) {
        self.emit(
            AdapterEventType::DeviceDiscovered,
            serde_json::json!({ "device_id": device_id.as_str(), "name": name }),
        );
    }

    /// Emit a `state_changed` event with the raw payload the protocol
    /// delivered.
    pub fn emit_state_changed(&self, device_id: &DeviceId, data: serde_json::Value) {
        self.emit(
            AdapterEventType::StateChanged,
            serde_json::json!({ "device_id": device_id.as_str(), "state": data }),
        );
    }

    /// Drive a full reconnect loop around the given connect attempt.
    ///
    /// Applies the exponential-backoff contract: a concurrent call while a
    /// loop is in flight is a no-op returning `Ok`; after the attempt budget
    /// is spent the adapter transitions to gave-up, records an error event,
    /// and stays down until the next external call.
    ///
    /// # Errors
    ///
    /// Returns the last connect error when the loop gives up.
    pub async fn run_reconnect<F, Fut>(&self, connect: F) -> Result<(), UnihubError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), UnihubError>> + Send,
    {
        if !self
            .reconnector
            .lock()
            .expect("reconnector lock poisoned")
            .begin()
        {
            tracing::debug!(adapter_id = %self.id, "reconnect already in flight");
            return Ok(());
        }

        loop {
            match connect().await {
                Ok(()) => {
                    self.reconnector
                        .lock()
                        .expect("reconnector lock poisoned")
                        .record_success();
                    {
                        let mut status = self.status.lock().expect("status lock poisoned");
                        status.reconnect_attempts = 0;
                    }
                    self.set_connected(true);
                    return Ok(());
                }
                Err(err) => {
                    let backoff = {
                        let mut reconnector = self
                            .reconnector
                            .lock()
                            .expect("reconnector lock poisoned");
                        let backoff = reconnector.record_failure();
                        let mut status = self.status.lock().expect("status lock poisoned");
                        status.reconnect_attempts = reconnector.attempts();
                        backoff
                    };
                    match backoff {
                        Backoff::RetryAfter(delay) => {
                            tracing::warn!(
                                adapter_id = %self.id,
                                error = %err,
                                delay_ms = delay.as_millis(),
                                "connect attempt failed; backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        Backoff::GaveUp => {
                            self.record_error(format!(
                                "reconnect gave up after exhausting attempts: {err}"
                            ));
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}
