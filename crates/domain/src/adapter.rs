//! Adapter status and events — the shapes adapters expose across the port.

use serde::{Deserialize, Serialize};

use crate::id::AdapterId;
use crate::time::Timestamp;

/// Health and connectivity snapshot. Mutated only by the owning adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub connected: bool,
    pub healthy: bool,
    pub last_sync: Option<Timestamp>,
    pub last_health_check: Option<Timestamp>,
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

/// Kinds of events an adapter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterEventType {
    Connected,
    Disconnected,
    Error,
    DeviceDiscovered,
    DeviceRemoved,
    StateChanged,
}

/// An event emitted by an adapter, consumable by any external observer
/// (audit log, UI, policy engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEvent {
    pub event_type: AdapterEventType,
    pub adapter_id: AdapterId,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AdapterEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: AdapterEventType,
        adapter_id: impl Into<AdapterId>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            adapter_id: adapter_id.into(),
            timestamp: crate::time::now(),
            data,
        }
    }
}
