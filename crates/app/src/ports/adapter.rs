//! Adapter port — the lifecycle and command contract every protocol
//! integration implements.
//!
//! An adapter owns exactly one outbound connection (broker client, bridge
//! subscriber, mesh-hub socket, REST/WebSocket client), discovers native
//! devices, maps native attributes to canonical capabilities, and translates
//! canonical commands into native write operations.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use unihub_domain::adapter::{AdapterEvent, AdapterStatus};
use unihub_domain::area::Area;
use unihub_domain::command::{DeviceCommand, SceneCommand};
use unihub_domain::device::Device;
use unihub_domain::error::UnihubError;
use unihub_domain::id::{AdapterId, DeviceId};
use unihub_domain::scene::Scene;

/// Default spacing between scheduled health checks.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The closed contract over a fixed set of protocol integrations.
///
/// Lifecycle: construction (configuration errors fail here, before the
/// manager accepts the adapter) → [`initialize`](Self::initialize) →
/// discovery / command traffic → [`shutdown`](Self::shutdown).
/// Internal errors are captured on the adapter's [`AdapterStatus`] and
/// emitted as `error` events rather than thrown across the manager
/// boundary — except command execution, which propagates as an `Err` to the
/// original caller.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Stable identifier for this adapter instance.
    fn id(&self) -> &AdapterId;

    /// Current health/connectivity snapshot.
    fn status(&self) -> AdapterStatus;

    /// Subscribe to this adapter's event stream. Dropping the receiver
    /// unsubscribes.
    fn events(&self) -> broadcast::Receiver<AdapterEvent>;

    /// Open the protocol connection and start background listeners.
    async fn initialize(&self) -> Result<(), UnihubError>;

    /// Close the connection and stop background tasks.
    async fn shutdown(&self) -> Result<(), UnihubError>;

    /// Enumerate native devices, normalized to the canonical model.
    /// Devices that map to zero capabilities are already dropped.
    async fn discover_devices(&self) -> Result<Vec<Device>, UnihubError>;

    /// Enumerate native scenes. Protocols without scenes return an empty
    /// list.
    async fn discover_scenes(&self) -> Result<Vec<Scene>, UnihubError> {
        Ok(Vec::new())
    }

    /// Enumerate native areas. Protocols without area metadata return an
    /// empty list.
    async fn discover_areas(&self) -> Result<Vec<Area>, UnihubError> {
        Ok(Vec::new())
    }

    /// Fresh snapshot of one device.
    async fn get_device_state(&self, device_id: &DeviceId) -> Result<Device, UnihubError>;

    /// Translate a canonical command into the native write operation.
    /// At-least-once intent forwarding with explicit failure reporting; no
    /// mid-flight cancellation.
    async fn execute_command(&self, command: &DeviceCommand) -> Result<(), UnihubError>;

    /// Activate a scene.
    async fn execute_scene(&self, command: &SceneCommand) -> Result<(), UnihubError> {
        Err(UnihubError::Command(format!(
            "adapter {} does not support scenes (scene {})",
            self.id(),
            command.scene_id
        )))
    }

    /// Re-synchronize cached state with the native side.
    async fn refresh(&self) -> Result<(), UnihubError> {
        self.discover_devices().await.map(|_| ())
    }

    /// Probe adapter health. Default: a successful [`discover_devices`]
    /// call means healthy; any failure means unhealthy, regardless of the
    /// error type.
    async fn health_check(&self) -> bool {
        self.discover_devices().await.is_ok()
    }

    /// Re-establish the connection with exponential backoff. A second call
    /// while a reconnect loop is in flight is a no-op; a call after the
    /// adapter gave up resets the attempt counter and tries again.
    async fn reconnect(&self) -> Result<(), UnihubError>;

    /// How often the scheduled health check should run.
    fn health_check_interval(&self) -> Duration {
        DEFAULT_HEALTH_CHECK_INTERVAL
    }
}
