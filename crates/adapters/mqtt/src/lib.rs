//! # unihub-adapter-mqtt
//!
//! Generic MQTT bus adapter. Devices announce themselves with a retained
//! JSON payload on `{base}/{native_id}/config`, publish partial state on
//! `{base}/{native_id}/state`, and accept commands on
//! `{base}/{native_id}/set`.

pub mod config;
pub mod error;
pub mod mapping;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use unihub_app::adapter_core::AdapterCore;
use unihub_app::ports::adapter::DeviceAdapter;
use unihub_app::reconnect::Reconnector;
use unihub_domain::adapter::{AdapterEvent, AdapterStatus};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::Device;
use unihub_domain::error::{NotFoundError, UnihubError};
use unihub_domain::id::{AdapterId, DeviceId};

use crate::config::MqttConfig;
use crate::error::MqttError;
use crate::mapping::TopicKind;

/// Pause before re-polling the event loop after a connection error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Adapter for a generic MQTT device bus.
pub struct MqttAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    core: AdapterCore,
    config: MqttConfig,
    client: Mutex<Option<AsyncClient>>,
    /// Devices seen on the bus, keyed by native id.
    devices: Mutex<HashMap<String, Device>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl MqttAdapter {
    /// Build the adapter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the configuration is
    /// invalid; nothing is connected yet at this point.
    pub fn new(config: MqttConfig) -> Result<Self, UnihubError> {
        config.validate()?;
        let reconnector = Reconnector::new(
            Duration::from_millis(config.reconnect_base_delay_ms),
            config.reconnect_max_attempts,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new("mqtt", reconnector),
                config,
                client: Mutex::new(None),
                devices: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        })
    }
}

impl Inner {
    /// Create a fresh client, queue the subscriptions, and hand the event
    /// loop to a background poll task.
    async fn connect(self: &Arc<Self>) -> Result<(), UnihubError> {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(self.config.keep_alive_secs)));
        let (client, event_loop) = AsyncClient::new(options, 64);

        let base = &self.config.base_topic;
        client
            .subscribe(format!("{base}/+/config"), QoS::AtLeastOnce)
            .await
            .map_err(MqttError::Client)?;
        client
            .subscribe(format!("{base}/+/state"), QoS::AtLeastOnce)
            .await
            .map_err(MqttError::Client)?;

        *self.client.lock().expect("client lock poisoned") = Some(client);
        let task = tokio::spawn(Arc::clone(self).poll_loop(event_loop));
        if let Some(previous) = self
            .listener
            .lock()
            .expect("listener lock poisoned")
            .replace(task)
        {
            previous.abort();
        }
        self.core.set_connected(true);
        Ok(())
    }

    async fn poll_loop(self: Arc<Self>, mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => self.core.set_connected(true),
                Ok(Event::Incoming(Packet::Publish(publish))) => self.handle_publish(&publish),
                Ok(_) => {}
                Err(err) => {
                    self.core.set_connected(false);
                    self.core.record_error(err.to_string());
                    // rumqttc retries the connection on the next poll.
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    fn handle_publish(&self, publish: &Publish) {
        let Some((native_id, kind)) = mapping::parse_topic(&self.config.base_topic, &publish.topic)
        else {
            return;
        };
        if !self.config.filter.allows(native_id) {
            return;
        }
        match kind {
            TopicKind::Config => self.handle_announcement(native_id, &publish.payload),
            TopicKind::State => self.handle_state(native_id, &publish.payload),
        }
    }

    fn handle_announcement(&self, native_id: &str, payload: &[u8]) {
        // An empty retained payload retracts the announcement.
        if payload.is_empty() {
            let removed = self
                .devices
                .lock()
                .expect("devices lock poisoned")
                .remove(native_id);
            if removed.is_some() {
                tracing::info!(adapter_id = %self.core.id(), native_id, "device retracted");
            }
            return;
        }
        let announcement: mapping::Announcement = match serde_json::from_slice(payload) {
            Ok(announcement) => announcement,
            Err(err) => {
                tracing::warn!(native_id, error = %err, "unparseable announcement");
                return;
            }
        };
        match mapping::device_from_announcement(self.core.id(), native_id, &announcement) {
            Ok(Some(mut device)) => {
                // Retained announcements are re-delivered on every reconnect;
                // carry state over and only report genuinely new devices.
                let mut devices = self.devices.lock().expect("devices lock poisoned");
                match devices.get(native_id) {
                    Some(known) => device.adopt_states(known),
                    None => self.core.emit_device_discovered(&device.id, &device.name),
                }
                devices.insert(native_id.to_string(), device);
            }
            Ok(None) => {
                tracing::debug!(native_id, "announcement has no mappable capability");
            }
            Err(err) => {
                tracing::warn!(native_id, error = %err, "invalid announcement");
            }
        }
    }

    fn handle_state(&self, native_id: &str, payload: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(native_id, error = %err, "unparseable state payload");
                return;
            }
        };
        let mut devices = self.devices.lock().expect("devices lock poisoned");
        let Some(device) = devices.get_mut(native_id) else {
            tracing::debug!(native_id, "state for unannounced device");
            return;
        };
        match mapping::apply_state(device, &value) {
            Ok(changed) if changed.is_empty() => {}
            Ok(_) => {
                let device_id = device.id.clone();
                drop(devices);
                self.core.emit_state_changed(&device_id, value);
            }
            Err(err) => {
                tracing::warn!(native_id, error = %err, "state merge failed");
            }
        }
    }

    fn client(&self) -> Result<AsyncClient, UnihubError> {
        self.client
            .lock()
            .expect("client lock poisoned")
            .clone()
            .ok_or_else(|| MqttError::NotConnected.into())
    }

    /// Native id a command should be routed to: the cached device's, or the
    /// scoped-id prefix stripped for devices not yet announced.
    fn native_id_for(&self, device_id: &DeviceId) -> Result<String, UnihubError> {
        let devices = self.devices.lock().expect("devices lock poisoned");
        if let Some(device) = devices.values().find(|device| device.id == *device_id) {
            return Ok(device.native_id.clone());
        }
        let prefix = format!("{}-", self.core.id());
        device_id
            .as_str()
            .strip_prefix(&prefix)
            .map(ToString::to_string)
            .ok_or_else(|| NotFoundError::new("device", device_id.as_str()).into())
    }
}

#[async_trait]
impl DeviceAdapter for MqttAdapter {
    fn id(&self) -> &AdapterId {
        self.inner.core.id()
    }

    fn status(&self) -> AdapterStatus {
        self.inner.core.status()
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.inner.core.subscribe()
    }

    #[tracing::instrument(skip(self), fields(adapter_id = %self.inner.core.id()))]
    async fn initialize(&self) -> Result<(), UnihubError> {
        self.inner.connect().await
    }

    async fn shutdown(&self) -> Result<(), UnihubError> {
        if let Some(task) = self
            .inner
            .listener
            .lock()
            .expect("listener lock poisoned")
            .take()
        {
            task.abort();
        }
        let client = self
            .inner
            .client
            .lock()
            .expect("client lock poisoned")
            .take();
        if let Some(client) = client {
            if let Err(err) = client.disconnect().await {
                tracing::debug!(error = %err, "disconnect after shutdown failed");
            }
        }
        self.inner.core.set_connected(false);
        Ok(())
    }

    /// Snapshot of the devices announced on the bus. Announcements are
    /// retained, so a short window after subscribing is enough to collect
    /// them.
    async fn discover_devices(&self) -> Result<Vec<Device>, UnihubError> {
        tokio::time::sleep(Duration::from_millis(self.inner.config.discovery_window_ms)).await;
        let devices: Vec<Device> = self
            .inner
            .devices
            .lock()
            .expect("devices lock poisoned")
            .values()
            .cloned()
            .collect();
        self.inner.core.mark_synced();
        Ok(devices)
    }

    async fn get_device_state(&self, device_id: &DeviceId) -> Result<Device, UnihubError> {
        self.inner
            .devices
            .lock()
            .expect("devices lock poisoned")
            .values()
            .find(|device| device.id == *device_id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("device", device_id.as_str()).into())
    }

    #[tracing::instrument(skip(self, command), fields(device_id = %command.device_id, action = %command.action))]
    async fn execute_command(&self, command: &DeviceCommand) -> Result<(), UnihubError> {
        let client = self.inner.client()?;
        let native_id = self.inner.native_id_for(&command.device_id)?;
        let topic = mapping::command_topic(&self.inner.config.base_topic, &native_id);
        let payload = serde_json::to_vec(&mapping::command_payload(command))
            .map_err(|err| UnihubError::Command(err.to_string()))?;
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| MqttError::Client(err).into_domain())
    }

    /// A live broker session is the health signal here; the bus pushes
    /// state, there is nothing to poll.
    async fn health_check(&self) -> bool {
        let healthy = self.inner.core.status().connected;
        self.inner.core.mark_health_check(healthy);
        healthy
    }

    async fn reconnect(&self) -> Result<(), UnihubError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .core
            .run_reconnect(move || {
                let inner = Arc::clone(&inner);
                async move { inner.connect().await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unihub_domain::adapter::AdapterEventType;
    use unihub_domain::capability::{CapabilityState, CapabilityType};

    fn adapter() -> MqttAdapter {
        MqttAdapter::new(MqttConfig::default()).unwrap()
    }

    fn publish(topic: &str, payload: serde_json::Value) -> Publish {
        Publish::new(topic, QoS::AtLeastOnce, serde_json::to_vec(&payload).unwrap())
    }

    #[test]
    fn should_reject_invalid_configuration() {
        let config = MqttConfig {
            base_topic: String::new(),
            ..MqttConfig::default()
        };
        assert!(matches!(
            MqttAdapter::new(config),
            Err(UnihubError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_collect_announced_devices() {
        let adapter = adapter();
        let mut events = adapter.events();
        adapter.inner.handle_publish(&publish(
            "unihub/plug-1/config",
            serde_json::json!({ "name": "Plug", "capabilities": ["switch"] }),
        ));

        let devices = adapter.discover_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id.as_str(), "mqtt-plug-1");

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, AdapterEventType::DeviceDiscovered);
    }

    #[tokio::test(start_paused = true)]
    async fn should_apply_partial_state_and_emit_event() {
        let adapter = adapter();
        adapter.inner.handle_publish(&publish(
            "unihub/lamp-1/config",
            serde_json::json!({ "name": "Lamp", "capabilities": ["switch", "dimmer"] }),
        ));
        let mut events = adapter.events();
        adapter.inner.handle_publish(&publish(
            "unihub/lamp-1/state",
            serde_json::json!({ "dimmer": { "brightness": 42 } }),
        ));

        let device = adapter
            .get_device_state(&DeviceId::from("mqtt-lamp-1"))
            .await
            .unwrap();
        assert_eq!(
            device.capability(CapabilityType::Dimmer).unwrap().state,
            Some(CapabilityState::Dimmer { brightness: 42 })
        );
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, AdapterEventType::StateChanged);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_state_when_retained_announcement_is_redelivered() {
        let adapter = adapter();
        adapter.inner.handle_publish(&publish(
            "unihub/lamp-1/config",
            serde_json::json!({ "name": "Lamp", "capabilities": ["switch", "dimmer"] }),
        ));
        adapter.inner.handle_publish(&publish(
            "unihub/lamp-1/state",
            serde_json::json!({ "switch": { "on": true } }),
        ));
        let mut events = adapter.events();
        // The broker re-delivers the retained announcement on reconnect.
        adapter.inner.handle_publish(&publish(
            "unihub/lamp-1/config",
            serde_json::json!({ "name": "Lamp", "capabilities": ["switch", "dimmer"] }),
        ));

        let device = adapter
            .get_device_state(&DeviceId::from("mqtt-lamp-1"))
            .await
            .unwrap();
        assert_eq!(
            device.capability(CapabilityType::Switch).unwrap().state,
            Some(CapabilityState::Switch { on: true })
        );
        assert!(matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_honor_device_filter() {
        let config = MqttConfig {
            filter: unihub_app::filter::DeviceFilter {
                exclude: vec!["plug-1".to_string()],
                ..Default::default()
            },
            ..MqttConfig::default()
        };
        let adapter = MqttAdapter::new(config).unwrap();
        adapter.inner.handle_publish(&publish(
            "unihub/plug-1/config",
            serde_json::json!({ "name": "Plug", "capabilities": ["switch"] }),
        ));
        assert!(adapter.discover_devices().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_retract_device_on_empty_announcement() {
        let adapter = adapter();
        adapter.inner.handle_publish(&publish(
            "unihub/plug-1/config",
            serde_json::json!({ "name": "Plug", "capabilities": ["switch"] }),
        ));
        adapter
            .inner
            .handle_publish(&Publish::new("unihub/plug-1/config", QoS::AtLeastOnce, ""));
        assert!(adapter.discover_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_fail_commands_before_initialization() {
        let adapter = adapter();
        let command = DeviceCommand::new("mqtt-plug-1", CapabilityType::Switch, "turn_on");
        let result = adapter.execute_command(&command).await;
        assert!(matches!(result, Err(UnihubError::Protocol(_))));
    }

    #[tokio::test]
    async fn should_strip_scoped_prefix_for_unannounced_devices() {
        let adapter = adapter();
        let native_id = adapter
            .inner
            .native_id_for(&DeviceId::from("mqtt-plug-9"))
            .unwrap();
        assert_eq!(native_id, "plug-9");
        assert!(
            adapter
                .inner
                .native_id_for(&DeviceId::from("zigbee-plug-9"))
                .is_err()
        );
    }
}
