//! # unihub-adapter-zigbee
//!
//! Zigbee bridge adapter. The bridge keeps its device table as retained
//! JSON on `{base}/bridge/devices`; per-device state arrives on
//! `{base}/{friendly_name}` and writes go to `{base}/{friendly_name}/set`.

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

use crate::config::ZigbeeConfig;
use crate::error::ZigbeeError;

/// Pause before re-polling the event loop after a connection error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Adapter for a zigbee bridge speaking MQTT.
pub struct ZigbeeAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    core: AdapterCore,
    config: ZigbeeConfig,
    client: Mutex<Option<AsyncClient>>,
    /// Bridge devices, keyed by friendly name.
    devices: Mutex<HashMap<String, Device>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ZigbeeAdapter {
    /// Build the adapter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the configuration is
    /// invalid; nothing is connected yet at this point.
    pub fn new(config: ZigbeeConfig) -> Result<Self, UnihubError> {
        config.validate()?;
        let reconnector = Reconnector::new(
            Duration::from_millis(config.reconnect_base_delay_ms),
            config.reconnect_max_attempts,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new("zigbee", reconnector),
                config,
                client: Mutex::new(None),
                devices: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        })
    }
}

impl Inner {
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
            .subscribe(format!("{base}/bridge/devices"), QoS::AtLeastOnce)
            .await
            .map_err(ZigbeeError::Client)?;
        client
            .subscribe(format!("{base}/+"), QoS::AtLeastOnce)
            .await
            .map_err(ZigbeeError::Client)?;

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
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    fn handle_publish(&self, publish: &Publish) {
        let base = &self.config.base_topic;
        if publish.topic == format!("{base}/bridge/devices") {
            self.handle_device_table(&publish.payload);
            return;
        }
        if let Some(friendly_name) = mapping::parse_state_topic(base, &publish.topic) {
            if self.config.filter.allows(friendly_name) {
                self.handle_state(friendly_name, &publish.payload);
            }
        }
    }

    /// Rebuild the device cache from the bridge table. The table is the
    /// source of truth; devices that left it are dropped.
    fn handle_device_table(&self, payload: &[u8]) {
        let entries: Vec<mapping::BridgeDevice> = match serde_json::from_slice(payload) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable bridge device table");
                return;
            }
        };
        let mut table = HashMap::new();
        for entry in &entries {
            if !self.config.filter.allows(&entry.friendly_name) {
                continue;
            }
            match mapping::device_from_bridge_device(self.core.id(), entry) {
                Ok(Some(device)) => {
                    table.insert(entry.friendly_name.clone(), device);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        friendly_name = %entry.friendly_name,
                        error = %err,
                        "invalid bridge table entry"
                    );
                }
            }
        }

        let mut devices = self.devices.lock().expect("devices lock poisoned");
        for (friendly_name, device) in &table {
            if let Some(known) = devices.get(friendly_name) {
                // The table owns the expose set; only reported state carries
                // over across a re-announcement.
                let mut refreshed = device.clone();
                refreshed.adopt_states(known);
                devices.insert(friendly_name.clone(), refreshed);
            } else {
                self.core.emit_device_discovered(&device.id, &device.name);
                devices.insert(friendly_name.clone(), device.clone());
            }
        }
        devices.retain(|friendly_name, _| table.contains_key(friendly_name));
    }

    fn handle_state(&self, friendly_name: &str, payload: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(friendly_name, error = %err, "unparseable state payload");
                return;
            }
        };
        let mut devices = self.devices.lock().expect("devices lock poisoned");
        let Some(device) = devices.get_mut(friendly_name) else {
            tracing::debug!(friendly_name, "state for unknown device");
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
                tracing::warn!(friendly_name, error = %err, "state merge failed");
            }
        }
    }

    fn client(&self) -> Result<AsyncClient, UnihubError> {
        self.client
            .lock()
            .expect("client lock poisoned")
            .clone()
            .ok_or_else(|| ZigbeeError::NotConnected.into())
    }

    fn friendly_name_for(&self, device_id: &DeviceId) -> Result<String, UnihubError> {
        let devices = self.devices.lock().expect("devices lock poisoned");
        devices
            .values()
            .find(|device| device.id == *device_id)
            .map(|device| device.native_id.clone())
            .ok_or_else(|| NotFoundError::new("device", device_id.as_str()).into())
    }
}

#[async_trait]
impl DeviceAdapter for ZigbeeAdapter {
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

    /// Snapshot of the bridge table. The table is retained, so a short
    /// window after subscribing is enough to receive it.
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
        let friendly_name = self.inner.friendly_name_for(&command.device_id)?;
        let payload = mapping::command_payload(command)?;
        let topic = mapping::command_topic(&self.inner.config.base_topic, &friendly_name);
        let bytes = serde_json::to_vec(&payload)
            .map_err(|err| UnihubError::Command(err.to_string()))?;
        client
            .publish(topic, QoS::AtLeastOnce, false, bytes)
            .await
            .map_err(|err| ZigbeeError::Client(err).into_domain())
    }

    /// The bridge pushes both the table and state; a live session is the
    /// health signal.
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

    fn adapter() -> ZigbeeAdapter {
        ZigbeeAdapter::new(ZigbeeConfig::default()).unwrap()
    }

    fn publish(topic: &str, payload: serde_json::Value) -> Publish {
        Publish::new(topic, QoS::AtLeastOnce, serde_json::to_vec(&payload).unwrap())
    }

    fn bridge_table() -> serde_json::Value {
        serde_json::json!([
            {
                "friendly_name": "hall_light",
                "ieee_address": "0x00124b0001aabbcc",
                "supported": true,
                "definition": {
                    "model": "LED1836G9",
                    "exposes": [
                        {
                            "type": "light",
                            "features": [
                                { "type": "binary", "property": "state" },
                                { "type": "numeric", "property": "brightness" }
                            ]
                        }
                    ]
                }
            },
            {
                "friendly_name": "coordinator",
                "ieee_address": "0x00124b0000000000",
                "supported": false
            }
        ])
    }

    #[test]
    fn should_reject_invalid_configuration() {
        let config = ZigbeeConfig {
            broker_host: String::new(),
            ..ZigbeeConfig::default()
        };
        assert!(matches!(
            ZigbeeAdapter::new(config),
            Err(UnihubError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_build_cache_from_bridge_table() {
        let adapter = adapter();
        let mut events = adapter.events();
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));

        let devices = adapter.discover_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id.as_str(), "zigbee-hall_light");
        assert_eq!(
            events.try_recv().unwrap().event_type,
            AdapterEventType::DeviceDiscovered
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_devices_that_left_the_table() {
        let adapter = adapter();
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", serde_json::json!([])));
        assert!(adapter.discover_devices().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_merge_state_from_friendly_name_topic() {
        let adapter = adapter();
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));
        let mut events = adapter.events();
        adapter.inner.handle_publish(&publish(
            "zigbee2mqtt/hall_light",
            serde_json::json!({ "state": "ON", "brightness": 254 }),
        ));

        let device = adapter
            .get_device_state(&DeviceId::from("zigbee-hall_light"))
            .await
            .unwrap();
        assert_eq!(
            device.capability(CapabilityType::Switch).unwrap().state,
            Some(CapabilityState::Switch { on: true })
        );
        assert_eq!(
            device.capability(CapabilityType::Dimmer).unwrap().state,
            Some(CapabilityState::Dimmer { brightness: 100 })
        );
        assert_eq!(
            events.try_recv().unwrap().event_type,
            AdapterEventType::StateChanged
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_state_across_table_refresh() {
        let adapter = adapter();
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));
        adapter.inner.handle_publish(&publish(
            "zigbee2mqtt/hall_light",
            serde_json::json!({ "state": "ON" }),
        ));
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));

        let device = adapter
            .get_device_state(&DeviceId::from("zigbee-hall_light"))
            .await
            .unwrap();
        assert_eq!(
            device.capability(CapabilityType::Switch).unwrap().state,
            Some(CapabilityState::Switch { on: true })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_follow_expose_set_changes_on_table_refresh() {
        let switch_only = serde_json::json!([
            {
                "friendly_name": "hall_light",
                "ieee_address": "0x00124b0001aabbcc",
                "supported": true,
                "definition": {
                    "model": "LED1836G9",
                    "exposes": [
                        { "type": "light", "features": [
                            { "type": "binary", "property": "state" }
                        ] }
                    ]
                }
            }
        ]);
        let adapter = adapter();
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", switch_only));
        adapter.inner.handle_publish(&publish(
            "zigbee2mqtt/hall_light",
            serde_json::json!({ "state": "ON" }),
        ));
        // A firmware update re-announces the device with a brightness expose.
        adapter
            .inner
            .handle_publish(&publish("zigbee2mqtt/bridge/devices", bridge_table()));

        let device = adapter
            .get_device_state(&DeviceId::from("zigbee-hall_light"))
            .await
            .unwrap();
        assert!(device.capability(CapabilityType::Dimmer).is_some());
        assert_eq!(
            device.capability(CapabilityType::Switch).unwrap().state,
            Some(CapabilityState::Switch { on: true })
        );
    }

    #[tokio::test]
    async fn should_fail_commands_for_unknown_devices() {
        let adapter = adapter();
        let command = DeviceCommand::new("zigbee-ghost", CapabilityType::Switch, "turn_on");
        let result = adapter.execute_command(&command).await;
        assert!(matches!(result, Err(UnihubError::Protocol(_))));
    }
}
