//! # unihub-adapter-hubapi
//!
//! Home-hub API adapter. Discovery and commands go over REST
//! (`GET /api/states`, `POST /api/services/{domain}/{service}`); state
//! updates arrive over the hub's WebSocket `state_changed` subscription.
//! Both sides authenticate with a long-lived bearer token.

pub mod config;
pub mod error;
pub mod mapping;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use unihub_app::adapter_core::AdapterCore;
use unihub_app::ports::adapter::DeviceAdapter;
use unihub_app::reconnect::Reconnector;
use unihub_domain::adapter::{AdapterEvent, AdapterStatus};
use unihub_domain::command::{DeviceCommand, SceneCommand};
use unihub_domain::device::Device;
use unihub_domain::error::{NotFoundError, UnihubError};
use unihub_domain::id::{AdapterId, DeviceId};
use unihub_domain::scene::Scene;

use crate::config::HubApiConfig;
use crate::error::HubApiError;
use crate::mapping::HubState;

/// Adapter for a home hub exposing a REST + WebSocket API.
pub struct HubApiAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    core: AdapterCore,
    config: HubApiConfig,
    http: reqwest::Client,
    /// Hub entities, keyed by entity id.
    devices: Mutex<HashMap<String, Device>>,
    /// Hub scenes, keyed by entity id.
    scenes: Mutex<HashMap<String, Scene>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl HubApiAdapter {
    /// Build the adapter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the configuration is
    /// invalid or the HTTP client cannot be built; nothing is connected yet
    /// at this point.
    pub fn new(config: HubApiConfig) -> Result<Self, UnihubError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| UnihubError::Configuration(err.to_string()))?;
        let reconnector = Reconnector::new(
            Duration::from_millis(config.reconnect_base_delay_ms),
            config.reconnect_max_attempts,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new("hubapi", reconnector),
                config,
                http,
                devices: Mutex::new(HashMap::new()),
                scenes: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        })
    }
}

impl Inner {
    /// Verify REST access, then start the WebSocket listener.
    async fn connect(self: &Arc<Self>) -> Result<(), UnihubError> {
        self.fetch_states().await?;
        let stream = self.open_event_stream().await?;
        let task = tokio::spawn(Arc::clone(self).listen(stream));
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

    async fn fetch_states(&self) -> Result<Vec<HubState>, UnihubError> {
        let response = self
            .http
            .get(self.config.api_url("states"))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(HubApiError::Http)?;
        response
            .json::<Vec<HubState>>()
            .await
            .map_err(|err| HubApiError::Http(err).into())
    }

    /// Complete the WebSocket auth handshake and subscribe to state
    /// changes.
    async fn open_event_stream(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        UnihubError,
    > {
        let url = self.config.websocket_url();
        let (mut stream, _response) = connect_async(url.as_str())
            .await
            .map_err(HubApiError::WebSocket)?;

        // auth_required → auth → auth_ok
        let _greeting = stream.next().await;
        let auth = serde_json::json!({
            "type": "auth",
            "access_token": self.config.token,
        });
        stream
            .send(Message::Text(auth.to_string()))
            .await
            .map_err(HubApiError::WebSocket)?;
        let reply = stream
            .next()
            .await
            .ok_or_else(|| HubApiError::AuthRejected("connection closed".to_string()))?
            .map_err(HubApiError::WebSocket)?;
        let reply: serde_json::Value = match &reply {
            Message::Text(text) => {
                serde_json::from_str(text).map_err(HubApiError::PayloadParse)?
            }
            other => {
                return Err(HubApiError::AuthRejected(format!(
                    "unexpected frame {other:?}"
                ))
                .into());
            }
        };
        if reply.get("type").and_then(serde_json::Value::as_str) != Some("auth_ok") {
            return Err(HubApiError::AuthRejected(
                reply
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("auth not acknowledged")
                    .to_string(),
            )
            .into());
        }

        let subscribe = serde_json::json!({
            "id": 1,
            "type": "subscribe_events",
            "event_type": "state_changed",
        });
        stream
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(HubApiError::WebSocket)?;
        Ok(stream)
    }

    async fn listen(
        self: Arc<Self>,
        mut stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&text),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    self.core.record_error(err.to_string());
                    break;
                }
            }
        }
        self.core.set_connected(false);
    }

    fn handle_frame(&self, text: &str) {
        let frame: serde_json::Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable hub frame");
                return;
            }
        };
        if frame.get("type").and_then(serde_json::Value::as_str) != Some("event") {
            return;
        }
        let Some(new_state) = frame
            .get("event")
            .and_then(|event| event.get("data"))
            .and_then(|data| data.get("new_state"))
        else {
            return;
        };
        let state: HubState = match serde_json::from_value(new_state.clone()) {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(error = %err, "unparseable state_changed payload");
                return;
            }
        };
        if !self.config.filter.allows(&state.entity_id) {
            return;
        }

        let mut devices = self.devices.lock().expect("devices lock poisoned");
        let Some(device) = devices.get_mut(&state.entity_id) else {
            return;
        };
        if !mapping::apply_state(device, &state).is_empty() {
            let device_id = device.id.clone();
            drop(devices);
            self.core.emit_state_changed(
                &device_id,
                serde_json::json!({
                    "entity_id": state.entity_id,
                    "state": state.state,
                }),
            );
        }
    }

    /// Rebuild both caches from a full `/api/states` snapshot.
    fn ingest_states(&self, states: &[HubState]) {
        let mut device_table = HashMap::new();
        let mut scene_table = HashMap::new();
        for state in states {
            if !self.config.filter.allows(&state.entity_id) {
                continue;
            }
            match mapping::device_from_state(self.core.id(), state) {
                Ok(Some(device)) => {
                    device_table.insert(state.entity_id.clone(), device);
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(entity_id = %state.entity_id, error = %err, "invalid entity");
                    continue;
                }
            }
            match mapping::scene_from_state(self.core.id(), state) {
                Ok(Some(scene)) => {
                    scene_table.insert(state.entity_id.clone(), scene);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(entity_id = %state.entity_id, error = %err, "invalid scene");
                }
            }
        }

        let mut devices = self.devices.lock().expect("devices lock poisoned");
        for (entity_id, device) in &device_table {
            if !devices.contains_key(entity_id) {
                self.core.emit_device_discovered(&device.id, &device.name);
            }
            devices.insert(entity_id.clone(), device.clone());
        }
        devices.retain(|entity_id, _| device_table.contains_key(entity_id));
        drop(devices);

        *self.scenes.lock().expect("scenes lock poisoned") = scene_table;
        self.core.mark_synced();
    }

    async fn call_service(&self, call: &mapping::ServiceCall) -> Result<(), UnihubError> {
        let url = self
            .config
            .api_url(&format!("services/{}/{}", call.domain, call.service));
        self.http
            .post(url)
            .bearer_auth(&self.config.token)
            .json(&call.body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(HubApiError::Http)?;
        Ok(())
    }

    fn entity_id_for(&self, device_id: &DeviceId) -> Result<String, UnihubError> {
        let devices = self.devices.lock().expect("devices lock poisoned");
        devices
            .values()
            .find(|device| device.id == *device_id)
            .map(|device| device.native_id.clone())
            .ok_or_else(|| NotFoundError::new("device", device_id.as_str()).into())
    }
}

#[async_trait]
impl DeviceAdapter for HubApiAdapter {
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
        self.inner.core.set_connected(false);
        Ok(())
    }

    async fn discover_devices(&self) -> Result<Vec<Device>, UnihubError> {
        let states = self.inner.fetch_states().await?;
        self.inner.ingest_states(&states);
        Ok(self
            .inner
            .devices
            .lock()
            .expect("devices lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn discover_scenes(&self) -> Result<Vec<Scene>, UnihubError> {
        let states = self.inner.fetch_states().await?;
        self.inner.ingest_states(&states);
        Ok(self
            .inner
            .scenes
            .lock()
            .expect("scenes lock poisoned")
            .values()
            .cloned()
            .collect())
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
        let entity_id = self.inner.entity_id_for(&command.device_id)?;
        let call = mapping::service_call(command, &entity_id)?;
        self.inner.call_service(&call).await
    }

    #[tracing::instrument(skip(self, command), fields(scene_id = %command.scene_id))]
    async fn execute_scene(&self, command: &SceneCommand) -> Result<(), UnihubError> {
        let entity_id = {
            let scenes = self.inner.scenes.lock().expect("scenes lock poisoned");
            scenes
                .values()
                .find(|scene| scene.id == command.scene_id)
                .map(|scene| scene.native_id.clone())
                .ok_or_else(|| NotFoundError::new("scene", command.scene_id.as_str()))?
        };
        let call = mapping::ServiceCall {
            domain: "scene".to_string(),
            service: "turn_on".to_string(),
            body: serde_json::json!({ "entity_id": entity_id }),
        };
        self.inner.call_service(&call).await
    }

    /// REST reachability is the health signal; the WebSocket only carries
    /// pushes.
    async fn health_check(&self) -> bool {
        let healthy = self.inner.fetch_states().await.is_ok();
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
