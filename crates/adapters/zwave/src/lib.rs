//! # unihub-adapter-zwave
//!
//! Z-Wave mesh hub adapter. The hub speaks a JSON command/response/event
//! protocol over a single WebSocket: requests carry a `messageId` the
//! response echoes back, and unsolicited `event` frames deliver value
//! updates from the mesh.

pub mod config;
pub mod error;
pub mod mapping;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use unihub_app::adapter_core::AdapterCore;
use unihub_app::ports::adapter::DeviceAdapter;
use unihub_app::reconnect::Reconnector;
use unihub_domain::adapter::{AdapterEvent, AdapterStatus};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::Device;
use unihub_domain::error::{NotFoundError, UnihubError};
use unihub_domain::id::{AdapterId, DeviceId};

use crate::config::ZwaveConfig;
use crate::error::ZwaveError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Adapter for a Z-Wave mesh hub behind a WebSocket.
pub struct ZwaveAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    core: AdapterCore,
    config: ZwaveConfig,
    /// Outbound frames; `None` until the session is up.
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// In-flight requests awaiting their response, keyed by message id.
    pending: Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value, String>>>>,
    next_message_id: AtomicU64,
    /// Mesh nodes, keyed by node id.
    devices: Mutex<HashMap<u32, Device>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ZwaveAdapter {
    /// Build the adapter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the configuration is
    /// invalid; nothing is connected yet at this point.
    pub fn new(config: ZwaveConfig) -> Result<Self, UnihubError> {
        config.validate()?;
        let reconnector = Reconnector::new(
            Duration::from_millis(config.reconnect_base_delay_ms),
            config.reconnect_max_attempts,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                core: AdapterCore::new("zwave", reconnector),
                config,
                sender: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_message_id: AtomicU64::new(1),
                devices: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>) -> Result<(), UnihubError> {
        let (stream, _response) = connect_async(self.config.url.as_str())
            .await
            .map_err(ZwaveError::WebSocket)?;
        self.install_session(stream);
        self.core.set_connected(true);
        self.refresh_nodes().await?;
        Ok(())
    }

    /// Split the socket into a writer fed by a channel and a reader that
    /// dispatches frames. Replaces any previous session tasks.
    fn install_session(self: &Arc<Self>, stream: WsStream) {
        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let inner = Arc::clone(self);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => inner.handle_frame(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        inner.core.record_error(err.to_string());
                        break;
                    }
                }
            }
            inner.core.set_connected(false);
            inner.fail_pending("connection lost");
        });

        *self.sender.lock().expect("sender lock poisoned") = Some(tx);
        let mut tasks = self.tasks.lock().expect("tasks lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
        tasks.push(writer);
        tasks.push(reader);
    }

    fn handle_frame(&self, text: &str) {
        let frame: serde_json::Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable hub frame");
                return;
            }
        };
        match frame.get("type").and_then(serde_json::Value::as_str) {
            Some("result") => self.handle_result(&frame),
            Some("event") => self.handle_event(&frame),
            other => {
                tracing::debug!(frame_type = ?other, "ignoring hub frame");
            }
        }
    }

    fn handle_result(&self, frame: &serde_json::Value) {
        let Some(message_id) = frame.get("messageId").and_then(serde_json::Value::as_str) else {
            tracing::warn!("result frame without messageId");
            return;
        };
        let Some(responder) = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(message_id)
        else {
            tracing::debug!(message_id, "result for unknown request");
            return;
        };
        let outcome = if frame.get("success").and_then(serde_json::Value::as_bool) == Some(true) {
            Ok(frame.get("result").cloned().unwrap_or(serde_json::Value::Null))
        } else {
            Err(frame
                .get("errorCode")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string())
        };
        let _ = responder.send(outcome);
    }

    fn handle_event(&self, frame: &serde_json::Value) {
        let Some(event) = frame.get("event") else {
            return;
        };
        if event.get("event").and_then(serde_json::Value::as_str) != Some("value updated") {
            return;
        }
        let Some(node_id) = event
            .get("nodeId")
            .and_then(serde_json::Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
        else {
            return;
        };
        let Some(args) = event.get("args") else {
            return;
        };
        let Some(command_class) = args
            .get("commandClass")
            .and_then(serde_json::Value::as_u64)
            .and_then(|class| u32::try_from(class).ok())
        else {
            return;
        };
        let property = args
            .get("property")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let new_value = args.get("newValue").cloned().unwrap_or(serde_json::Value::Null);

        let mut devices = self.devices.lock().expect("devices lock poisoned");
        let Some(device) = devices.get_mut(&node_id) else {
            tracing::debug!(node_id, "value update for unknown node");
            return;
        };
        if mapping::apply_value_update(device, command_class, property, &new_value).is_some() {
            let device_id = device.id.clone();
            drop(devices);
            self.core.emit_state_changed(
                &device_id,
                serde_json::json!({
                    "commandClass": command_class,
                    "property": property,
                    "value": new_value,
                }),
            );
        }
    }

    fn fail_pending(&self, reason: &str) {
        let pending: Vec<_> = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .drain()
            .collect();
        for (_, responder) in pending {
            let _ = responder.send(Err(reason.to_string()));
        }
    }

    /// Send one request and wait for its response.
    async fn request(
        &self,
        command: &str,
        mut payload: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, UnihubError> {
        let sender = self
            .sender
            .lock()
            .expect("sender lock poisoned")
            .clone()
            .ok_or(ZwaveError::NotConnected)?;

        let message_id = self
            .next_message_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        payload.insert(
            "messageId".to_string(),
            serde_json::Value::String(message_id.clone()),
        );
        payload.insert(
            "command".to_string(),
            serde_json::Value::String(command.to_string()),
        );

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(message_id.clone(), tx);

        let text = serde_json::to_string(&serde_json::Value::Object(payload))
            .map_err(|err| UnihubError::Command(err.to_string()))?;
        if sender.send(Message::Text(text)).is_err() {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&message_id);
            return Err(ZwaveError::NotConnected.into());
        }

        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(ZwaveError::RequestFailed {
                command: command.to_string(),
                message,
            }
            .into()),
            Ok(Err(_closed)) => Err(ZwaveError::NotConnected.into()),
            Err(_elapsed) => {
                self.pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&message_id);
                Err(ZwaveError::Timeout {
                    command: command.to_string(),
                }
                .into())
            }
        }
    }

    /// Pull the full mesh state and rebuild the node cache.
    async fn refresh_nodes(&self) -> Result<(), UnihubError> {
        let result = self.request("start_listening", serde_json::Map::new()).await?;
        let nodes: Vec<mapping::Node> = result
            .get("state")
            .and_then(|state| state.get("nodes"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(ZwaveError::PayloadParse)?
            .unwrap_or_default();

        let mut table = HashMap::new();
        for node in &nodes {
            if !self.config.filter.allows(&node.node_id.to_string()) {
                continue;
            }
            match mapping::device_from_node(self.core.id(), node) {
                Ok(Some(device)) => {
                    table.insert(node.node_id, device);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(node_id = node.node_id, error = %err, "invalid node");
                }
            }
        }

        let mut devices = self.devices.lock().expect("devices lock poisoned");
        for (node_id, device) in &table {
            if !devices.contains_key(node_id) {
                self.core.emit_device_discovered(&device.id, &device.name);
            }
            devices.insert(*node_id, device.clone());
        }
        devices.retain(|node_id, _| table.contains_key(node_id));
        drop(devices);
        self.core.mark_synced();
        Ok(())
    }

    fn node_id_for(&self, device_id: &DeviceId) -> Result<u32, UnihubError> {
        let devices = self.devices.lock().expect("devices lock poisoned");
        devices
            .iter()
            .find(|(_, device)| device.id == *device_id)
            .map(|(node_id, _)| *node_id)
            .ok_or_else(|| NotFoundError::new("device", device_id.as_str()).into())
    }
}

#[async_trait]
impl DeviceAdapter for ZwaveAdapter {
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
        let mut tasks = self.inner.tasks.lock().expect("tasks lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
        drop(tasks);
        *self.inner.sender.lock().expect("sender lock poisoned") = None;
        self.inner.fail_pending("adapter shut down");
        self.inner.core.set_connected(false);
        Ok(())
    }

    async fn discover_devices(&self) -> Result<Vec<Device>, UnihubError> {
        self.inner.refresh_nodes().await?;
        Ok(self
            .inner
            .devices
            .lock()
            .expect("devices lock poisoned")
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
        let node_id = self.inner.node_id_for(&command.device_id)?;
        let args = mapping::set_value_args(command)?;
        let mut payload = serde_json::Map::new();
        payload.insert("nodeId".to_string(), serde_json::json!(node_id));
        payload.insert(
            "commandClass".to_string(),
            serde_json::json!(args.command_class),
        );
        payload.insert("property".to_string(), serde_json::json!(args.property));
        payload.insert("value".to_string(), args.value);
        self.inner.request("node.set_value", payload).await.map(|_| ())
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
