//! Commands — the uniform write shapes adapters translate to native wire
//! operations. Constructed by the caller, consumed once, never persisted.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityType;
use crate::id::{DeviceId, SceneId};

/// A command targeting one capability of one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub device_id: DeviceId,
    pub capability: CapabilityType,
    /// Action verb, e.g. `turn_on`, `set_brightness`, `set_temperature`,
    /// `lock`, `open`.
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl DeviceCommand {
    /// Create a command with no parameters.
    #[must_use]
    pub fn new(
        device_id: impl Into<DeviceId>,
        capability: CapabilityType,
        action: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            capability,
            action: action.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Attach a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// A command activating a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneCommand {
    pub scene_id: SceneId,
}

impl SceneCommand {
    #[must_use]
    pub fn new(scene_id: impl Into<SceneId>) -> Self {
        Self {
            scene_id: scene_id.into(),
        }
    }
}
