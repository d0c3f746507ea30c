//! Device — a physical or virtual thing owned by exactly one adapter.
//!
//! The entity graph holds a reference copy that the owning adapter updates
//! via state-change notifications; the graph never writes back to adapters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilityType};
use crate::error::{UnihubError, ValidationError};
use crate::id::{AdapterId, AreaId, DeviceId};
use crate::time::Timestamp;

/// Broad device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Switch,
    Thermostat,
    Lock,
    Cover,
    MediaPlayer,
    Sensor,
    Camera,
    Fan,
    Vacuum,
    Generic,
}

/// A device discovered by an adapter, normalized to the canonical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Globally unique id, typically `{adapter_id}-{native_id}`.
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub device_type: DeviceType,
    pub area_id: Option<AreaId>,
    /// Ordered capability list; at most one capability per type.
    pub capabilities: Vec<Capability>,
    pub online: bool,
    pub last_seen: Timestamp,
    pub last_updated: Timestamp,
    /// The adapter that discovered and owns this device.
    pub adapter_id: AdapterId,
    /// Opaque id used to round-trip commands to the owning adapter.
    pub native_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Find the capability of the given type, if the device exposes it.
    #[must_use]
    pub fn capability(&self, capability_type: CapabilityType) -> Option<&Capability> {
        self.capabilities
            .iter()
            .find(|c| c.capability_type == capability_type)
    }

    /// Mutable variant of [`capability`](Self::capability).
    pub fn capability_mut(
        &mut self,
        capability_type: CapabilityType,
    ) -> Option<&mut Capability> {
        self.capabilities
            .iter_mut()
            .find(|c| c.capability_type == capability_type)
    }

    /// Carry capability state over from a previous snapshot of the same
    /// device. Only capabilities this snapshot still exposes keep their
    /// state; the capability set itself always follows `self`.
    pub fn adopt_states(&mut self, previous: &Self) {
        for cap in &mut self.capabilities {
            if cap.state.is_none() {
                if let Some(prev) = previous.capability(cap.capability_type) {
                    cap.state = prev.state.clone();
                }
            }
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] when the name, adapter id, or
    /// native id is empty, or when two capabilities share a type.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.adapter_id.as_str().is_empty() {
            return Err(ValidationError::EmptyId("adapter_id").into());
        }
        if self.native_id.is_empty() {
            return Err(ValidationError::EmptyId("native_id").into());
        }
        for (idx, cap) in self.capabilities.iter().enumerate() {
            if self.capabilities[..idx]
                .iter()
                .any(|c| c.capability_type == cap.capability_type)
            {
                return Err(
                    ValidationError::DuplicateCapability(cap.capability_type.as_str()).into(),
                );
            }
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    aliases: Vec<String>,
    device_type: Option<DeviceType>,
    area_id: Option<AreaId>,
    capabilities: Vec<Capability>,
    online: Option<bool>,
    adapter_id: Option<AdapterId>,
    native_id: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = Some(device_type);
        self
    }

    #[must_use]
    pub fn area_id(mut self, area_id: impl Into<AreaId>) -> Self {
        self.area_id = Some(area_id.into());
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    #[must_use]
    pub fn adapter_id(mut self, adapter_id: impl Into<AdapterId>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    #[must_use]
    pub fn native_id(mut self, native_id: impl Into<String>) -> Self {
        self.native_id = Some(native_id.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// The id defaults to [`DeviceId::scoped`] over the adapter and native
    /// ids when not set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] if invariants fail.
    pub fn build(self) -> Result<Device, UnihubError> {
        let adapter_id = self.adapter_id.unwrap_or_else(|| AdapterId::new(""));
        let native_id = self.native_id.unwrap_or_default();
        let id = self
            .id
            .unwrap_or_else(|| DeviceId::scoped(&adapter_id, &native_id));
        let now = crate::time::now();
        let device = Device {
            id,
            name: self.name.unwrap_or_default(),
            aliases: self.aliases,
            device_type: self.device_type.unwrap_or(DeviceType::Generic),
            area_id: self.area_id,
            capabilities: self.capabilities,
            online: self.online.unwrap_or(true),
            last_seen: now,
            last_updated: now,
            adapter_id,
            native_id,
            metadata: self.metadata,
        };
        device.validate()?;
        Ok(device)
    }
}
