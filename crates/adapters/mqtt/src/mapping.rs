//! Pure translation between bus payloads and the canonical model.
//!
//! Topic layout: `{base}/{native_id}/config` carries a retained JSON
//! announcement, `{base}/{native_id}/state` carries partial state updates,
//! and the adapter publishes commands to `{base}/{native_id}/set`.

use serde::Deserialize;

use unihub_domain::capability::{Capability, CapabilityState, CapabilityType};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::{Device, DeviceType};
use unihub_domain::error::UnihubError;
use unihub_domain::id::AdapterId;

use crate::error::MqttError;

/// Retained self-description a device publishes on its `config` topic.
#[derive(Debug, Clone, Deserialize)]
pub struct Announcement {
    pub name: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// What a topic under the base prefix refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Config,
    State,
}

/// Split `{base}/{native_id}/config|state` into its parts. Returns `None`
/// for topics outside the layout, including native ids with extra levels.
#[must_use]
pub fn parse_topic<'a>(base: &str, topic: &'a str) -> Option<(&'a str, TopicKind)> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    let (native_id, leaf) = rest.split_once('/')?;
    if native_id.is_empty() || native_id.contains('/') {
        return None;
    }
    match leaf {
        "config" => Some((native_id, TopicKind::Config)),
        "state" => Some((native_id, TopicKind::State)),
        _ => None,
    }
}

/// Topic the adapter publishes canonical commands to.
#[must_use]
pub fn command_topic(base: &str, native_id: &str) -> String {
    format!("{base}/{native_id}/set")
}

fn capability_type_from_name(name: &str) -> Option<CapabilityType> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}

/// Broad classification derived from the capability set; the first matching
/// rule wins.
fn device_type_for(capabilities: &[Capability]) -> DeviceType {
    let has = |wanted: CapabilityType| {
        capabilities
            .iter()
            .any(|capability| capability.capability_type == wanted)
    };
    if has(CapabilityType::ColorLight) || has(CapabilityType::Dimmer) {
        DeviceType::Light
    } else if has(CapabilityType::Thermostat) {
        DeviceType::Thermostat
    } else if has(CapabilityType::Lock) {
        DeviceType::Lock
    } else if has(CapabilityType::Cover) {
        DeviceType::Cover
    } else if has(CapabilityType::MediaPlayer) {
        DeviceType::MediaPlayer
    } else if has(CapabilityType::Switch) {
        DeviceType::Switch
    } else if has(CapabilityType::Sensor) {
        DeviceType::Sensor
    } else {
        DeviceType::Generic
    }
}

/// Build a canonical device from an announcement.
///
/// Unknown capability names are skipped with a warning; duplicates collapse
/// to the first occurrence. Returns `Ok(None)` when nothing mappable
/// remains.
///
/// # Errors
///
/// Returns [`UnihubError::Validation`] when the announcement carries an
/// empty name.
pub fn device_from_announcement(
    adapter_id: &AdapterId,
    native_id: &str,
    announcement: &Announcement,
) -> Result<Option<Device>, UnihubError> {
    let mut capabilities: Vec<Capability> = Vec::new();
    for name in &announcement.capabilities {
        let Some(capability_type) = capability_type_from_name(name) else {
            tracing::warn!(native_id, capability = %name, "unknown capability name");
            continue;
        };
        if capabilities
            .iter()
            .any(|existing| existing.capability_type == capability_type)
        {
            continue;
        }
        capabilities.push(Capability::unknown(capability_type));
    }
    if capabilities.is_empty() {
        return Ok(None);
    }

    let mut builder = Device::builder()
        .name(&announcement.name)
        .device_type(device_type_for(&capabilities))
        .capabilities(capabilities)
        .online(true)
        .adapter_id(adapter_id.clone())
        .native_id(native_id);
    if let Some(area) = &announcement.area {
        builder = builder.area_id(area.as_str());
    }
    builder.build().map(Some)
}

/// Merge a partial state payload into the device.
///
/// The payload is an object keyed by capability type name; only the
/// capabilities whose keys are present are touched. Returns the types whose
/// state actually changed.
///
/// # Errors
///
/// Returns [`MqttError::PayloadParse`] when the payload is not an object or
/// an entry does not decode as the state shape of its key.
pub fn apply_state(
    device: &mut Device,
    payload: &serde_json::Value,
) -> Result<Vec<CapabilityType>, MqttError> {
    let entries = payload.as_object().ok_or_else(|| {
        MqttError::PayloadParse(serde::de::Error::custom("state payload must be an object"))
    })?;

    let mut changed = Vec::new();
    for (key, value) in entries {
        let Some(capability_type) = capability_type_from_name(key) else {
            tracing::debug!(device_id = %device.id, key, "ignoring unknown state key");
            continue;
        };
        let Some(capability) = device.capability_mut(capability_type) else {
            tracing::debug!(
                device_id = %device.id,
                capability = %capability_type,
                "state for unannounced capability"
            );
            continue;
        };
        // Re-tag the entry so it decodes as the internally-tagged enum.
        let mut tagged = value
            .as_object()
            .cloned()
            .ok_or_else(|| {
                MqttError::PayloadParse(serde::de::Error::custom("state entry must be an object"))
            })?;
        tagged.insert(
            "type".to_string(),
            serde_json::Value::String(key.to_string()),
        );
        let state: CapabilityState = serde_json::from_value(serde_json::Value::Object(tagged))
            .map_err(MqttError::PayloadParse)?;
        if capability.state.as_ref() != Some(&state) {
            capability
                .set_state(state)
                .map_err(|err| MqttError::Domain(err.into()))?;
            changed.push(capability_type);
        }
    }
    Ok(changed)
}

/// Flatten a canonical command into the `{action, ...params}` wire shape.
#[must_use]
pub fn command_payload(command: &DeviceCommand) -> serde_json::Value {
    let mut payload = serde_json::Map::with_capacity(command.params.len() + 1);
    payload.insert(
        "action".to_string(),
        serde_json::Value::String(command.action.clone()),
    );
    for (key, value) in &command.params {
        payload.insert(key.clone(), value.clone());
    }
    serde_json::Value::Object(payload)
}
