//! Pure translation between hub node payloads and the canonical model.
//!
//! Nodes advertise command classes; each supported class maps to one
//! capability, first match wins. The three thermostat classes collapse into
//! a single Thermostat capability. Multilevel values use the native 0–99
//! scale.

use serde::Deserialize;

use unihub_domain::capability::{Capability, CapabilityState, CapabilityType};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::{Device, DeviceType};
use unihub_domain::error::UnihubError;
use unihub_domain::id::AdapterId;

use crate::error::ZwaveError;

pub const CC_BINARY_SWITCH: u32 = 0x25;
pub const CC_MULTILEVEL_SWITCH: u32 = 0x26;
pub const CC_SENSOR_MULTILEVEL: u32 = 0x31;
pub const CC_COLOR_SWITCH: u32 = 0x33;
pub const CC_THERMOSTAT_MODE: u32 = 0x40;
pub const CC_THERMOSTAT_SETPOINT: u32 = 0x43;
pub const CC_THERMOSTAT_FAN_MODE: u32 = 0x44;
pub const CC_DOOR_LOCK: u32 = 0x62;
pub const CC_BARRIER_OPERATOR: u32 = 0x66;

/// Native multilevel ceiling.
const NATIVE_LEVEL_MAX: f64 = 99.0;

/// One node of the hub's mesh.
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "nodeId")]
    pub node_id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub values: Vec<NodeValue>,
}

/// One value entry of a node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeValue {
    #[serde(rename = "commandClass")]
    pub command_class: u32,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Canonical level (0–100) from the native 0–99 scale.
#[must_use]
pub fn level_from_native(native: f64) -> u8 {
    let clamped = native.clamp(0.0, NATIVE_LEVEL_MAX);
    u8::try_from((clamped / NATIVE_LEVEL_MAX * 100.0).round() as i64).unwrap_or(100)
}

/// Native level (0–99) from the canonical 0–100 scale.
#[must_use]
pub fn level_to_native(canonical: u8) -> u8 {
    let clamped = f64::from(canonical.min(100));
    u8::try_from((clamped / 100.0 * NATIVE_LEVEL_MAX).round() as i64).unwrap_or(99)
}

/// Capability a command class maps to.
#[must_use]
pub fn capability_for_class(command_class: u32) -> Option<CapabilityType> {
    match command_class {
        CC_BINARY_SWITCH => Some(CapabilityType::Switch),
        CC_MULTILEVEL_SWITCH => Some(CapabilityType::Dimmer),
        CC_SENSOR_MULTILEVEL => Some(CapabilityType::Sensor),
        CC_COLOR_SWITCH => Some(CapabilityType::ColorLight),
        CC_THERMOSTAT_MODE | CC_THERMOSTAT_SETPOINT | CC_THERMOSTAT_FAN_MODE => {
            Some(CapabilityType::Thermostat)
        }
        CC_DOOR_LOCK => Some(CapabilityType::Lock),
        CC_BARRIER_OPERATOR => Some(CapabilityType::Cover),
        _ => None,
    }
}

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
    } else if has(CapabilityType::Switch) {
        DeviceType::Switch
    } else if has(CapabilityType::Sensor) {
        DeviceType::Sensor
    } else {
        DeviceType::Generic
    }
}

/// Build a canonical device from a mesh node.
///
/// The node's value entries drive the capability set; duplicate command
/// classes and the three thermostat classes collapse to one capability
/// each. Nodes with zero mappable classes return `None`.
///
/// # Errors
///
/// Returns [`UnihubError::Validation`] when the derived device fails
/// validation.
pub fn device_from_node(
    adapter_id: &AdapterId,
    node: &Node,
) -> Result<Option<Device>, UnihubError> {
    let mut capabilities: Vec<Capability> = Vec::new();
    for value in &node.values {
        let Some(capability_type) = capability_for_class(value.command_class) else {
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

    let name = node
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Node {}", node.node_id));
    let mut builder = Device::builder()
        .name(name)
        .device_type(device_type_for(&capabilities))
        .capabilities(capabilities)
        .online(node.ready)
        .adapter_id(adapter_id.clone())
        .native_id(node.node_id.to_string());
    if let Some(location) = &node.location {
        if !location.is_empty() {
            builder = builder.area_id(location.as_str());
        }
    }
    builder.build().map(Some)
}

/// Merge a `value updated` notification into the device. Returns the
/// capability that changed, if any.
pub fn apply_value_update(
    device: &mut Device,
    command_class: u32,
    property: &str,
    value: &serde_json::Value,
) -> Option<CapabilityType> {
    let capability_type = capability_for_class(command_class)?;
    let state = match (command_class, property) {
        (CC_BINARY_SWITCH, "currentValue") => CapabilityState::Switch {
            on: value.as_bool()?,
        },
        (CC_MULTILEVEL_SWITCH, "currentValue") => CapabilityState::Dimmer {
            brightness: level_from_native(value.as_f64()?),
        },
        (CC_SENSOR_MULTILEVEL, _) => CapabilityState::Sensor {
            value: value.clone(),
            unit: None,
        },
        (CC_COLOR_SWITCH, "currentColor") => {
            let color = value.as_object()?;
            CapabilityState::ColorLight {
                hue: color.get("hue").and_then(serde_json::Value::as_f64)?,
                saturation: color
                    .get("saturation")
                    .and_then(serde_json::Value::as_f64)?,
                brightness: 100,
            }
        }
        (CC_THERMOSTAT_MODE, "mode") => {
            let mode = value
                .as_str()
                .map(ToString::to_string)
                .or_else(|| value.as_u64().map(|mode| mode.to_string()))?;
            let (temperature, target_temperature) = thermostat_fields(device);
            CapabilityState::Thermostat {
                temperature,
                target_temperature,
                mode: Some(mode),
            }
        }
        (CC_THERMOSTAT_SETPOINT, "setpoint") => {
            let (temperature, _) = thermostat_fields(device);
            let mode = thermostat_mode(device);
            CapabilityState::Thermostat {
                temperature,
                target_temperature: value.as_f64(),
                mode,
            }
        }
        (CC_DOOR_LOCK, "currentMode" | "locked") => CapabilityState::Lock {
            locked: value.as_bool().unwrap_or_else(|| {
                // Door Lock reports mode 255 for secured.
                value.as_u64() == Some(255)
            }),
        },
        (CC_BARRIER_OPERATOR, "currentState" | "position") => CapabilityState::Cover {
            position: level_from_native(value.as_f64()?),
        },
        _ => return None,
    };

    let capability = device.capability_mut(capability_type)?;
    if capability.state.as_ref() == Some(&state) {
        return None;
    }
    capability.set_state(state).ok()?;
    Some(capability_type)
}

fn thermostat_fields(device: &Device) -> (Option<f64>, Option<f64>) {
    match device
        .capability(CapabilityType::Thermostat)
        .and_then(|capability| capability.state.as_ref())
    {
        Some(CapabilityState::Thermostat {
            temperature,
            target_temperature,
            ..
        }) => (*temperature, *target_temperature),
        _ => (None, None),
    }
}

fn thermostat_mode(device: &Device) -> Option<String> {
    match device
        .capability(CapabilityType::Thermostat)
        .and_then(|capability| capability.state.as_ref())
    {
        Some(CapabilityState::Thermostat { mode, .. }) => mode.clone(),
        _ => None,
    }
}

/// The `node.set_value` argument triple for a canonical command.
#[derive(Debug, Clone, PartialEq)]
pub struct SetValueArgs {
    pub command_class: u32,
    pub property: &'static str,
    pub value: serde_json::Value,
}

/// Translate a canonical command into `node.set_value` arguments.
///
/// # Errors
///
/// Returns [`ZwaveError::UnsupportedAction`] when the action has no native
/// write shape, and [`ZwaveError::Domain`] when a required parameter is
/// missing or out of range.
pub fn set_value_args(command: &DeviceCommand) -> Result<SetValueArgs, ZwaveError> {
    let param_f64 = |key: &str| {
        command
            .params
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                ZwaveError::Domain(UnihubError::Command(format!(
                    "missing numeric parameter {key:?}"
                )))
            })
    };

    let args = match (command.capability, command.action.as_str()) {
        (CapabilityType::Switch, "turn_on") => SetValueArgs {
            command_class: CC_BINARY_SWITCH,
            property: "targetValue",
            value: serde_json::json!(true),
        },
        (CapabilityType::Switch, "turn_off") => SetValueArgs {
            command_class: CC_BINARY_SWITCH,
            property: "targetValue",
            value: serde_json::json!(false),
        },
        (CapabilityType::Dimmer, "set_brightness") => {
            let brightness = param_f64("brightness")?;
            if !(0.0..=100.0).contains(&brightness) {
                return Err(ZwaveError::Domain(UnihubError::Command(format!(
                    "brightness {brightness} out of range 0..=100"
                ))));
            }
            SetValueArgs {
                command_class: CC_MULTILEVEL_SWITCH,
                property: "targetValue",
                value: serde_json::json!(level_to_native(brightness as u8)),
            }
        }
        (CapabilityType::ColorLight, "set_color") => SetValueArgs {
            command_class: CC_COLOR_SWITCH,
            property: "targetColor",
            value: serde_json::json!({
                "hue": param_f64("hue")?,
                "saturation": param_f64("saturation")?,
            }),
        },
        (CapabilityType::Thermostat, "set_temperature") => SetValueArgs {
            command_class: CC_THERMOSTAT_SETPOINT,
            property: "setpoint",
            value: serde_json::json!(param_f64("temperature")?),
        },
        (CapabilityType::Thermostat, "set_mode") => {
            let mode = command
                .params
                .get("mode")
                .cloned()
                .ok_or_else(|| {
                    ZwaveError::Domain(UnihubError::Command(
                        "missing parameter \"mode\"".to_string(),
                    ))
                })?;
            SetValueArgs {
                command_class: CC_THERMOSTAT_MODE,
                property: "mode",
                value: mode,
            }
        }
        (CapabilityType::Lock, "lock") => SetValueArgs {
            command_class: CC_DOOR_LOCK,
            property: "targetMode",
            value: serde_json::json!(true),
        },
        (CapabilityType::Lock, "unlock") => SetValueArgs {
            command_class: CC_DOOR_LOCK,
            property: "targetMode",
            value: serde_json::json!(false),
        },
        (CapabilityType::Cover, "open") => SetValueArgs {
            command_class: CC_BARRIER_OPERATOR,
            property: "targetValue",
            value: serde_json::json!(99),
        },
        (CapabilityType::Cover, "close") => SetValueArgs {
            command_class: CC_BARRIER_OPERATOR,
            property: "targetValue",
            value: serde_json::json!(0),
        },
        (CapabilityType::Cover, "set_position") => {
            let position = param_f64("position")?;
            if !(0.0..=100.0).contains(&position) {
                return Err(ZwaveError::Domain(UnihubError::Command(format!(
                    "position {position} out of range 0..=100"
                ))));
            }
            SetValueArgs {
                command_class: CC_BARRIER_OPERATOR,
                property: "targetValue",
                value: serde_json::json!(level_to_native(position as u8)),
            }
        }
        (capability, action) => {
            return Err(ZwaveError::UnsupportedAction {
                capability: capability.to_string(),
                action: action.to_string(),
            });
        }
    };
    Ok(args)
}
