//! Pure translation between bridge payloads and the canonical model.
//!
//! The bridge publishes its device table as retained JSON on
//! `{base}/bridge/devices`, device state on `{base}/{friendly_name}`, and
//! accepts writes on `{base}/{friendly_name}/set`. Devices describe
//! themselves with nested expose descriptors; containers (`light`, `switch`,
//! `cover`, `lock`, `climate`) carry their writable attributes as
//! `features`, which are flattened one level before mapping.

use serde::Deserialize;

use unihub_domain::capability::{Capability, CapabilityState, CapabilityType};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::{Device, DeviceType};
use unihub_domain::error::UnihubError;
use unihub_domain::id::AdapterId;

use crate::error::ZigbeeError;

/// Native brightness ceiling on the zigbee cluster scale.
const NATIVE_BRIGHTNESS_MAX: f64 = 254.0;

/// One entry of the bridge's device table.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeDevice {
    pub friendly_name: String,
    pub ieee_address: String,
    #[serde(default)]
    pub supported: bool,
    #[serde(default)]
    pub definition: Option<Definition>,
}

/// Model metadata plus the expose descriptors.
#[derive(Debug, Clone, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub exposes: Vec<Expose>,
}

/// A single expose descriptor. Containers nest their attributes under
/// `features`.
#[derive(Debug, Clone, Deserialize)]
pub struct Expose {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub features: Vec<Expose>,
}

impl Expose {
    fn property_name(&self) -> &str {
        self.property
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

/// Canonical brightness (0–100) from the native 0–254 scale.
#[must_use]
pub fn brightness_from_native(native: f64) -> u8 {
    let clamped = native.clamp(0.0, NATIVE_BRIGHTNESS_MAX);
    u8::try_from((clamped / NATIVE_BRIGHTNESS_MAX * 100.0).round() as i64).unwrap_or(100)
}

/// Native brightness (0–254) from the canonical 0–100 scale.
#[must_use]
pub fn brightness_to_native(canonical: u8) -> u16 {
    let clamped = f64::from(canonical.min(100));
    u16::try_from((clamped / 100.0 * NATIVE_BRIGHTNESS_MAX).round() as i64).unwrap_or(254)
}

/// Capability a single (already flattened) descriptor maps to.
fn capability_for(expose: &Expose) -> Option<CapabilityType> {
    match expose.kind.as_str() {
        "switch" | "binary" => Some(CapabilityType::Switch),
        "lock" => Some(CapabilityType::Lock),
        "cover" => Some(CapabilityType::Cover),
        "numeric" => match expose.property_name() {
            "brightness" => Some(CapabilityType::Dimmer),
            "temperature" | "current_heating_setpoint" => Some(CapabilityType::Thermostat),
            _ => None,
        },
        "composite" if expose.property_name().contains("color") => {
            Some(CapabilityType::ColorLight)
        }
        _ => None,
    }
}

/// Flatten nested features one level: containers contribute themselves and
/// their direct features.
fn flattened(exposes: &[Expose]) -> Vec<&Expose> {
    let mut result = Vec::new();
    for expose in exposes {
        result.push(expose);
        result.extend(expose.features.iter());
    }
    result
}

/// Broad classification from the top-level descriptor kinds.
fn device_type_for(exposes: &[Expose], capabilities: &[Capability]) -> DeviceType {
    for expose in exposes {
        match expose.kind.as_str() {
            "light" => return DeviceType::Light,
            "lock" => return DeviceType::Lock,
            "cover" => return DeviceType::Cover,
            "climate" => return DeviceType::Thermostat,
            "switch" => return DeviceType::Switch,
            _ => {}
        }
    }
    if capabilities
        .iter()
        .any(|capability| capability.capability_type == CapabilityType::Thermostat)
    {
        DeviceType::Thermostat
    } else {
        DeviceType::Generic
    }
}

/// Build a canonical device from a bridge table entry.
///
/// Unsupported devices and devices whose descriptors map to zero
/// capabilities return `None`. Duplicate capability types collapse to the
/// first occurrence.
///
/// # Errors
///
/// Returns [`UnihubError::Validation`] when the entry carries an empty
/// friendly name.
pub fn device_from_bridge_device(
    adapter_id: &AdapterId,
    entry: &BridgeDevice,
) -> Result<Option<Device>, UnihubError> {
    if !entry.supported {
        return Ok(None);
    }
    let Some(definition) = &entry.definition else {
        return Ok(None);
    };

    let mut capabilities: Vec<Capability> = Vec::new();
    for expose in flattened(&definition.exposes) {
        let Some(capability_type) = capability_for(expose) else {
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
        .name(&entry.friendly_name)
        .device_type(device_type_for(&definition.exposes, &capabilities))
        .capabilities(capabilities)
        .online(true)
        .adapter_id(adapter_id.clone())
        .native_id(&entry.friendly_name)
        .metadata("ieee_address", serde_json::json!(entry.ieee_address));
    if let Some(model) = &definition.model {
        builder = builder.metadata("model", serde_json::json!(model));
    }
    if let Some(vendor) = &definition.vendor {
        builder = builder.metadata("vendor", serde_json::json!(vendor));
    }
    builder.build().map(Some)
}

fn merge(
    device: &mut Device,
    capability_type: CapabilityType,
    state: CapabilityState,
    changed: &mut Vec<CapabilityType>,
) {
    if let Some(capability) = device.capability_mut(capability_type) {
        if capability.state.as_ref() != Some(&state) && capability.set_state(state).is_ok() {
            changed.push(capability_type);
        }
    }
}

/// Merge a bridge state payload into the device, touching only the
/// capabilities whose native keys are present.
///
/// # Errors
///
/// Returns [`ZigbeeError::PayloadParse`] when the payload is not a JSON
/// object.
pub fn apply_state(
    device: &mut Device,
    payload: &serde_json::Value,
) -> Result<Vec<CapabilityType>, ZigbeeError> {
    let entries = payload.as_object().ok_or_else(|| {
        ZigbeeError::PayloadParse(serde::de::Error::custom("state payload must be an object"))
    })?;

    let mut changed = Vec::new();
    if let Some(state) = entries.get("state").and_then(serde_json::Value::as_str) {
        // Locks and switches share the `state` key; the capability set
        // decides which one it is.
        if device.capability(CapabilityType::Lock).is_some() {
            let locked = matches!(state, "LOCK" | "LOCKED");
            merge(device, CapabilityType::Lock, CapabilityState::Lock { locked }, &mut changed);
        } else {
            let on = state.eq_ignore_ascii_case("on");
            merge(device, CapabilityType::Switch, CapabilityState::Switch { on }, &mut changed);
        }
    }
    if let Some(brightness) = entries.get("brightness").and_then(serde_json::Value::as_f64) {
        merge(
            device,
            CapabilityType::Dimmer,
            CapabilityState::Dimmer {
                brightness: brightness_from_native(brightness),
            },
            &mut changed,
        );
    }
    if let Some(color) = entries.get("color").and_then(serde_json::Value::as_object) {
        let hue = color.get("hue").and_then(serde_json::Value::as_f64);
        let saturation = color.get("saturation").and_then(serde_json::Value::as_f64);
        if let (Some(hue), Some(saturation)) = (hue, saturation) {
            let brightness = entries
                .get("brightness")
                .and_then(serde_json::Value::as_f64)
                .map_or(100, brightness_from_native);
            merge(
                device,
                CapabilityType::ColorLight,
                CapabilityState::ColorLight {
                    hue,
                    saturation,
                    brightness,
                },
                &mut changed,
            );
        }
    }
    let temperature = entries.get("temperature").and_then(serde_json::Value::as_f64);
    let setpoint = entries
        .get("current_heating_setpoint")
        .and_then(serde_json::Value::as_f64);
    let mode = entries
        .get("system_mode")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string);
    if temperature.is_some() || setpoint.is_some() || mode.is_some() {
        let previous = device
            .capability(CapabilityType::Thermostat)
            .and_then(|capability| capability.state.clone());
        let (mut current_temperature, mut current_setpoint, mut current_mode) = match previous {
            Some(CapabilityState::Thermostat {
                temperature,
                target_temperature,
                mode,
            }) => (temperature, target_temperature, mode),
            _ => (None, None, None),
        };
        if temperature.is_some() {
            current_temperature = temperature;
        }
        if setpoint.is_some() {
            current_setpoint = setpoint;
        }
        if mode.is_some() {
            current_mode = mode;
        }
        merge(
            device,
            CapabilityType::Thermostat,
            CapabilityState::Thermostat {
                temperature: current_temperature,
                target_temperature: current_setpoint,
                mode: current_mode,
            },
            &mut changed,
        );
    }
    if let Some(position) = entries.get("position").and_then(serde_json::Value::as_u64) {
        merge(
            device,
            CapabilityType::Cover,
            CapabilityState::Cover {
                position: u8::try_from(position.min(100)).unwrap_or(100),
            },
            &mut changed,
        );
    }
    Ok(changed)
}

/// Translate a canonical command into the bridge's `set` payload.
///
/// # Errors
///
/// Returns [`ZigbeeError::UnsupportedAction`] when the action has no native
/// write shape, and [`ZigbeeError::Domain`] when a required parameter is
/// missing or out of range.
pub fn command_payload(command: &DeviceCommand) -> Result<serde_json::Value, ZigbeeError> {
    let param_f64 = |key: &str| {
        command
            .params
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                ZigbeeError::Domain(UnihubError::Command(format!(
                    "missing numeric parameter {key:?}"
                )))
            })
    };

    let payload = match (command.capability, command.action.as_str()) {
        (CapabilityType::Switch, "turn_on") => serde_json::json!({ "state": "ON" }),
        (CapabilityType::Switch, "turn_off") => serde_json::json!({ "state": "OFF" }),
        (CapabilityType::Dimmer, "set_brightness") => {
            let brightness = param_f64("brightness")?;
            if !(0.0..=100.0).contains(&brightness) {
                return Err(ZigbeeError::Domain(UnihubError::Command(format!(
                    "brightness {brightness} out of range 0..=100"
                ))));
            }
            serde_json::json!({ "brightness": brightness_to_native(brightness as u8) })
        }
        (CapabilityType::ColorLight, "set_color") => {
            let hue = param_f64("hue")?;
            let saturation = param_f64("saturation")?;
            serde_json::json!({ "color": { "hue": hue, "saturation": saturation } })
        }
        (CapabilityType::Thermostat, "set_temperature") => {
            serde_json::json!({ "current_heating_setpoint": param_f64("temperature")? })
        }
        (CapabilityType::Thermostat, "set_mode") => {
            let mode = command
                .params
                .get("mode")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    ZigbeeError::Domain(UnihubError::Command(
                        "missing string parameter \"mode\"".to_string(),
                    ))
                })?;
            serde_json::json!({ "system_mode": mode })
        }
        (CapabilityType::Lock, "lock") => serde_json::json!({ "state": "LOCK" }),
        (CapabilityType::Lock, "unlock") => serde_json::json!({ "state": "UNLOCK" }),
        (CapabilityType::Cover, "open") => serde_json::json!({ "state": "OPEN" }),
        (CapabilityType::Cover, "close") => serde_json::json!({ "state": "CLOSE" }),
        (CapabilityType::Cover, "set_position") => {
            serde_json::json!({ "position": param_f64("position")? })
        }
        (capability, action) => {
            return Err(ZigbeeError::UnsupportedAction {
                capability: capability.to_string(),
                action: action.to_string(),
            });
        }
    };
    Ok(payload)
}

/// Topic the adapter publishes writes to.
#[must_use]
pub fn command_topic(base: &str, friendly_name: &str) -> String {
    format!("{base}/{friendly_name}/set")
}

/// Split a state topic `{base}/{friendly_name}` into the friendly name.
/// Bridge topics (`{base}/bridge/...`) and nested topics return `None`.
#[must_use]
pub fn parse_state_topic<'a>(base: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') || rest == "bridge" {
        return None;
    }
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expose(kind: &str, property: Option<&str>, features: Vec<Expose>) -> Expose {
        Expose {
            kind: kind.to_string(),
            name: None,
            property: property.map(ToString::to_string),
            features,
        }
    }

    fn bridge_device(friendly_name: &str, exposes: Vec<Expose>) -> BridgeDevice {
        BridgeDevice {
            friendly_name: friendly_name.to_string(),
            ieee_address: "0x00124b0022xxyyzz".to_string(),
            supported: true,
            definition: Some(Definition {
                model: Some("LED1836G9".to_string()),
                vendor: None,
                exposes,
            }),
        }
    }

    fn light_exposes() -> Vec<Expose> {
        vec![expose(
            "light",
            None,
            vec![
                expose("binary", Some("state"), vec![]),
                expose("numeric", Some("brightness"), vec![]),
                expose("composite", Some("color_hs"), vec![]),
            ],
        )]
    }

    #[test]
    fn should_scale_brightness_against_native_ceiling() {
        assert_eq!(brightness_from_native(0.0), 0);
        assert_eq!(brightness_from_native(254.0), 100);
        assert_eq!(brightness_from_native(127.0), 50);
        assert_eq!(brightness_to_native(0), 0);
        assert_eq!(brightness_to_native(100), 254);
        assert_eq!(brightness_to_native(50), 127);
    }

    #[test]
    fn should_flatten_light_features_one_level() {
        let adapter_id = AdapterId::from("zigbee");
        let device =
            device_from_bridge_device(&adapter_id, &bridge_device("hall_light", light_exposes()))
                .unwrap()
                .unwrap();
        assert_eq!(device.id.as_str(), "zigbee-hall_light");
        assert_eq!(device.device_type, DeviceType::Light);
        let types: Vec<CapabilityType> = device
            .capabilities
            .iter()
            .map(|capability| capability.capability_type)
            .collect();
        assert_eq!(
            types,
            vec![
                CapabilityType::Switch,
                CapabilityType::Dimmer,
                CapabilityType::ColorLight
            ]
        );
    }

    #[test]
    fn should_map_climate_features_to_one_thermostat() {
        let adapter_id = AdapterId::from("zigbee");
        let entry = bridge_device(
            "trv",
            vec![expose(
                "climate",
                None,
                vec![
                    expose("numeric", Some("current_heating_setpoint"), vec![]),
                    expose("numeric", Some("temperature"), vec![]),
                ],
            )],
        );
        let device = device_from_bridge_device(&adapter_id, &entry)
            .unwrap()
            .unwrap();
        assert_eq!(device.device_type, DeviceType::Thermostat);
        assert_eq!(device.capabilities.len(), 1);
        assert_eq!(
            device.capabilities[0].capability_type,
            CapabilityType::Thermostat
        );
    }

    #[test]
    fn should_drop_unsupported_and_unmappable_devices() {
        let adapter_id = AdapterId::from("zigbee");
        let mut unsupported = bridge_device("weird", vec![expose("switch", None, vec![])]);
        unsupported.supported = false;
        assert!(
            device_from_bridge_device(&adapter_id, &unsupported)
                .unwrap()
                .is_none()
        );

        let unmappable = bridge_device("button", vec![expose("enum", Some("action"), vec![])]);
        assert!(
            device_from_bridge_device(&adapter_id, &unmappable)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn should_merge_state_with_native_brightness_scale() {
        let adapter_id = AdapterId::from("zigbee");
        let mut device =
            device_from_bridge_device(&adapter_id, &bridge_device("hall_light", light_exposes()))
                .unwrap()
                .unwrap();
        let payload = serde_json::json!({ "state": "ON", "brightness": 127 });
        let changed = apply_state(&mut device, &payload).unwrap();
        assert_eq!(changed, vec![CapabilityType::Switch, CapabilityType::Dimmer]);
        assert_eq!(
            device.capability(CapabilityType::Dimmer).unwrap().state,
            Some(CapabilityState::Dimmer { brightness: 50 })
        );
    }

    #[test]
    fn should_route_state_key_to_lock_when_device_has_lock() {
        let adapter_id = AdapterId::from("zigbee");
        let mut device = device_from_bridge_device(
            &adapter_id,
            &bridge_device("front_door", vec![expose("lock", None, vec![])]),
        )
        .unwrap()
        .unwrap();
        let changed = apply_state(&mut device, &serde_json::json!({ "state": "LOCK" })).unwrap();
        assert_eq!(changed, vec![CapabilityType::Lock]);
        assert_eq!(
            device.capability(CapabilityType::Lock).unwrap().state,
            Some(CapabilityState::Lock { locked: true })
        );
    }

    #[test]
    fn should_translate_commands_to_set_payloads() {
        let brightness =
            DeviceCommand::new("zigbee-hall_light", CapabilityType::Dimmer, "set_brightness")
                .param("brightness", serde_json::json!(50));
        assert_eq!(
            command_payload(&brightness).unwrap(),
            serde_json::json!({ "brightness": 127 })
        );

        let off = DeviceCommand::new("zigbee-hall_light", CapabilityType::Switch, "turn_off");
        assert_eq!(
            command_payload(&off).unwrap(),
            serde_json::json!({ "state": "OFF" })
        );

        let unknown = DeviceCommand::new("zigbee-hall_light", CapabilityType::Switch, "warp");
        assert!(matches!(
            command_payload(&unknown),
            Err(ZigbeeError::UnsupportedAction { .. })
        ));
    }

    #[test]
    fn should_reject_out_of_range_brightness_command() {
        let command =
            DeviceCommand::new("zigbee-hall_light", CapabilityType::Dimmer, "set_brightness")
                .param("brightness", serde_json::json!(150));
        assert!(matches!(
            command_payload(&command),
            Err(ZigbeeError::Domain(_))
        ));
    }

    #[test]
    fn should_parse_state_topics_and_skip_bridge_topics() {
        assert_eq!(
            parse_state_topic("zigbee2mqtt", "zigbee2mqtt/hall_light"),
            Some("hall_light")
        );
        assert_eq!(parse_state_topic("zigbee2mqtt", "zigbee2mqtt/bridge"), None);
        assert_eq!(
            parse_state_topic("zigbee2mqtt", "zigbee2mqtt/bridge/devices"),
            None
        );
        assert_eq!(
            parse_state_topic("zigbee2mqtt", "zigbee2mqtt/hall_light/set"),
            None
        );
    }
}
