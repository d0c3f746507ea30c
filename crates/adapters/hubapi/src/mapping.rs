//! Pure translation between hub entity states and the canonical model.
//!
//! Entities are keyed by `{domain}.{object_id}`. Device domains map to
//! capability sets; housekeeping domains (automation, script, group, zone,
//! person, sun) are skipped. Scenes come from the `scene` domain. Brightness
//! uses the native 0–255 scale.

use serde::Deserialize;

use unihub_domain::capability::{Capability, CapabilityState, CapabilityType};
use unihub_domain::command::DeviceCommand;
use unihub_domain::device::{Device, DeviceType};
use unihub_domain::error::UnihubError;
use unihub_domain::id::AdapterId;
use unihub_domain::scene::Scene;

use crate::error::HubApiError;

/// Native brightness ceiling on the hub's scale.
const NATIVE_BRIGHTNESS_MAX: f64 = 255.0;

/// Domains that never represent a physical device.
const SKIPPED_DOMAINS: &[&str] = &["automation", "script", "group", "zone", "person", "sun"];

/// One entry of the hub's `/api/states` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HubState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl HubState {
    /// The domain part of the entity id.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or_default()
    }

    fn friendly_name(&self) -> String {
        self.attributes
            .get("friendly_name")
            .and_then(serde_json::Value::as_str)
            .map_or_else(
                || {
                    self.entity_id
                        .split_once('.')
                        .map_or(self.entity_id.as_str(), |(_, object_id)| object_id)
                        .to_string()
                },
                ToString::to_string,
            )
    }
}

/// Canonical brightness (0–100) from the native 0–255 scale.
#[must_use]
pub fn brightness_from_native(native: f64) -> u8 {
    let clamped = native.clamp(0.0, NATIVE_BRIGHTNESS_MAX);
    u8::try_from((clamped / NATIVE_BRIGHTNESS_MAX * 100.0).round() as i64).unwrap_or(100)
}

/// Native brightness (0–255) from the canonical 0–100 scale.
#[must_use]
pub fn brightness_to_native(canonical: u8) -> u8 {
    let clamped = f64::from(canonical.min(100));
    u8::try_from((clamped / 100.0 * NATIVE_BRIGHTNESS_MAX).round() as i64).unwrap_or(255)
}

fn attr_f64(state: &HubState, key: &str) -> Option<f64> {
    state.attributes.get(key).and_then(serde_json::Value::as_f64)
}

/// Capability states an entity currently exposes. The caller derives the
/// capability set from the same function, so discovery and state updates
/// cannot diverge.
#[must_use]
pub fn capability_states(state: &HubState) -> Vec<CapabilityState> {
    let mut states = Vec::new();
    match state.domain() {
        "light" => {
            states.push(CapabilityState::Switch {
                on: state.state == "on",
            });
            if let Some(brightness) = attr_f64(state, "brightness") {
                states.push(CapabilityState::Dimmer {
                    brightness: brightness_from_native(brightness),
                });
            } else if state.attributes.contains_key("brightness") {
                // Lights report brightness: null while off but still dim.
                states.push(CapabilityState::Dimmer { brightness: 0 });
            }
            if let Some(hs) = state
                .attributes
                .get("hs_color")
                .and_then(serde_json::Value::as_array)
            {
                let hue = hs.first().and_then(serde_json::Value::as_f64);
                let saturation = hs.get(1).and_then(serde_json::Value::as_f64);
                if let (Some(hue), Some(saturation)) = (hue, saturation) {
                    let brightness = attr_f64(state, "brightness")
                        .map_or(100, brightness_from_native);
                    states.push(CapabilityState::ColorLight {
                        hue,
                        saturation,
                        brightness,
                    });
                }
            } else if state.attributes.contains_key("hs_color") {
                states.push(CapabilityState::ColorLight {
                    hue: 0.0,
                    saturation: 0.0,
                    brightness: 0,
                });
            }
        }
        "switch" => states.push(CapabilityState::Switch {
            on: state.state == "on",
        }),
        "climate" => states.push(CapabilityState::Thermostat {
            temperature: attr_f64(state, "current_temperature"),
            target_temperature: attr_f64(state, "temperature"),
            mode: Some(state.state.clone()),
        }),
        "lock" => states.push(CapabilityState::Lock {
            locked: state.state == "locked",
        }),
        "cover" => {
            let position = attr_f64(state, "current_position").map_or_else(
                || if state.state == "open" { 100 } else { 0 },
                |position| u8::try_from((position.clamp(0.0, 100.0)).round() as i64).unwrap_or(100),
            );
            states.push(CapabilityState::Cover { position });
        }
        "media_player" => {
            let volume = attr_f64(state, "volume_level")
                .map(|level| u8::try_from((level.clamp(0.0, 1.0) * 100.0).round() as i64).unwrap_or(100));
            states.push(CapabilityState::MediaPlayer {
                state: state.state.clone(),
                volume,
            });
        }
        "sensor" => states.push(CapabilityState::Sensor {
            value: serde_json::Value::String(state.state.clone()),
            unit: state
                .attributes
                .get("unit_of_measurement")
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string),
        }),
        _ => {}
    }
    states
}

fn device_type_for(domain: &str) -> DeviceType {
    match domain {
        "light" => DeviceType::Light,
        "climate" => DeviceType::Thermostat,
        "lock" => DeviceType::Lock,
        "cover" => DeviceType::Cover,
        "media_player" => DeviceType::MediaPlayer,
        "sensor" => DeviceType::Sensor,
        _ => DeviceType::Switch,
    }
}

/// Build a canonical device from one hub entity.
///
/// Skipped domains and entities with zero mappable capabilities return
/// `None`.
///
/// # Errors
///
/// Returns [`UnihubError::Validation`] when the derived device fails
/// validation.
pub fn device_from_state(
    adapter_id: &AdapterId,
    state: &HubState,
) -> Result<Option<Device>, UnihubError> {
    let domain = state.domain();
    if SKIPPED_DOMAINS.contains(&domain) || domain == "scene" {
        return Ok(None);
    }
    let states = capability_states(state);
    if states.is_empty() {
        return Ok(None);
    }
    let capabilities = states
        .into_iter()
        .map(|capability_state| {
            Capability::with_state(capability_state.capability_type(), capability_state)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(UnihubError::from)?;

    Device::builder()
        .name(state.friendly_name())
        .device_type(device_type_for(domain))
        .capabilities(capabilities)
        .online(state.state != "unavailable")
        .adapter_id(adapter_id.clone())
        .native_id(&state.entity_id)
        .build()
        .map(Some)
}

/// Build a canonical scene from a `scene` domain entity.
///
/// # Errors
///
/// Returns [`UnihubError::Validation`] when the entity carries an empty
/// name.
pub fn scene_from_state(
    adapter_id: &AdapterId,
    state: &HubState,
) -> Result<Option<Scene>, UnihubError> {
    if state.domain() != "scene" {
        return Ok(None);
    }
    Scene::new(
        adapter_id.clone(),
        &state.entity_id,
        state.friendly_name(),
        None,
    )
    .map(Some)
}

/// Merge a fresh entity state into the device's capabilities. Only the
/// capabilities the entity still reports are touched. Returns the types
/// whose state changed.
#[must_use]
pub fn apply_state(device: &mut Device, state: &HubState) -> Vec<CapabilityType> {
    let mut changed = Vec::new();
    for capability_state in capability_states(state) {
        let capability_type = capability_state.capability_type();
        if let Some(capability) = device.capability_mut(capability_type) {
            if capability.state.as_ref() != Some(&capability_state)
                && capability.set_state(capability_state).is_ok()
            {
                changed.push(capability_type);
            }
        }
    }
    device.online = state.state != "unavailable";
    changed
}

/// A REST service call: domain, service, and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub body: serde_json::Value,
}

/// Translate a canonical command into the hub's service-call shape.
///
/// # Errors
///
/// Returns [`HubApiError::UnsupportedAction`] when the action has no native
/// service, and [`HubApiError::Domain`] when a required parameter is
/// missing or out of range.
pub fn service_call(command: &DeviceCommand, entity_id: &str) -> Result<ServiceCall, HubApiError> {
    let entity_domain = entity_id.split('.').next().unwrap_or_default().to_string();
    let param_f64 = |key: &str| {
        command
            .params
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                HubApiError::Domain(UnihubError::Command(format!(
                    "missing numeric parameter {key:?}"
                )))
            })
    };
    let body = |extra: serde_json::Value| {
        let mut body = serde_json::Map::new();
        body.insert("entity_id".to_string(), serde_json::json!(entity_id));
        if let serde_json::Value::Object(extra) = extra {
            body.extend(extra);
        }
        serde_json::Value::Object(body)
    };

    let call = match (command.capability, command.action.as_str()) {
        (CapabilityType::Switch, "turn_on") => ServiceCall {
            domain: entity_domain,
            service: "turn_on".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Switch, "turn_off") => ServiceCall {
            domain: entity_domain,
            service: "turn_off".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Dimmer, "set_brightness") => {
            let brightness = param_f64("brightness")?;
            if !(0.0..=100.0).contains(&brightness) {
                return Err(HubApiError::Domain(UnihubError::Command(format!(
                    "brightness {brightness} out of range 0..=100"
                ))));
            }
            ServiceCall {
                domain: "light".to_string(),
                service: "turn_on".to_string(),
                body: body(serde_json::json!({
                    "brightness": brightness_to_native(brightness as u8)
                })),
            }
        }
        (CapabilityType::ColorLight, "set_color") => ServiceCall {
            domain: "light".to_string(),
            service: "turn_on".to_string(),
            body: body(serde_json::json!({
                "hs_color": [param_f64("hue")?, param_f64("saturation")?]
            })),
        },
        (CapabilityType::Thermostat, "set_temperature") => ServiceCall {
            domain: "climate".to_string(),
            service: "set_temperature".to_string(),
            body: body(serde_json::json!({ "temperature": param_f64("temperature")? })),
        },
        (CapabilityType::Thermostat, "set_mode") => {
            let mode = command
                .params
                .get("mode")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    HubApiError::Domain(UnihubError::Command(
                        "missing string parameter \"mode\"".to_string(),
                    ))
                })?;
            ServiceCall {
                domain: "climate".to_string(),
                service: "set_hvac_mode".to_string(),
                body: body(serde_json::json!({ "hvac_mode": mode })),
            }
        }
        (CapabilityType::Lock, "lock") => ServiceCall {
            domain: "lock".to_string(),
            service: "lock".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Lock, "unlock") => ServiceCall {
            domain: "lock".to_string(),
            service: "unlock".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Cover, "open") => ServiceCall {
            domain: "cover".to_string(),
            service: "open_cover".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Cover, "close") => ServiceCall {
            domain: "cover".to_string(),
            service: "close_cover".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::Cover, "set_position") => ServiceCall {
            domain: "cover".to_string(),
            service: "set_cover_position".to_string(),
            body: body(serde_json::json!({ "position": param_f64("position")? })),
        },
        (CapabilityType::MediaPlayer, "play") => ServiceCall {
            domain: "media_player".to_string(),
            service: "media_play".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::MediaPlayer, "pause") => ServiceCall {
            domain: "media_player".to_string(),
            service: "media_pause".to_string(),
            body: body(serde_json::json!({})),
        },
        (CapabilityType::MediaPlayer, "set_volume") => {
            let volume = param_f64("volume")?;
            if !(0.0..=100.0).contains(&volume) {
                return Err(HubApiError::Domain(UnihubError::Command(format!(
                    "volume {volume} out of range 0..=100"
                ))));
            }
            ServiceCall {
                domain: "media_player".to_string(),
                service: "volume_set".to_string(),
                body: body(serde_json::json!({ "volume_level": volume / 100.0 })),
            }
        }
        (capability, action) => {
            return Err(HubApiError::UnsupportedAction {
                capability: capability.to_string(),
                action: action.to_string(),
            });
        }
    };
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entity_id: &str, state_value: &str, attributes: serde_json::Value) -> HubState {
        HubState {
            entity_id: entity_id.to_string(),
            state: state_value.to_string(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn should_round_trip_brightness_through_the_native_scale() {
        assert_eq!(brightness_to_native(60), 153);
        assert_eq!(brightness_from_native(153.0), 60);
        assert_eq!(brightness_to_native(0), 0);
        assert_eq!(brightness_to_native(100), 255);
        assert_eq!(brightness_from_native(255.0), 100);
    }

    #[test]
    fn should_map_light_with_brightness_and_color() {
        let adapter_id = AdapterId::from("hubapi");
        let entity = state(
            "light.living_room",
            "on",
            serde_json::json!({
                "friendly_name": "Living Room",
                "brightness": 153,
                "hs_color": [30.0, 40.0],
            }),
        );
        let device = device_from_state(&adapter_id, &entity).unwrap().unwrap();
        assert_eq!(device.id.as_str(), "hubapi-light.living_room");
        assert_eq!(device.name, "Living Room");
        assert_eq!(device.device_type, DeviceType::Light);
        assert_eq!(device.capabilities.len(), 3);
        assert_eq!(
            device.capability(CapabilityType::Dimmer).unwrap().state,
            Some(CapabilityState::Dimmer { brightness: 60 })
        );
    }

    #[test]
    fn should_skip_housekeeping_domains() {
        let adapter_id = AdapterId::from("hubapi");
        for entity_id in [
            "automation.morning",
            "script.alarm",
            "group.all_lights",
            "zone.home",
            "person.sam",
            "sun.sun",
        ] {
            let entity = state(entity_id, "on", serde_json::json!({}));
            assert!(
                device_from_state(&adapter_id, &entity).unwrap().is_none(),
                "{entity_id} should be skipped"
            );
        }
    }

    #[test]
    fn should_map_climate_to_thermostat() {
        let adapter_id = AdapterId::from("hubapi");
        let entity = state(
            "climate.hallway",
            "heat",
            serde_json::json!({ "current_temperature": 19.5, "temperature": 21.0 }),
        );
        let device = device_from_state(&adapter_id, &entity).unwrap().unwrap();
        assert_eq!(device.device_type, DeviceType::Thermostat);
        assert_eq!(
            device.capability(CapabilityType::Thermostat).unwrap().state,
            Some(CapabilityState::Thermostat {
                temperature: Some(19.5),
                target_temperature: Some(21.0),
                mode: Some("heat".to_string()),
            })
        );
    }

    #[test]
    fn should_map_scene_entities_to_scenes() {
        let adapter_id = AdapterId::from("hubapi");
        let entity = state(
            "scene.movie_night",
            "scening",
            serde_json::json!({ "friendly_name": "Movie Night" }),
        );
        let scene = scene_from_state(&adapter_id, &entity).unwrap().unwrap();
        assert_eq!(scene.id.as_str(), "hubapi-scene.movie_night");
        assert_eq!(scene.name, "Movie Night");
        assert!(
            scene_from_state(&adapter_id, &state("light.x", "on", serde_json::json!({})))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn should_merge_fresh_state_and_track_availability() {
        let adapter_id = AdapterId::from("hubapi");
        let entity = state(
            "light.living_room",
            "on",
            serde_json::json!({ "brightness": 153 }),
        );
        let mut device = device_from_state(&adapter_id, &entity).unwrap().unwrap();

        let update = state(
            "light.living_room",
            "unavailable",
            serde_json::json!({ "brightness": 255 }),
        );
        let changed = apply_state(&mut device, &update);
        assert_eq!(changed, vec![CapabilityType::Switch, CapabilityType::Dimmer]);
        assert!(!device.online);
        assert_eq!(
            device.capability(CapabilityType::Dimmer).unwrap().state,
            Some(CapabilityState::Dimmer { brightness: 100 })
        );
    }

    #[test]
    fn should_translate_commands_into_service_calls() {
        let brightness = DeviceCommand::new(
            "hubapi-light.living_room",
            CapabilityType::Dimmer,
            "set_brightness",
        )
        .param("brightness", serde_json::json!(60));
        let call = service_call(&brightness, "light.living_room").unwrap();
        assert_eq!(call.domain, "light");
        assert_eq!(call.service, "turn_on");
        assert_eq!(
            call.body,
            serde_json::json!({ "entity_id": "light.living_room", "brightness": 153 })
        );

        let off = DeviceCommand::new(
            "hubapi-switch.outlet",
            CapabilityType::Switch,
            "turn_off",
        );
        let call = service_call(&off, "switch.outlet").unwrap();
        assert_eq!(call.domain, "switch");
        assert_eq!(call.service, "turn_off");

        let unknown =
            DeviceCommand::new("hubapi-lock.door", CapabilityType::Lock, "warp");
        assert!(matches!(
            service_call(&unknown, "lock.door"),
            Err(HubApiError::UnsupportedAction { .. })
        ));
    }
}
