//! Capability — a typed facet of a device carrying an optional current state.
//!
//! The capability *type* is a closed enum; the *state* is a variant keyed by
//! the same tags. A capability's state variant always matches its type, and a
//! device never exposes two capabilities of the same type — both invariants
//! are enforced at construction.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Closed set of capability types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityType {
    Switch,
    Dimmer,
    ColorLight,
    Thermostat,
    Lock,
    Cover,
    MediaPlayer,
    Sensor,
}

impl CapabilityType {
    /// Stable lowercase name, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Dimmer => "dimmer",
            Self::ColorLight => "color_light",
            Self::Thermostat => "thermostat",
            Self::Lock => "lock",
            Self::Cover => "cover",
            Self::MediaPlayer => "media_player",
            Self::Sensor => "sensor",
        }
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a capability, keyed by the same tags as
/// [`CapabilityType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityState {
    Switch {
        on: bool,
    },
    /// Brightness on the canonical 0–100 scale.
    Dimmer {
        brightness: u8,
    },
    ColorLight {
        hue: f64,
        saturation: f64,
        brightness: u8,
    },
    Thermostat {
        temperature: Option<f64>,
        target_temperature: Option<f64>,
        mode: Option<String>,
    },
    Lock {
        locked: bool,
    },
    /// Position on the canonical 0–100 scale (0 = closed).
    Cover {
        position: u8,
    },
    MediaPlayer {
        state: String,
        volume: Option<u8>,
    },
    Sensor {
        value: serde_json::Value,
        unit: Option<String>,
    },
}

impl CapabilityState {
    /// The capability type this state variant belongs to.
    #[must_use]
    pub fn capability_type(&self) -> CapabilityType {
        match self {
            Self::Switch { .. } => CapabilityType::Switch,
            Self::Dimmer { .. } => CapabilityType::Dimmer,
            Self::ColorLight { .. } => CapabilityType::ColorLight,
            Self::Thermostat { .. } => CapabilityType::Thermostat,
            Self::Lock { .. } => CapabilityType::Lock,
            Self::Cover { .. } => CapabilityType::Cover,
            Self::MediaPlayer { .. } => CapabilityType::MediaPlayer,
            Self::Sensor { .. } => CapabilityType::Sensor,
        }
    }

    /// Whether this state variant matches the given type tag.
    #[must_use]
    pub fn matches(&self, capability_type: CapabilityType) -> bool {
        self.capability_type() == capability_type
    }
}

/// A (type, supported, optional state) triple exposed by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub capability_type: CapabilityType,
    pub supported: bool,
    pub state: Option<CapabilityState>,
}

impl Capability {
    /// Create a supported capability with no known state yet.
    #[must_use]
    pub fn unknown(capability_type: CapabilityType) -> Self {
        Self {
            capability_type,
            supported: true,
            state: None,
        }
    }

    /// Create a supported capability with an initial state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CapabilityStateMismatch`] when the state
    /// variant tag does not match `capability_type`.
    pub fn with_state(
        capability_type: CapabilityType,
        state: CapabilityState,
    ) -> Result<Self, ValidationError> {
        if !state.matches(capability_type) {
            return Err(ValidationError::CapabilityStateMismatch(
                capability_type.as_str(),
            ));
        }
        Ok(Self {
            capability_type,
            supported: true,
            state: Some(state),
        })
    }

    /// Replace the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CapabilityStateMismatch`] when the new
    /// state variant does not match this capability's type.
    pub fn set_state(&mut self, state: CapabilityState) -> Result<(), ValidationError> {
        if !state.matches(self.capability_type) {
            return Err(ValidationError::CapabilityStateMismatch(
                self.capability_type.as_str(),
            ));
        }
        self.state = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_state_matching_capability_type() {
        let cap = Capability::with_state(
            CapabilityType::Switch,
            CapabilityState::Switch { on: true },
        )
        .unwrap();
        assert_eq!(cap.capability_type, CapabilityType::Switch);
        assert!(cap.supported);
    }

    #[test]
    fn should_reject_state_not_matching_capability_type() {
        let result = Capability::with_state(
            CapabilityType::Lock,
            CapabilityState::Switch { on: false },
        );
        assert_eq!(
            result.unwrap_err(),
            ValidationError::CapabilityStateMismatch("lock")
        );
    }

    #[test]
    fn should_reject_set_state_with_mismatched_variant() {
        let mut cap = Capability::unknown(CapabilityType::Dimmer);
        let result = cap.set_state(CapabilityState::Lock { locked: true });
        assert!(result.is_err());
        assert!(cap.state.is_none());
    }

    #[test]
    fn should_replace_state_when_variant_matches() {
        let mut cap = Capability::unknown(CapabilityType::Dimmer);
        cap.set_state(CapabilityState::Dimmer { brightness: 60 })
            .unwrap();
        assert_eq!(
            cap.state,
            Some(CapabilityState::Dimmer { brightness: 60 })
        );
    }

    #[test]
    fn should_serialize_state_with_type_tag() {
        let state = CapabilityState::Switch { on: true };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["type"], "switch");
        assert_eq!(json["on"], true);
    }

    #[test]
    fn should_display_snake_case_type_names() {
        assert_eq!(CapabilityType::ColorLight.to_string(), "color_light");
        assert_eq!(CapabilityType::MediaPlayer.to_string(), "media_player");
    }
}
