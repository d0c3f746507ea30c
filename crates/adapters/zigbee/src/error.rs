//! Zigbee bridge adapter error types.

use unihub_domain::error::UnihubError;

/// Errors specific to the zigbee bridge adapter.
#[derive(Debug, thiserror::Error)]
pub enum ZigbeeError {
    /// The MQTT client has not been initialised yet.
    #[error("zigbee bridge not connected")]
    NotConnected,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to parse a bridge payload as JSON.
    #[error("failed to parse bridge payload")]
    PayloadParse(#[source] serde_json::Error),

    /// The command has no native write shape for this device.
    #[error("unsupported action {action:?} for capability {capability}")]
    UnsupportedAction { capability: String, action: String },

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] UnihubError),
}

impl ZigbeeError {
    /// Convert into a [`UnihubError`] for propagation across the adapter
    /// boundary.
    #[must_use]
    pub fn into_domain(self) -> UnihubError {
        match self {
            Self::Domain(err) => err,
            Self::UnsupportedAction { capability, action } => UnihubError::Command(format!(
                "unsupported action {action:?} for capability {capability}"
            )),
            other => UnihubError::Protocol(Box::new(other)),
        }
    }
}

impl From<ZigbeeError> for UnihubError {
    fn from(err: ZigbeeError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_not_connected_to_protocol_error() {
        let err: UnihubError = ZigbeeError::NotConnected.into();
        assert!(matches!(err, UnihubError::Protocol(_)));
    }

    #[test]
    fn should_convert_unsupported_action_to_command_error() {
        let err: UnihubError = ZigbeeError::UnsupportedAction {
            capability: "switch".to_string(),
            action: "warp".to_string(),
        }
        .into();
        assert!(matches!(err, UnihubError::Command(_)));
    }
}
