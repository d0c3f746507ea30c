//! MQTT adapter error types.

use unihub_domain::error::UnihubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The MQTT client has not been initialised yet.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to parse an incoming MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] UnihubError),
}

impl MqttError {
    /// Convert into a [`UnihubError::Protocol`] for propagation across the
    /// adapter boundary.
    #[must_use]
    pub fn into_domain(self) -> UnihubError {
        match self {
            Self::Domain(err) => err,
            other => UnihubError::Protocol(Box::new(other)),
        }
    }
}

impl From<MqttError> for UnihubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
