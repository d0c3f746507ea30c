//! Z-Wave hub adapter error types.

use unihub_domain::error::UnihubError;

/// Errors specific to the Z-Wave hub adapter.
#[derive(Debug, thiserror::Error)]
pub enum ZwaveError {
    /// The WebSocket session has not been established yet.
    #[error("zwave hub not connected")]
    NotConnected,

    /// The WebSocket transport failed.
    #[error("WebSocket error")]
    WebSocket(#[source] tokio_tungstenite::tungstenite::Error),

    /// Failed to parse a hub payload as JSON.
    #[error("failed to parse hub payload")]
    PayloadParse(#[source] serde_json::Error),

    /// The hub answered a request with `success: false`.
    #[error("hub rejected {command}: {message}")]
    RequestFailed { command: String, message: String },

    /// The hub did not answer within the configured timeout.
    #[error("hub did not answer {command} in time")]
    Timeout { command: String },

    /// The command has no native write shape for this device.
    #[error("unsupported action {action:?} for capability {capability}")]
    UnsupportedAction { capability: String, action: String },

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] UnihubError),
}

impl ZwaveError {
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

impl From<ZwaveError> for UnihubError {
    fn from(err: ZwaveError) -> Self {
        err.into_domain()
    }
}
