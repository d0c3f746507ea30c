//! Hub API adapter error types.

use unihub_domain::error::UnihubError;

/// Errors specific to the home-hub API adapter.
#[derive(Debug, thiserror::Error)]
pub enum HubApiError {
    /// An HTTP request failed.
    #[error("HTTP request failed")]
    Http(#[source] reqwest::Error),

    /// The WebSocket transport failed.
    #[error("WebSocket error")]
    WebSocket(#[source] tokio_tungstenite::tungstenite::Error),

    /// The hub rejected the access token.
    #[error("hub rejected authentication: {0}")]
    AuthRejected(String),

    /// Failed to parse a hub payload as JSON.
    #[error("failed to parse hub payload")]
    PayloadParse(#[source] serde_json::Error),

    /// The command has no native service call for this device.
    #[error("unsupported action {action:?} for capability {capability}")]
    UnsupportedAction { capability: String, action: String },

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] UnihubError),
}

impl HubApiError {
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

impl From<HubApiError> for UnihubError {
    fn from(err: HubApiError) -> Self {
        err.into_domain()
    }
}
