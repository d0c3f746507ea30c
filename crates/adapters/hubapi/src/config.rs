//! Hub API adapter configuration.

use serde::Deserialize;

use unihub_app::filter::DeviceFilter;
use unihub_domain::error::UnihubError;

/// Configuration for the home-hub API adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubApiConfig {
    /// Base URL of the hub, e.g. `http://localhost:8123`.
    pub base_url: String,
    /// Long-lived access token used for REST and WebSocket auth.
    pub token: String,
    /// HTTP request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Base delay of the reconnect backoff, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Entity-id include/exclude filter applied before mapping.
    pub filter: DeviceFilter,
}

impl Default for HubApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8123".to_string(),
            token: String::new(),
            request_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1000,
            reconnect_max_attempts: 5,
            filter: DeviceFilter::default(),
        }
    }
}

impl HubApiConfig {
    /// Check the configuration before the adapter is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the base URL is not HTTP
    /// or the token is missing.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(UnihubError::Configuration(format!(
                "hubapi base_url {:?} must start with http:// or https://",
                self.base_url
            )));
        }
        if self.token.is_empty() {
            return Err(UnihubError::Configuration(
                "hubapi token must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// REST endpoint under `/api`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url.trim_end_matches('/'))
    }

    /// WebSocket endpoint derived from the base URL.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = base
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| {
                base.strip_prefix("http://")
                    .map(|rest| format!("ws://{rest}"))
            })
            .unwrap_or_else(|| base.to_string());
        format!("{ws_base}/api/websocket")
    }
}
