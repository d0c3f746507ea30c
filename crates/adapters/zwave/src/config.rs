//! Z-Wave hub adapter configuration.

use serde::Deserialize;

use unihub_app::filter::DeviceFilter;
use unihub_domain::error::UnihubError;

/// Configuration for the Z-Wave hub adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZwaveConfig {
    /// WebSocket endpoint of the hub, e.g. `ws://localhost:3000`.
    pub url: String,
    /// How long a single request may wait for its response, in
    /// milliseconds.
    pub request_timeout_ms: u64,
    /// Base delay of the reconnect backoff, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Node-id include/exclude filter applied before mapping.
    pub filter: DeviceFilter,
}

impl Default for ZwaveConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            request_timeout_ms: 5000,
            reconnect_base_delay_ms: 1000,
            reconnect_max_attempts: 5,
            filter: DeviceFilter::default(),
        }
    }
}

impl ZwaveConfig {
    /// Check the configuration before the adapter is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when the url is not a
    /// WebSocket endpoint or the timeout is zero.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(UnihubError::Configuration(format!(
                "zwave url {:?} must start with ws:// or wss://",
                self.url
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(UnihubError::Configuration(
                "zwave request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
