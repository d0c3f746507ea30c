//! MQTT adapter configuration.

use serde::Deserialize;

use unihub_app::filter::DeviceFilter;
use unihub_domain::error::UnihubError;

/// Configuration for the generic MQTT bus adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Base topic prefix all device topics live under.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long discovery waits for retained announcements, in milliseconds.
    pub discovery_window_ms: u64,
    /// Base delay of the reconnect backoff, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Native-id include/exclude filter applied before mapping.
    pub filter: DeviceFilter,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "unihub".to_string(),
            base_topic: "unihub".to_string(),
            keep_alive_secs: 30,
            discovery_window_ms: 500,
            reconnect_base_delay_ms: 1000,
            reconnect_max_attempts: 5,
            filter: DeviceFilter::default(),
        }
    }
}

impl MqttConfig {
    /// Check the configuration before the adapter is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when a required field is empty
    /// or the base topic contains wildcard characters.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if self.broker_host.is_empty() {
            return Err(UnihubError::Configuration(
                "mqtt broker_host must not be empty".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(UnihubError::Configuration(
                "mqtt client_id must not be empty".to_string(),
            ));
        }
        if self.base_topic.is_empty() || self.base_topic.contains(['+', '#']) {
            return Err(UnihubError::Configuration(format!(
                "mqtt base_topic {:?} must be a non-empty literal topic prefix",
                self.base_topic
            )));
        }
        Ok(())
    }
}
