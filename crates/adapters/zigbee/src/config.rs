//! Zigbee bridge adapter configuration.

use serde::Deserialize;

use unihub_app::filter::DeviceFilter;
use unihub_domain::error::UnihubError;

/// Configuration for the zigbee bridge adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZigbeeConfig {
    /// MQTT broker hostname or IP address the bridge publishes to.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Topic prefix the bridge publishes under.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long discovery waits for the retained device list, in
    /// milliseconds.
    pub discovery_window_ms: u64,
    /// Base delay of the reconnect backoff, in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Friendly-name include/exclude filter applied before mapping.
    pub filter: DeviceFilter,
}

impl Default for ZigbeeConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "unihub-zigbee".to_string(),
            base_topic: "zigbee2mqtt".to_string(),
            keep_alive_secs: 30,
            discovery_window_ms: 500,
            reconnect_base_delay_ms: 1000,
            reconnect_max_attempts: 5,
            filter: DeviceFilter::default(),
        }
    }
}

impl ZigbeeConfig {
    /// Check the configuration before the adapter is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Configuration`] when a required field is empty
    /// or the base topic contains wildcard characters.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if self.broker_host.is_empty() {
            return Err(UnihubError::Configuration(
                "zigbee broker_host must not be empty".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(UnihubError::Configuration(
                "zigbee client_id must not be empty".to_string(),
            ));
        }
        if self.base_topic.is_empty() || self.base_topic.contains(['+', '#']) {
            return Err(UnihubError::Configuration(format!(
                "zigbee base_topic {:?} must be a non-empty literal topic prefix",
                self.base_topic
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = ZigbeeConfig::default();
        assert_eq!(config.base_topic, "zigbee2mqtt");
        assert_eq!(config.broker_port, 1883);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            broker_host = "10.0.0.2"
            base_topic = "z2m"

            [filter]
            include = ["hallway_light"]
        "#;
        let config: ZigbeeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker_host, "10.0.0.2");
        assert_eq!(config.base_topic, "z2m");
        assert!(config.filter.allows("hallway_light"));
        assert!(!config.filter.allows("porch_light"));
    }

    #[test]
    fn should_reject_wildcard_base_topic() {
        let config = ZigbeeConfig {
            base_topic: "z2m/#".to_string(),
            ..ZigbeeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(UnihubError::Configuration(_))
        ));
    }
}
