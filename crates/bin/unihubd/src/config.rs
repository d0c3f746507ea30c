//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `unihub.toml` in the working directory. Every field has a
//! sensible default so the file is optional; all adapters start disabled.
//! Environment variables take precedence over file values.

use serde::Deserialize;

use unihub_adapter_hubapi::config::HubApiConfig;
use unihub_adapter_mqtt::config::MqttConfig;
use unihub_adapter_zigbee::config::ZigbeeConfig;
use unihub_adapter_zwave::config::ZwaveConfig;
use unihub_app::manager::ManagerConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Command queue tuning.
    pub manager: ManagerSettings,
    /// Per-protocol adapter sections.
    pub adapters: AdaptersConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "unihubd=info,unihub=info".to_string(),
        }
    }
}

/// Command queue tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Maximum queued commands before enqueues are rejected.
    pub max_queue_size: usize,
    /// Minimum spacing between queued dispatches, in milliseconds.
    pub command_throttle_delay_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            command_throttle_delay_ms: 100,
        }
    }
}

/// Per-protocol adapter sections.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    pub mqtt: MqttSection,
    pub zigbee: ZigbeeSection,
    pub zwave: ZwaveSection,
    pub hubapi: HubApiSection,
}

/// An `enabled` toggle plus the protocol's own fields, flattened.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    pub enabled: bool,
    /// Informational priority used to order status output.
    pub priority: i32,
    #[serde(flatten)]
    pub config: MqttConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ZigbeeSection {
    pub enabled: bool,
    pub priority: i32,
    #[serde(flatten)]
    pub config: ZigbeeConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ZwaveSection {
    pub enabled: bool,
    pub priority: i32,
    #[serde(flatten)]
    pub config: ZwaveConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubApiSection {
    pub enabled: bool,
    pub priority: i32,
    #[serde(flatten)]
    pub config: HubApiConfig,
}

impl Config {
    /// Load configuration from `unihub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if an
    /// enabled adapter section is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("unihub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("UNIHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.max_queue_size == 0 {
            return Err(ConfigError::Validation(
                "manager.max_queue_size must be non-zero".to_string(),
            ));
        }
        let section = |name: &str, result: Result<(), unihub_domain::error::UnihubError>| {
            result.map_err(|err| ConfigError::Validation(format!("adapters.{name}: {err}")))
        };
        if self.adapters.mqtt.enabled {
            section("mqtt", self.adapters.mqtt.config.validate())?;
        }
        if self.adapters.zigbee.enabled {
            section("zigbee", self.adapters.zigbee.config.validate())?;
        }
        if self.adapters.zwave.enabled {
            section("zwave", self.adapters.zwave.config.validate())?;
        }
        if self.adapters.hubapi.enabled {
            section("hubapi", self.adapters.hubapi.config.validate())?;
        }
        Ok(())
    }

    /// Tuning handed to the adapter manager.
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_queue_size: self.manager.max_queue_size,
            command_throttle_delay: std::time::Duration::from_millis(
                self.manager.command_throttle_delay_ms,
            ),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.manager.max_queue_size, 1000);
        assert_eq!(config.manager.command_throttle_delay_ms, 100);
        assert!(!config.adapters.mqtt.enabled);
        assert!(!config.adapters.zigbee.enabled);
        assert!(!config.adapters.zwave.enabled);
        assert!(!config.adapters.hubapi.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.manager.max_queue_size, 1000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = r#"
            [logging]
            filter = "debug"

            [manager]
            max_queue_size = 50
            command_throttle_delay_ms = 250

            [adapters.mqtt]
            enabled = true
            broker_host = "mqtt.example.com"
            base_topic = "home"

            [adapters.zigbee]
            enabled = true
            base_topic = "z2m"
            priority = 5

            [adapters.zwave]
            enabled = true
            url = "ws://hub.local:3000"

            [adapters.hubapi]
            enabled = true
            base_url = "http://hub.local:8123"
            token = "secret"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.manager.max_queue_size, 50);
        assert!(config.adapters.mqtt.enabled);
        assert_eq!(config.adapters.mqtt.config.broker_host, "mqtt.example.com");
        assert_eq!(config.adapters.mqtt.config.base_topic, "home");
        assert_eq!(config.adapters.zigbee.priority, 5);
        assert_eq!(config.adapters.zwave.config.url, "ws://hub.local:3000");
        assert_eq!(config.adapters.hubapi.config.token, "secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert!(!config.adapters.mqtt.enabled);
    }

    #[test]
    fn should_skip_validation_of_disabled_sections() {
        let toml = r#"
            [adapters.hubapi]
            enabled = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        // hubapi has no token, but it is disabled.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_invalid_enabled_section() {
        let toml = r#"
            [adapters.hubapi]
            enabled = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_zero_queue_size() {
        let toml = r#"
            [manager]
            max_queue_size = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_build_manager_config() {
        let config = Config::default();
        let manager = config.manager_config();
        assert_eq!(manager.max_queue_size, 1000);
        assert_eq!(
            manager.command_throttle_delay,
            std::time::Duration::from_millis(100)
        );
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
