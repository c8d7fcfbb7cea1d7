//! BlipChat CLI configuration
//!
//! Configuration is layered with figment, lowest priority first:
//! defaults, `blipchat.toml` in the working directory (or the file given
//! with `--config`), `BLIPCHAT_*` environment variables, then command line
//! flags. Nested keys in the environment use a double underscore, for
//! example `BLIPCHAT_SESSION__MAX_PAYLOAD_SIZE=256`.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use blipchat_ble::{BleRadioConfig, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
use blipchat_core::{ServiceIdentity, SessionConfig};

/// Configuration file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "blipchat.toml";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session tuning
    pub session: SessionConfig,

    /// Hardware radio settings
    pub ble: BleRadioConfig,

    /// Service this node advertises and joins
    pub identity: IdentityConfig,
}

/// GATT identity and advertised name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub service_uuid: String,
    pub characteristic_uuid: String,
    /// Name to advertise; the session default applies when unset
    pub device_name: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID.to_string(),
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID.to_string(),
            device_name: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Defaults, then `path` (or `blipchat.toml`), then the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);
        if path.is_some() && !Path::new(file).exists() {
            return Err(ConfigError::Loading(format!("{} does not exist", file)));
        }

        let figment = Self::defaults()
            .merge(Toml::file(file))
            .merge(Env::prefixed("BLIPCHAT_").split("__"));
        Self::extract(figment)
    }

    /// Base layer every source merges onto
    pub fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of loaded values
    pub fn with_overrides(
        mut self,
        service_uuid: Option<&str>,
        characteristic_uuid: Option<&str>,
        device_name: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(uuid) = service_uuid {
            self.identity.service_uuid = uuid.to_string();
        }
        if let Some(uuid) = characteristic_uuid {
            self.identity.characteristic_uuid = uuid.to_string();
        }
        if let Some(name) = device_name {
            self.identity.device_name = Some(name.to_string());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.service_identity()?;
        if self.ble.connection_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "BLE connection timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn service_identity(&self) -> Result<ServiceIdentity, ConfigError> {
        ServiceIdentity::parse(&self.identity.service_uuid, &self.identity.characteristic_uuid)
            .map_err(|e| ConfigError::Validation(format!("Invalid UUID: {}", e)))
    }

    /// Name handed to `start`; empty lets the session pick its default
    pub fn device_name(&self) -> &str {
        self.identity.device_name.as_deref().unwrap_or("")
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_ok!(config.validate());
        let identity = assert_ok!(config.service_identity());
        assert_eq!(identity.service_uuid, DEFAULT_SERVICE_UUID);
        assert_eq!(config.device_name(), "");
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let figment = AppConfig::defaults().merge(Toml::string(
            r#"
            [session]
            max_payload_size = 128

            [identity]
            device_name = "Kitchen"
            "#,
        ));
        let config = AppConfig::extract(figment).unwrap();
        assert_eq!(config.session.max_payload_size, 128);
        assert_eq!(config.device_name(), "Kitchen");
        assert!(config.ble.write_with_response);
    }

    #[test]
    fn test_invalid_uuid_is_rejected() {
        let figment = AppConfig::defaults().merge(Toml::string(
            r#"
            [identity]
            service_uuid = "not-a-uuid"
            "#,
        ));
        assert!(matches!(
            AppConfig::extract(figment),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = assert_ok!(AppConfig::default().with_overrides(None, None, Some("Porch")));
        assert_eq!(config.device_name(), "Porch");

        assert_err!(AppConfig::default().with_overrides(Some("b1c0"), None, None));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(matches!(
            AppConfig::load(Some("/nonexistent/blipchat.toml")),
            Err(ConfigError::Loading(_))
        ));
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[session]"));
        assert!(example.contains("[identity]"));
    }
}
