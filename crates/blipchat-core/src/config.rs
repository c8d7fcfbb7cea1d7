//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BlipError;

/// Largest value a single ATT attribute can carry
pub const MAX_ATTRIBUTE_VALUE_LEN: usize = 512;

/// Local name advertised when the host does not supply one
pub const DEFAULT_LOCAL_NAME: &str = "BlipChat";

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for a BlipChat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the command queue between handles and the session task
    pub command_buffer_size: usize,
    /// Largest payload accepted by `send`
    pub max_payload_size: usize,
    /// How long a peer may stay in a pre-Ready (or Disconnecting) state
    pub connection_timeout: Duration,
    /// Period of the stuck-connection watchdog
    pub maintenance_interval: Duration,
    /// Local name used when `start` receives an empty one
    pub default_local_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            max_payload_size: MAX_ATTRIBUTE_VALUE_LEN,
            connection_timeout: Duration::from_secs(10),
            maintenance_interval: Duration::from_secs(5),
            default_local_name: DEFAULT_LOCAL_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = size;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_default_local_name(mut self, name: impl Into<String>) -> Self {
        self.default_local_name = name.into();
        self
    }

    /// Reject values the session task cannot run with
    pub fn validate(&self) -> Result<(), BlipError> {
        if self.command_buffer_size == 0 {
            return Err(BlipError::Configuration {
                reason: "command_buffer_size must be greater than zero".to_string(),
            });
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_ATTRIBUTE_VALUE_LEN {
            return Err(BlipError::Configuration {
                reason: format!(
                    "max_payload_size must be between 1 and {}",
                    MAX_ATTRIBUTE_VALUE_LEN
                ),
            });
        }
        if self.connection_timeout.is_zero() {
            return Err(BlipError::Configuration {
                reason: "connection_timeout must be non-zero".to_string(),
            });
        }
        if self.maintenance_interval.is_zero() {
            return Err(BlipError::Configuration {
                reason: "maintenance_interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
