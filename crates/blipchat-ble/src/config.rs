//! BLE radio configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the hardware radio binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BleRadioConfig {
    /// Maximum time for an outbound connect before it is reported as failed
    pub connection_timeout: Duration,
    /// Use acknowledged writes towards remote servers
    pub write_with_response: bool,
    /// Index into the host's adapter list for the central role
    pub adapter_index: usize,
}

impl Default for BleRadioConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            write_with_response: true,
            adapter_index: 0,
        }
    }
}

impl BleRadioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_write_with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BleRadioConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(config.write_with_response);
        assert_eq!(config.adapter_index, 0);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: BleRadioConfig = serde_json::from_str(r#"{"write_with_response": false}"#).unwrap();
        assert!(!config.write_with_response);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }
}
