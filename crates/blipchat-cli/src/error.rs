//! Error handling for the BlipChat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("BlipChat core error: {0}")]
    Core(#[from] blipchat_core::BlipError),

    #[error("BLE radio error: {0}")]
    Radio(#[from] blipchat_ble::BleRadioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<blipchat_core::StartError> for CliError {
    fn from(err: blipchat_core::StartError) -> Self {
        CliError::Core(err.into())
    }
}

impl From<blipchat_core::SendError> for CliError {
    fn from(err: blipchat_core::SendError) -> Self {
        CliError::Core(err.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err.to_string())
    }
}
