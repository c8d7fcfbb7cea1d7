//! Error types for the BLE radio binding

use blipchat_core::radio::codes;
use blipchat_core::{PeerAddress, RadioError};
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the platform Bluetooth stacks
#[derive(Error, Debug)]
pub enum BleRadioError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Peripheral role not supported on this platform")]
    PeripheralUnsupported,

    #[error("Radio is not open")]
    NotOpen,

    #[error("Peer not found: {0}")]
    PeerNotFound(PeerAddress),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Subscriber {0} is gone")]
    SubscriberGone(PeerAddress),

    #[error("Notification to {peer} failed: {reason}")]
    NotifyFailed { peer: PeerAddress, reason: String },

    #[error("Platform rejected the request (code {code}): {reason}")]
    Rejected { code: i32, reason: String },

    #[error("Bluetooth central error: {0}")]
    Central(#[from] btleplug::Error),

    #[cfg(target_os = "linux")]
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),
}

impl BleRadioError {
    /// Platform status code in the numbering the session understands
    pub fn code(&self) -> i32 {
        match self {
            BleRadioError::Rejected { code, .. } => *code,
            BleRadioError::PeripheralUnsupported => codes::FEATURE_UNSUPPORTED,
            #[cfg(target_os = "linux")]
            BleRadioError::Bluez(e) => bluez_code(e),
            _ => codes::INTERNAL_ERROR,
        }
    }
}

#[cfg(target_os = "linux")]
fn bluez_code(error: &bluer::Error) -> i32 {
    use bluer::ErrorKind;
    match error.kind {
        ErrorKind::AlreadyExists | ErrorKind::InProgress => codes::ALREADY_STARTED,
        ErrorKind::NotSupported => codes::FEATURE_UNSUPPORTED,
        ErrorKind::InvalidLength => codes::DATA_TOO_LARGE,
        _ => codes::INTERNAL_ERROR,
    }
}

impl From<BleRadioError> for RadioError {
    fn from(err: BleRadioError) -> Self {
        match err {
            BleRadioError::AdapterNotAvailable | BleRadioError::NotOpen => {
                RadioError::Unavailable(err.to_string())
            }
            BleRadioError::PeerNotFound(peer) => RadioError::UnknownPeer(peer),
            BleRadioError::SubscriberGone(peer) => RadioError::NotConnected(peer),
            BleRadioError::CharacteristicNotFound(uuid) => RadioError::CharacteristicNotFound(uuid),
            BleRadioError::NotifyFailed { peer, reason } => RadioError::DeliveryFailed { peer, reason },
            other => RadioError::Rejected {
                code: other.code(),
                reason: other.to_string(),
            },
        }
    }
}
