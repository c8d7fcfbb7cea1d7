//! Error types for the BlipChat transport
//!
//! Each component reports its own error enum. Failures local to one peer
//! never escalate past the Connection Manager or the Broadcast Engine; only
//! the preconditions checked by `start` can fail a whole session.

use thiserror::Error;

use crate::connection::PeerState;
use crate::types::{PeerAddress, SessionState};

// ----------------------------------------------------------------------------
// Radio Errors
// ----------------------------------------------------------------------------

/// Errors reported by a radio binding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("Platform rejected the request (code {code}): {reason}")]
    Rejected { code: i32, reason: String },

    #[error("Radio unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerAddress),

    #[error("Peer not connected: {0}")]
    NotConnected(PeerAddress),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),

    #[error("Delivery to {peer} failed: {reason}")]
    DeliveryFailed { peer: PeerAddress, reason: String },
}

impl RadioError {
    /// Platform code attached to the error, if any
    pub fn code(&self) -> Option<i32> {
        match self {
            RadioError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type RadioResult<T> = Result<T, RadioError>;

// ----------------------------------------------------------------------------
// Component Errors
// ----------------------------------------------------------------------------

/// Errors from the Advertiser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseError {
    #[error("Advertising rejected by platform (code {0})")]
    PlatformRejected(i32),
}

/// Errors from the Scanner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Scan rejected by platform (code {0})")]
    PlatformRejected(i32),
}

/// Rejected peer state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from} on {event}")]
    Invalid { from: PeerState, event: String },

    #[error("No connection for peer {0}")]
    UnknownPeer(PeerAddress),
}

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Reasons `start` can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("Radio lacks peripheral/central dual-role support")]
    UnsupportedHardware,

    #[error("Bluetooth adapter is disabled")]
    RadioDisabled,

    #[error("Session already active (state {0})")]
    AlreadyActive(SessionState),

    #[error("Failed to install GATT server: {0}")]
    GattServer(String),

    #[error("Session task is gone")]
    SessionClosed,
}

/// Reasons `send` can fail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Session not active")]
    NotActive,

    #[error("Payload too large: {size} bytes (max: {max_size})")]
    PayloadTooLarge { size: usize, max_size: usize },

    #[error("Session task is gone")]
    SessionClosed,
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Crate-level error unifying the component errors
#[derive(Error, Debug)]
pub enum BlipError {
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Start failed: {0}")]
    Start(#[from] StartError),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Advertising failed: {0}")]
    Advertise(#[from] AdvertiseError),

    #[error("Scanning failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

pub type BlipResult<T> = Result<T, BlipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_error_code() {
        let err = RadioError::Rejected {
            code: 3,
            reason: "already started".to_string(),
        };
        assert_eq!(err.code(), Some(3));
        assert_eq!(RadioError::UnknownPeer(PeerAddress::new("x")).code(), None);
    }

    #[test]
    fn test_unified_error_conversion() {
        let err: BlipError = SendError::NotActive.into();
        assert!(matches!(err, BlipError::Send(SendError::NotActive)));
        assert_eq!(err.to_string(), "Send failed: Session not active");
    }
}
