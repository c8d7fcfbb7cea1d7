//! Core types for the BlipChat transport
//!
//! Identifiers and small value types shared by every component of a session.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service Identity
// ----------------------------------------------------------------------------

/// The service and characteristic every participant agrees on out-of-band
///
/// Both values are fixed for the lifetime of a session; changing them requires
/// a full stop/start cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

impl ServiceIdentity {
    pub fn new(service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        Self {
            service_uuid,
            characteristic_uuid,
        }
    }

    /// Parse both identifiers from their textual form
    pub fn parse(service_uuid: &str, characteristic_uuid: &str) -> Result<Self, uuid::Error> {
        Ok(Self {
            service_uuid: Uuid::parse_str(service_uuid)?,
            characteristic_uuid: Uuid::parse_str(characteristic_uuid)?,
        })
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_uuid, self.characteristic_uuid)
    }
}

// ----------------------------------------------------------------------------
// Peer Address
// ----------------------------------------------------------------------------

/// Opaque, platform-assigned identifier for a nearby device
///
/// Usually the link-layer address as reported by the platform, but a binding
/// may hand out any stable handle. The session uses it only as a
/// deduplication key and never parses it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for PeerAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ----------------------------------------------------------------------------
// Link Role
// ----------------------------------------------------------------------------

/// Which side of the GATT link the local device plays for a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkRole {
    /// We connected out to the peer's GATT server and subscribed to it
    Central,
    /// The peer connected to our GATT server and subscribed to notifications
    Peripheral,
}

impl fmt::Display for LinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRole::Central => f.write_str("central"),
            LinkRole::Peripheral => f.write_str("peripheral"),
        }
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle of a session: `Idle → Starting → Active → Stopping → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting",
            SessionState::Active => "Active",
            SessionState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Fan-out Report
// ----------------------------------------------------------------------------

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FanoutReport {
    /// Ready peers a delivery was attempted on
    pub attempted: usize,
    /// Deliveries that failed individually
    pub failed: usize,
}

impl FanoutReport {
    pub fn delivered(&self) -> usize {
        self.attempted.saturating_sub(self.failed)
    }
}
