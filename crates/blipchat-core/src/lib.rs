//! BlipChat Core
//!
//! Dual-role BLE broadcast transport. Each device advertises a GATT service
//! and scans for the same service at once; every peer reachable in either
//! direction receives each outbound payload. This crate holds the session
//! logic over an abstract [`Radio`]; platform bindings live in `blipchat-ble`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod advertiser;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod errors;
pub mod host;
pub mod radio;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use advertiser::Advertiser;
pub use broadcast::{BroadcastEngine, BroadcastStats};
pub use config::{SessionConfig, DEFAULT_LOCAL_NAME, MAX_ATTRIBUTE_VALUE_LEN};
pub use connection::{ConnectionManager, ConnectionStats, LinkAction, LinkEvent, Outcome, PeerState};
pub use errors::{
    AdvertiseError, BlipError, BlipResult, RadioError, RadioResult, ScanError, SendError, StartError,
    TransitionError,
};
pub use host::{HostChannel, HostCommand, HostError, HostErrorCode, HostEvent, MethodCall, MethodResponse};
pub use radio::{AdapterStatus, Radio, RadioEvent, RadioEventSender, StampedEvent};
pub use registry::{PeerConnection, PeerRegistry, ReadyPeer};
pub use scanner::Scanner;
pub use session::{SessionController, SessionEvent, SessionEvents};
pub use types::{FanoutReport, LinkRole, PeerAddress, ServiceIdentity, SessionState};
