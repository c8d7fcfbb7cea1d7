//! Peer connection lifecycle
//!
//! - [`state`] - the pure per-peer state machine
//! - [`manager`] - applies it to the registry for every radio event

pub mod manager;
pub mod state;

pub use manager::{ConnectionManager, ConnectionStats, Outcome, PendingAction};
pub use state::{LinkAction, LinkEvent, PeerState, Transition};
