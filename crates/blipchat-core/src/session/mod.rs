//! Session Controller
//!
//! One session owns every component (Advertiser, Scanner, Connection Manager,
//! Broadcast Engine) and runs them on a single task. [`SessionController`] is
//! the cloneable handle the host application talks to; the task behind it
//! serializes host commands, radio events and the maintenance tick.

mod controller;
mod task;

pub use controller::{SessionController, SessionEvents};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::errors::{SendError, StartError};
use crate::types::{FanoutReport, PeerAddress, ServiceIdentity};

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// Observable events for the host application
///
/// Events of each kind are delivered in emission order. No ordering holds
/// between different kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Addresses of all Ready peers, sorted
    PeerSetChanged(Vec<PeerAddress>),
    /// Payload received on the session characteristic, sender not exposed
    MessageReceived(Vec<u8>),
    /// Advertising started (true) or failed/stopped (false)
    AdvertisingStateChanged(bool),
    /// Scanning started (true) or failed/stopped (false)
    ScanningStateChanged(bool),
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests from controller handles to the session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Start {
        identity: ServiceIdentity,
        local_name: String,
        reply: oneshot::Sender<Result<(), StartError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<FanoutReport, SendError>>,
    },
}
