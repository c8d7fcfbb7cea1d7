//! Radio binding abstraction
//!
//! The session never talks to a platform Bluetooth stack directly. A binding
//! implements [`Radio`] and reports every asynchronous completion (connection
//! established, services resolved, write received, ...) as a [`RadioEvent`]
//! through the [`RadioEventSender`] handed to it in [`Radio::open`]. The
//! session task consumes those events on its own serialized queue.
//!
//! Request methods (`connect`, `discover_services`, ...) return as soon as the
//! request has been issued. Only `write_characteristic` and `notify` resolve
//! with the delivery outcome, since the broadcast engine reports per-peer
//! failures.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::RadioResult;
use crate::types::{PeerAddress, ServiceIdentity};

/// Platform status codes, numbered like Android's `AdvertiseCallback` errors
pub mod codes {
    pub const DATA_TOO_LARGE: i32 = 1;
    pub const TOO_MANY_ADVERTISERS: i32 = 2;
    pub const ALREADY_STARTED: i32 = 3;
    pub const INTERNAL_ERROR: i32 = 4;
    pub const FEATURE_UNSUPPORTED: i32 = 5;
}

// ----------------------------------------------------------------------------
// Adapter Status
// ----------------------------------------------------------------------------

/// What the local adapter can do right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterStatus {
    /// Peripheral (advertise + GATT server) and central (scan + connect) together
    pub dual_role: bool,
    /// Adapter is switched on
    pub powered: bool,
}

// ----------------------------------------------------------------------------
// Radio Events
// ----------------------------------------------------------------------------

/// Completion and callback notifications from a radio binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Scanner saw an advertisement
    AdvertisementSeen {
        address: PeerAddress,
        local_name: Option<String>,
        services: Vec<Uuid>,
    },
    /// Scanning stopped because the platform failed it
    ScanFailed { code: i32 },
    /// Outbound link is up
    LinkConnected { address: PeerAddress },
    /// Outbound connect attempt failed
    ConnectFailed { address: PeerAddress, reason: String },
    /// Outbound link went down
    LinkDisconnected { address: PeerAddress },
    /// Remote GATT services resolved
    ServicesDiscovered {
        address: PeerAddress,
        services: Vec<Uuid>,
    },
    /// Characteristics of one remote service resolved
    CharacteristicsDiscovered {
        address: PeerAddress,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    /// Service or characteristic discovery failed
    DiscoveryFailed { address: PeerAddress, reason: String },
    /// Notification subscription on the remote characteristic is active
    Subscribed {
        address: PeerAddress,
        characteristic: Uuid,
    },
    /// Notification subscription could not be set up
    SubscribeFailed { address: PeerAddress, reason: String },
    /// Remote server notified a new characteristic value
    NotificationReceived {
        address: PeerAddress,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    /// A remote central subscribed to our characteristic
    CentralSubscribed {
        address: PeerAddress,
        characteristic: Uuid,
    },
    /// A remote central unsubscribed or its link to our server dropped
    CentralUnsubscribed { address: PeerAddress },
    /// A remote central wrote to our characteristic
    WriteReceived {
        address: PeerAddress,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

impl RadioEvent {
    /// Peer the event concerns, if it concerns one
    pub fn address(&self) -> Option<&PeerAddress> {
        match self {
            RadioEvent::ScanFailed { .. } => None,
            RadioEvent::AdvertisementSeen { address, .. }
            | RadioEvent::LinkConnected { address }
            | RadioEvent::ConnectFailed { address, .. }
            | RadioEvent::LinkDisconnected { address }
            | RadioEvent::ServicesDiscovered { address, .. }
            | RadioEvent::CharacteristicsDiscovered { address, .. }
            | RadioEvent::DiscoveryFailed { address, .. }
            | RadioEvent::Subscribed { address, .. }
            | RadioEvent::SubscribeFailed { address, .. }
            | RadioEvent::NotificationReceived { address, .. }
            | RadioEvent::CentralSubscribed { address, .. }
            | RadioEvent::CentralUnsubscribed { address }
            | RadioEvent::WriteReceived { address, .. } => Some(address),
        }
    }
}

// ----------------------------------------------------------------------------
// Event Sender
// ----------------------------------------------------------------------------

/// Radio event stamped with the session epoch it was emitted for
#[derive(Debug, Clone)]
pub struct StampedEvent {
    pub epoch: u64,
    pub event: RadioEvent,
}

/// Handle a radio binding uses to report events to its session
///
/// Every `start` hands out a sender stamped with a fresh epoch. Events sent
/// through a sender from an earlier epoch are discarded by the session, so a
/// binding may keep emitting after `close` without corrupting a later session.
#[derive(Debug, Clone)]
pub struct RadioEventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<StampedEvent>,
}

impl RadioEventSender {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<StampedEvent>) -> Self {
        Self { epoch, tx }
    }

    /// Create a standalone sender/receiver pair at epoch zero
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StampedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(0, tx), rx)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event; returns false once the session is gone
    pub fn emit(&self, event: RadioEvent) -> bool {
        self.tx
            .send(StampedEvent {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

// ----------------------------------------------------------------------------
// Radio Trait
// ----------------------------------------------------------------------------

/// Platform BLE binding consumed by the session
#[async_trait]
pub trait Radio: Send + Sync {
    /// Report adapter capabilities and power state
    async fn probe(&self) -> RadioResult<AdapterStatus>;

    /// Install the GATT server for `identity` and start reporting events
    async fn open(&self, identity: &ServiceIdentity, events: RadioEventSender) -> RadioResult<()>;

    /// Remove the GATT server and drop every link
    async fn close(&self);

    /// Advertise `service_uuid` under `local_name`
    async fn advertise(&self, service_uuid: Uuid, local_name: &str) -> RadioResult<()>;

    async fn stop_advertising(&self);

    /// Scan continuously for advertisements carrying `service_uuid`
    async fn scan(&self, service_uuid: Uuid) -> RadioResult<()>;

    async fn stop_scan(&self);

    /// Issue an outbound connection; completes with `LinkConnected` or `ConnectFailed`
    async fn connect(&self, address: &PeerAddress) -> RadioResult<()>;

    /// Issue a disconnect; completes with `LinkDisconnected`
    async fn disconnect(&self, address: &PeerAddress);

    /// Completes with `ServicesDiscovered` or `DiscoveryFailed`
    async fn discover_services(&self, address: &PeerAddress) -> RadioResult<()>;

    /// Completes with `CharacteristicsDiscovered` or `DiscoveryFailed`
    async fn discover_characteristics(&self, address: &PeerAddress, service: Uuid)
        -> RadioResult<()>;

    /// Completes with `Subscribed` or `SubscribeFailed`
    async fn subscribe(
        &self,
        address: &PeerAddress,
        service: Uuid,
        characteristic: Uuid,
    ) -> RadioResult<()>;

    /// Write `value` to the peer's characteristic over our outbound link
    async fn write_characteristic(
        &self,
        address: &PeerAddress,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> RadioResult<()>;

    /// Set our characteristic to `value` and notify one subscribed central
    async fn notify(&self, address: &PeerAddress, characteristic: Uuid, value: &[u8])
        -> RadioResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sender_stamps_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = RadioEventSender::new(7, tx);
        assert!(sender.emit(RadioEvent::ScanFailed { code: codes::INTERNAL_ERROR }));

        let stamped = rx.try_recv().unwrap();
        assert_eq!(stamped.epoch, 7);
        assert_eq!(stamped.event, RadioEvent::ScanFailed { code: 4 });
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (sender, rx) = RadioEventSender::channel();
        drop(rx);
        assert!(!sender.emit(RadioEvent::ScanFailed { code: 1 }));
    }

    #[test]
    fn test_event_address() {
        let address = PeerAddress::new("AA:BB");
        let event = RadioEvent::LinkConnected {
            address: address.clone(),
        };
        assert_eq!(event.address(), Some(&address));
        assert_eq!(RadioEvent::ScanFailed { code: 1 }.address(), None);
    }
}
