//! Broadcast Engine
//!
//! Outbound: fan one payload out to every Ready peer with the delivery
//! primitive that matches the link role. Peers that subscribed to our server
//! get a notification, peers whose server we subscribed to get a write.
//! Deliveries run concurrently and a failure on one peer never affects the
//! others. No acknowledgement, no retry.
//!
//! Inbound: any payload arriving on the session characteristic, written to
//! us or notified to us, surfaces as a received message. The sender is not
//! exposed.

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::radio::Radio;
use crate::registry::{PeerRegistry, ReadyPeer};
use crate::types::{FanoutReport, LinkRole, ServiceIdentity};

/// Counters for broadcast traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub deliveries_attempted: u64,
    pub deliveries_failed: u64,
    pub messages_received: u64,
    pub foreign_values_ignored: u64,
}

/// Fans outbound payloads out and demultiplexes inbound ones
#[derive(Debug)]
pub struct BroadcastEngine {
    identity: ServiceIdentity,
    stats: BroadcastStats,
}

impl BroadcastEngine {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            stats: BroadcastStats::default(),
        }
    }

    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }

    /// Deliver `payload` to every peer that is Ready right now
    pub async fn send(&mut self, registry: &PeerRegistry, radio: &dyn Radio, payload: &[u8]) -> FanoutReport {
        let targets = registry.ready_peers();
        if targets.is_empty() {
            debug!("No ready peers, broadcast of {} bytes skipped", payload.len());
            self.stats.messages_sent += 1;
            return FanoutReport::default();
        }

        let identity = self.identity;
        let deliveries = targets
            .iter()
            .map(|peer| Self::deliver(radio, identity, peer, payload));
        let results = join_all(deliveries).await;

        let mut report = FanoutReport {
            attempted: targets.len(),
            failed: 0,
        };
        for (peer, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                report.failed += 1;
                warn!("Failed to deliver to peer {}: {}", peer.address, e);
            }
        }

        self.stats.messages_sent += 1;
        self.stats.deliveries_attempted += report.attempted as u64;
        self.stats.deliveries_failed += report.failed as u64;
        debug!(
            "Broadcast {} bytes to {}/{} peers",
            payload.len(),
            report.delivered(),
            report.attempted
        );
        report
    }

    async fn deliver(
        radio: &dyn Radio,
        identity: ServiceIdentity,
        peer: &ReadyPeer,
        payload: &[u8],
    ) -> crate::errors::RadioResult<()> {
        match peer.role {
            LinkRole::Peripheral => {
                radio
                    .notify(&peer.address, identity.characteristic_uuid, payload)
                    .await
            }
            LinkRole::Central => {
                radio
                    .write_characteristic(
                        &peer.address,
                        identity.service_uuid,
                        identity.characteristic_uuid,
                        payload,
                    )
                    .await
            }
        }
    }

    /// Accept a value written or notified on `characteristic`
    pub fn on_incoming(&mut self, characteristic: Uuid, value: Vec<u8>) -> Option<Vec<u8>> {
        if characteristic != self.identity.characteristic_uuid {
            self.stats.foreign_values_ignored += 1;
            debug!("Ignoring value on foreign characteristic {}", characteristic);
            return None;
        }
        self.stats.messages_received += 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_test::assert_ok;

    use crate::errors::{RadioError, RadioResult};
    use crate::radio::{AdapterStatus, RadioEventSender};
    use crate::registry::PeerConnection;
    use crate::types::PeerAddress;

    const SERVICE: Uuid = Uuid::from_u128(0x0000B1C0_0000_1000_8000_00805F9B34FB);
    const CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000B1C1_0000_1000_8000_00805F9B34FB);

    /// Records deliveries; fails those addressed to `failing`
    #[derive(Default)]
    struct RecordingRadio {
        failing: HashSet<PeerAddress>,
        writes: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
        notifications: Mutex<Vec<(PeerAddress, Vec<u8>)>>,
    }

    #[async_trait]
    impl Radio for RecordingRadio {
        async fn probe(&self) -> RadioResult<AdapterStatus> {
            Ok(AdapterStatus {
                dual_role: true,
                powered: true,
            })
        }
        async fn open(&self, _: &ServiceIdentity, _: RadioEventSender) -> RadioResult<()> {
            Ok(())
        }
        async fn close(&self) {}
        async fn advertise(&self, _: Uuid, _: &str) -> RadioResult<()> {
            Ok(())
        }
        async fn stop_advertising(&self) {}
        async fn scan(&self, _: Uuid) -> RadioResult<()> {
            Ok(())
        }
        async fn stop_scan(&self) {}
        async fn connect(&self, _: &PeerAddress) -> RadioResult<()> {
            Ok(())
        }
        async fn disconnect(&self, _: &PeerAddress) {}
        async fn discover_services(&self, _: &PeerAddress) -> RadioResult<()> {
            Ok(())
        }
        async fn discover_characteristics(&self, _: &PeerAddress, _: Uuid) -> RadioResult<()> {
            Ok(())
        }
        async fn subscribe(&self, _: &PeerAddress, _: Uuid, _: Uuid) -> RadioResult<()> {
            Ok(())
        }
        async fn write_characteristic(
            &self,
            address: &PeerAddress,
            _: Uuid,
            _: Uuid,
            value: &[u8],
        ) -> RadioResult<()> {
            if self.failing.contains(address) {
                return Err(RadioError::NotConnected(address.clone()));
            }
            self.writes.lock().unwrap().push((address.clone(), value.to_vec()));
            Ok(())
        }
        async fn notify(&self, address: &PeerAddress, _: Uuid, value: &[u8]) -> RadioResult<()> {
            if self.failing.contains(address) {
                return Err(RadioError::DeliveryFailed {
                    peer: address.clone(),
                    reason: "link lost".to_string(),
                });
            }
            self.notifications
                .lock()
                .unwrap()
                .push((address.clone(), value.to_vec()));
            Ok(())
        }
    }

    fn engine() -> BroadcastEngine {
        BroadcastEngine::new(ServiceIdentity::new(SERVICE, CHARACTERISTIC))
    }

    #[tokio::test]
    async fn test_empty_audience_is_not_a_failure() {
        let radio = RecordingRadio::default();
        let registry = PeerRegistry::new();
        let report = engine().send(&registry, &radio, b"hello").await;
        assert_eq!(report, FanoutReport { attempted: 0, failed: 0 });
    }

    #[tokio::test]
    async fn test_role_selects_delivery_primitive() {
        let radio = RecordingRadio::default();
        let mut registry = PeerRegistry::new();
        registry.register(PeerConnection::inbound(PeerAddress::new("sub")));
        registry.register(PeerConnection::discovered(PeerAddress::new("pending")));
        let mut outbound = PeerConnection::discovered(PeerAddress::new("srv"));
        outbound.set_state(crate::connection::PeerState::Ready);
        registry.register(outbound);

        let report = engine().send(&registry, &radio, b"{\"text\":\"hi\"}").await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 0);

        let notifications = radio.notifications.lock().unwrap();
        assert_eq!(notifications.as_slice(), &[(PeerAddress::new("sub"), b"{\"text\":\"hi\"}".to_vec())]);
        let writes = radio.writes.lock().unwrap();
        assert_eq!(writes.as_slice(), &[(PeerAddress::new("srv"), b"{\"text\":\"hi\"}".to_vec())]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let mut radio = RecordingRadio::default();
        radio.failing.insert(PeerAddress::new("bad"));
        let mut registry = PeerRegistry::new();
        for name in ["a", "bad", "c"] {
            registry.register(PeerConnection::inbound(PeerAddress::new(name)));
        }

        let mut engine = engine();
        let report = engine.send(&registry, &radio, b"x").await;
        assert_eq!(report, FanoutReport { attempted: 3, failed: 1 });
        assert_eq!(report.delivered(), 2);
        assert_eq!(radio.notifications.lock().unwrap().len(), 2);
        assert_eq!(engine.stats().deliveries_failed, 1);
    }

    #[test]
    fn test_incoming_filters_characteristic() {
        let mut engine = engine();
        assert_eq!(engine.on_incoming(CHARACTERISTIC, b"ping".to_vec()), Some(b"ping".to_vec()));
        assert_eq!(engine.on_incoming(Uuid::nil(), b"ping".to_vec()), None);
        assert_eq!(engine.stats().messages_received, 1);
        assert_eq!(engine.stats().foreign_values_ignored, 1);
    }

    #[tokio::test]
    async fn test_payload_is_delivered_verbatim() {
        let radio = RecordingRadio::default();
        let mut registry = PeerRegistry::new();
        registry.register(PeerConnection::inbound(PeerAddress::new("a")));
        let payload: Vec<u8> = (0u8..=255).collect();

        assert_ok!(radio.probe().await);
        engine().send(&registry, &radio, &payload).await;
        assert_eq!(radio.notifications.lock().unwrap()[0].1, payload);
    }
}
