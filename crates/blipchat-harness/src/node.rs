//! High-level test node
//!
//! Wraps a virtual radio and the session running on it so integration tests
//! read as scenarios instead of channel plumbing.

use std::sync::Arc;
use std::time::Duration;

use blipchat_core::{
    PeerAddress, SessionConfig, SessionController, SessionEvent, SessionEvents, ServiceIdentity, StartError,
};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::air::{NodeProfile, VirtualAir, VirtualRadio};

pub const TEST_SERVICE: Uuid = Uuid::from_u128(0x0000B1C0_0000_1000_8000_00805F9B34FB);
pub const TEST_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000B1C1_0000_1000_8000_00805F9B34FB);

/// How long scenario helpers wait before giving up
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

pub fn test_identity() -> ServiceIdentity {
    ServiceIdentity::new(TEST_SERVICE, TEST_CHARACTERISTIC)
}

/// One device: a virtual radio plus a session driving it
pub struct TestNode {
    pub address: PeerAddress,
    pub radio: Arc<VirtualRadio>,
    pub session: SessionController,
    pub events: SessionEvents,
}

impl TestNode {
    pub async fn new(air: &VirtualAir, name: &str, profile: NodeProfile) -> Self {
        Self::with_config(air, name, profile, SessionConfig::default()).await
    }

    pub async fn with_config(air: &VirtualAir, name: &str, profile: NodeProfile, config: SessionConfig) -> Self {
        let radio = air.add_node(name, profile).await;
        let (session, events) = match SessionController::spawn(radio.clone(), config) {
            Ok(spawned) => spawned,
            Err(e) => panic!("invalid session config for {}: {}", name, e),
        };
        Self {
            address: PeerAddress::new(name),
            radio,
            session,
            events,
        }
    }

    /// Start the session with the shared test identity
    pub async fn start(&self) -> Result<(), StartError> {
        self.session.start(test_identity(), self.address.as_str()).await
    }

    /// Wait until the published Ready set satisfies `predicate`
    pub async fn wait_for_peers<F>(&self, predicate: F) -> Vec<PeerAddress>
    where
        F: FnMut(&Vec<PeerAddress>) -> bool,
    {
        let mut peers = self.session.subscribe_peers();
        let ready = match timeout(SETTLE_TIMEOUT, peers.wait_for(predicate)).await {
            Ok(Ok(ready)) => ready.clone(),
            Ok(Err(_)) => panic!("{}: session task ended while waiting for peers", self.address),
            Err(_) => panic!(
                "{}: peer set never settled, last {:?}",
                self.address,
                self.session.ready_peers()
            ),
        };
        ready
    }

    /// Wait until `peer` is Ready
    pub async fn wait_for_peer(&self, peer: &PeerAddress) {
        self.wait_for_peers(|ready| ready.contains(peer)).await;
    }

    /// Next event matching `predicate`, skipping the rest
    pub async fn next_event<F>(&mut self, mut predicate: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        let address = self.address.clone();
        let events = &mut self.events;
        let found = timeout(SETTLE_TIMEOUT, async {
            while let Some(event) = events.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
                debug!("{}: skipping {:?}", address, event);
            }
            None
        })
        .await;
        match found {
            Ok(Some(event)) => event,
            Ok(None) => panic!("{}: event stream closed", self.address),
            Err(_) => panic!("{}: expected event never arrived", self.address),
        }
    }

    /// Next received message payload
    pub async fn next_message(&mut self) -> Vec<u8> {
        match self
            .next_event(|e| matches!(e, SessionEvent::MessageReceived(_)))
            .await
        {
            SessionEvent::MessageReceived(payload) => payload,
            other => unreachable!("filtered to messages, got {:?}", other),
        }
    }

    /// Events already queued, without waiting
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
