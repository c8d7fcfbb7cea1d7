//! Connection Manager
//!
//! Owns the [`PeerRegistry`] and is the only component that mutates it. Radio
//! events and scanner discoveries are mapped to [`LinkEvent`]s, run through
//! the per-peer state machine, and turned into an [`Outcome`]: the radio
//! requests to issue and whether the Ready set changed. The session task
//! executes the outcome; this type never awaits anything.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::state::{LinkAction, LinkEvent, PeerState, Transition};
use crate::errors::TransitionError;
use crate::radio::RadioEvent;
use crate::registry::{PeerConnection, PeerRegistry};
use crate::types::{LinkRole, PeerAddress, ServiceIdentity};

// ----------------------------------------------------------------------------
// Outcome
// ----------------------------------------------------------------------------

/// Radio request produced by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub address: PeerAddress,
    pub role: LinkRole,
    pub action: LinkAction,
}

/// What the session task has to do after the manager handled an input
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub actions: Vec<PendingAction>,
    /// A peer joined or left, or a link was dropped; publish `PeerSetChanged`
    pub peer_set_changed: bool,
}

impl Outcome {
    fn merge(&mut self, other: Outcome) {
        self.actions.extend(other.actions);
        self.peer_set_changed |= other.peer_set_changed;
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && !self.peer_set_changed
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters for connection management
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub peers_registered: u64,
    pub peers_closed: u64,
    pub transitions: u64,
    pub rejected_transitions: u64,
    pub duplicate_discoveries: u64,
    pub conformance_failures: u64,
    pub peers_reaped: u64,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Drives every peer's state machine for one session
#[derive(Debug)]
pub struct ConnectionManager {
    identity: ServiceIdentity,
    registry: PeerRegistry,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            registry: PeerRegistry::new(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Scanner found a peer advertising our service
    pub fn on_peer_discovered(&mut self, address: PeerAddress) -> Outcome {
        if self.registry.is_tracked(&address) {
            self.stats.duplicate_discoveries += 1;
            debug!("Ignoring repeated discovery of {}", address);
            return Outcome::default();
        }

        self.registry
            .register(PeerConnection::discovered(address.clone()));
        self.stats.peers_registered += 1;
        info!("Discovered peer {}", address);

        self.apply(&address, LinkEvent::Initiate)
    }

    /// Map a radio event onto the affected peer's state machine
    pub fn on_radio_event(&mut self, event: &RadioEvent) -> Outcome {
        match event {
            RadioEvent::LinkConnected { address } => {
                self.apply_for_role(address, LinkRole::Central, LinkEvent::LinkUp)
            }
            RadioEvent::ConnectFailed { address, reason } => {
                warn!("Connection to {} failed: {}", address, reason);
                self.apply_for_role(address, LinkRole::Central, LinkEvent::LinkDown)
            }
            RadioEvent::LinkDisconnected { address } => {
                self.apply_for_role(address, LinkRole::Central, LinkEvent::LinkDown)
            }
            RadioEvent::ServicesDiscovered { address, services } => {
                let found = services.contains(&self.identity.service_uuid);
                if !found {
                    self.stats.conformance_failures += 1;
                    warn!(
                        "Peer {} does not expose service {}, closing",
                        address, self.identity.service_uuid
                    );
                }
                self.apply_for_role(
                    address,
                    LinkRole::Central,
                    LinkEvent::ServicesResolved { found },
                )
            }
            RadioEvent::CharacteristicsDiscovered {
                address,
                service,
                characteristics,
            } => {
                if *service != self.identity.service_uuid {
                    debug!("Ignoring characteristics of foreign service {} on {}", service, address);
                    return Outcome::default();
                }
                let found = characteristics.contains(&self.identity.characteristic_uuid);
                if !found {
                    self.stats.conformance_failures += 1;
                    warn!(
                        "Peer {} does not expose characteristic {}, closing",
                        address, self.identity.characteristic_uuid
                    );
                }
                self.apply_for_role(
                    address,
                    LinkRole::Central,
                    LinkEvent::CharacteristicsResolved { found },
                )
            }
            RadioEvent::DiscoveryFailed { address, reason } => {
                warn!("GATT discovery on {} failed: {}", address, reason);
                self.apply_for_role(address, LinkRole::Central, LinkEvent::Abort)
            }
            RadioEvent::Subscribed { address, .. } => {
                debug!("Notifications from {} enabled", address);
                Outcome::default()
            }
            RadioEvent::SubscribeFailed { address, reason } => {
                warn!("Subscribing to {} failed: {}", address, reason);
                self.apply_for_role(address, LinkRole::Central, LinkEvent::Abort)
            }
            RadioEvent::CentralSubscribed {
                address,
                characteristic,
            } => self.on_central_subscribed(address, *characteristic),
            RadioEvent::CentralUnsubscribed { address } => {
                self.apply_for_role(address, LinkRole::Peripheral, LinkEvent::LinkDown)
            }
            RadioEvent::AdvertisementSeen { .. }
            | RadioEvent::ScanFailed { .. }
            | RadioEvent::NotificationReceived { .. }
            | RadioEvent::WriteReceived { .. } => Outcome::default(),
        }
    }

    /// A central subscribed to our characteristic: it is Ready without an outbound connect
    fn on_central_subscribed(&mut self, address: &PeerAddress, characteristic: uuid::Uuid) -> Outcome {
        if characteristic != self.identity.characteristic_uuid {
            debug!("Ignoring subscription to foreign characteristic {}", characteristic);
            return Outcome::default();
        }
        if self.registry.is_tracked(address) {
            debug!("Central {} subscribed but peer is already tracked", address);
            return Outcome::default();
        }

        self.registry.register(PeerConnection::inbound(address.clone()));
        self.stats.peers_registered += 1;
        info!("Central {} subscribed, peer ready", address);

        Outcome {
            actions: Vec::new(),
            peer_set_changed: true,
        }
    }

    /// Force every peer to Closed and empty the registry (session stop)
    pub fn teardown_all(&mut self) -> Outcome {
        let mut outcome = Outcome::default();
        let addresses: Vec<PeerAddress> = self.registry.iter().map(|p| p.address.clone()).collect();

        for address in addresses {
            let state = match self.registry.get(&address) {
                Some(peer) => peer.state,
                None => continue,
            };
            if state != PeerState::Disconnecting {
                outcome.merge(self.apply(&address, LinkEvent::Teardown));
            }
            outcome.merge(self.apply(&address, LinkEvent::LinkDown));
        }

        for leftover in self.registry.drain() {
            debug!("Dropping {} in state {}", leftover.address, leftover.state);
        }

        outcome
    }

    /// Tear down peers stuck establishing (or disconnecting) for longer than `timeout`
    pub fn reap_stuck(&mut self, now: Instant, timeout: Duration) -> Outcome {
        let stuck: Vec<(PeerAddress, PeerState)> = self
            .registry
            .iter()
            .filter(|peer| {
                (peer.state.is_establishing() || peer.state == PeerState::Disconnecting)
                    && now.saturating_duration_since(peer.state_since) > timeout
            })
            .map(|peer| (peer.address.clone(), peer.state))
            .collect();

        let mut outcome = Outcome::default();
        for (address, state) in stuck {
            self.stats.peers_reaped += 1;
            if state == PeerState::Disconnecting {
                warn!("Peer {} never finished disconnecting, closing", address);
                outcome.merge(self.apply(&address, LinkEvent::LinkDown));
            } else {
                warn!("Peer {} stuck in {}, tearing down", address, state);
                outcome.merge(self.apply(&address, LinkEvent::Teardown));
            }
        }
        outcome
    }

    fn apply_for_role(&mut self, address: &PeerAddress, role: LinkRole, event: LinkEvent) -> Outcome {
        match self.registry.get(address) {
            Some(peer) if peer.role == role => self.apply(address, event),
            Some(peer) => {
                debug!(
                    "Ignoring {} for {} link to {} (tracked as {})",
                    event, role, address, peer.role
                );
                Outcome::default()
            }
            None => {
                debug!("Ignoring {} for untracked peer {}", event, address);
                self.stats.rejected_transitions += 1;
                Outcome::default()
            }
        }
    }

    /// The transition function: the only place a `PeerConnection` changes
    fn apply(&mut self, address: &PeerAddress, event: LinkEvent) -> Outcome {
        match self.transition(address, event) {
            Ok((role, transition)) => {
                let mut outcome = Outcome::default();
                if let Some(action) = transition.action {
                    outcome.actions.push(PendingAction {
                        address: address.clone(),
                        role,
                        action,
                    });
                }
                outcome.peer_set_changed = transition.changes_ready_set() || transition.to.is_closed();
                outcome
            }
            Err(e) => {
                self.stats.rejected_transitions += 1;
                debug!("Dropping event for {}: {}", address, e);
                Outcome::default()
            }
        }
    }

    fn transition(
        &mut self,
        address: &PeerAddress,
        event: LinkEvent,
    ) -> Result<(LinkRole, Transition), TransitionError> {
        let peer = self
            .registry
            .get_mut(address)
            .ok_or_else(|| TransitionError::UnknownPeer(address.clone()))?;

        let transition = peer.state.on(&event)?;
        peer.set_state(transition.to);
        let role = peer.role;
        self.stats.transitions += 1;
        debug!(
            "Peer {} ({}) {} -> {} on {}",
            address, role, transition.from, transition.to, event
        );

        if transition.to.is_ready() {
            info!("Peer {} ready after {:?}", address, peer.created_at.elapsed());
        }
        if transition.to.is_closed() {
            self.registry.remove(address);
            self.stats.peers_closed += 1;
            info!("Peer {} closed", address);
        }

        Ok((role, transition))
    }
}
