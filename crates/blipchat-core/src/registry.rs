//! Peer Registry
//!
//! Single source of truth for peer state within a session. Keyed by
//! [`PeerAddress`], so one address maps to at most one connection. Mutation
//! is crate-private: only the Connection Manager's transition function
//! changes entries.

use std::collections::HashMap;

use smallvec::SmallVec;
use tokio::time::Instant;

use crate::connection::PeerState;
use crate::types::{LinkRole, PeerAddress};

// ----------------------------------------------------------------------------
// Peer Connection
// ----------------------------------------------------------------------------

/// One tracked link to a peer
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub address: PeerAddress,
    pub role: LinkRole,
    pub state: PeerState,
    /// When the entry was registered
    pub created_at: Instant,
    /// When the entry entered its current state
    pub state_since: Instant,
}

impl PeerConnection {
    /// Peer found by our scanner; we will connect out to it
    pub fn discovered(address: PeerAddress) -> Self {
        let now = Instant::now();
        Self {
            address,
            role: LinkRole::Central,
            state: PeerState::Discovered,
            created_at: now,
            state_since: now,
        }
    }

    /// Peer that connected to our GATT server and subscribed; Ready at once
    pub fn inbound(address: PeerAddress) -> Self {
        let now = Instant::now();
        Self {
            address,
            role: LinkRole::Peripheral,
            state: PeerState::Ready,
            created_at: now,
            state_since: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub(crate) fn set_state(&mut self, state: PeerState) {
        if self.state != state {
            self.state = state;
            self.state_since = Instant::now();
        }
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Fan-out target: address plus the role that decides the delivery primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPeer {
    pub address: PeerAddress,
    pub role: LinkRole,
}

/// Index of live peer connections
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerAddress, PeerConnection>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &PeerAddress) -> Option<&PeerConnection> {
        self.peers.get(address)
    }

    /// Whether a non-Closed connection exists for `address`
    pub fn is_tracked(&self, address: &PeerAddress) -> bool {
        self.peers
            .get(address)
            .map(|peer| !peer.state.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    /// Current fan-out targets
    pub fn ready_peers(&self) -> Vec<ReadyPeer> {
        self.peers
            .values()
            .filter(|peer| peer.is_ready())
            .map(|peer| ReadyPeer {
                address: peer.address.clone(),
                role: peer.role,
            })
            .collect()
    }

    /// Sorted addresses of Ready peers, as published in `PeerSetChanged`
    pub fn ready_addresses(&self) -> SmallVec<[PeerAddress; 8]> {
        let mut addresses: SmallVec<[PeerAddress; 8]> = self
            .peers
            .values()
            .filter(|peer| peer.is_ready())
            .map(|peer| peer.address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub(crate) fn get_mut(&mut self, address: &PeerAddress) -> Option<&mut PeerConnection> {
        self.peers.get_mut(address)
    }

    /// Register a connection unless a live one already exists for its address
    pub(crate) fn register(&mut self, connection: PeerConnection) -> bool {
        if self.is_tracked(&connection.address) {
            return false;
        }
        self.peers.insert(connection.address.clone(), connection);
        true
    }

    pub(crate) fn remove(&mut self, address: &PeerAddress) -> Option<PeerConnection> {
        self.peers.remove(address)
    }

    pub(crate) fn drain(&mut self) -> Vec<PeerConnection> {
        self.peers.drain().map(|(_, peer)| peer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deduplicates_by_address() {
        let mut registry = PeerRegistry::new();
        let address = PeerAddress::new("11:22:33:44:55:66");

        assert!(registry.register(PeerConnection::discovered(address.clone())));
        assert!(!registry.register(PeerConnection::discovered(address.clone())));
        assert!(!registry.register(PeerConnection::inbound(address.clone())));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&address).unwrap().role, LinkRole::Central);
    }

    #[test]
    fn test_ready_subset() {
        let mut registry = PeerRegistry::new();
        registry.register(PeerConnection::discovered(PeerAddress::new("b")));
        registry.register(PeerConnection::inbound(PeerAddress::new("c")));
        registry.register(PeerConnection::inbound(PeerAddress::new("a")));

        let ready = registry.ready_addresses();
        assert_eq!(ready.as_slice(), &[PeerAddress::new("a"), PeerAddress::new("c")]);
        assert!(registry
            .ready_peers()
            .iter()
            .all(|peer| peer.role == LinkRole::Peripheral));
    }

    #[test]
    fn test_closed_entry_does_not_block_registration() {
        let mut registry = PeerRegistry::new();
        let address = PeerAddress::new("x");
        registry.register(PeerConnection::discovered(address.clone()));
        registry
            .get_mut(&address)
            .unwrap()
            .set_state(PeerState::Closed);

        assert!(!registry.is_tracked(&address));
        assert!(registry.register(PeerConnection::inbound(address.clone())));
        assert!(registry.get(&address).unwrap().is_ready());
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = PeerRegistry::new();
        registry.register(PeerConnection::inbound(PeerAddress::new("a")));
        registry.register(PeerConnection::inbound(PeerAddress::new("b")));
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
