//! Virtual radio medium
//!
//! An in-memory stand-in for the 2.4 GHz band. Every node added to a
//! [`VirtualAir`] gets a [`VirtualRadio`] implementing the core `Radio`
//! trait. Advertising, scanning, GATT links, subscriptions, writes and
//! notifications are routed between nodes and reported through each node's
//! event sender, with no latency. Fault injection covers non-conformant
//! peers, stalled connects, failing notifications and adapter capabilities.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use blipchat_core::radio::codes;
use blipchat_core::{
    AdapterStatus, PeerAddress, Radio, RadioError, RadioEvent, RadioEventSender, RadioResult,
    ServiceIdentity,
};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Node Profile
// ----------------------------------------------------------------------------

/// Capabilities and faults of one virtual node
#[derive(Debug, Clone)]
pub struct NodeProfile {
    /// Adapter can be peripheral and central at once
    pub dual_role: bool,
    /// Adapter is switched on
    pub powered: bool,
    /// GATT server exposes the session service after `open`
    pub exposes_service: bool,
    /// Session service contains the session characteristic
    pub exposes_characteristic: bool,
    /// Outbound connects from this node never complete
    pub stall_connections: bool,
    /// Platform code returned when advertising is requested
    pub reject_advertising: Option<i32>,
    /// Platform code returned when scanning is requested
    pub reject_scan: Option<i32>,
}

impl Default for NodeProfile {
    fn default() -> Self {
        Self::conformant()
    }
}

impl NodeProfile {
    pub fn conformant() -> Self {
        Self {
            dual_role: true,
            powered: true,
            exposes_service: true,
            exposes_characteristic: true,
            stall_connections: false,
            reject_advertising: None,
            reject_scan: None,
        }
    }

    /// Adapter without peripheral support
    pub fn unsupported() -> Self {
        Self {
            dual_role: false,
            ..Self::conformant()
        }
    }

    pub fn powered_off() -> Self {
        Self {
            powered: false,
            ..Self::conformant()
        }
    }

    /// Advertises the service UUID but serves a different GATT database
    pub fn without_service() -> Self {
        Self {
            exposes_service: false,
            ..Self::conformant()
        }
    }

    pub fn without_characteristic() -> Self {
        Self {
            exposes_characteristic: false,
            ..Self::conformant()
        }
    }

    pub fn stalling() -> Self {
        Self {
            stall_connections: true,
            ..Self::conformant()
        }
    }

    pub fn with_advertising_rejected(mut self, code: i32) -> Self {
        self.reject_advertising = Some(code);
        self
    }

    pub fn with_scan_rejected(mut self, code: i32) -> Self {
        self.reject_scan = Some(code);
        self
    }
}

// ----------------------------------------------------------------------------
// Air State
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Node {
    profile: NodeProfile,
    /// GATT server identity while open
    server: Option<ServiceIdentity>,
    /// Sender of the latest `open`; kept after `close` to model late callbacks
    sender: Option<RadioEventSender>,
    advertising: Option<(Uuid, String)>,
    scanning: Option<Uuid>,
    /// Outbound links (this node is central)
    links: HashSet<PeerAddress>,
    /// Centrals subscribed to this node's characteristic
    subscribers: HashSet<PeerAddress>,
    /// Last value notified from this node's characteristic
    value: Vec<u8>,
}

impl Node {
    fn new(profile: NodeProfile) -> Self {
        Self {
            profile,
            server: None,
            sender: None,
            advertising: None,
            scanning: None,
            links: HashSet::new(),
            subscribers: HashSet::new(),
            value: Vec::new(),
        }
    }

    fn emit(&self, event: RadioEvent) {
        match &self.sender {
            Some(sender) => {
                trace!("Air event {:?}", event);
                sender.emit(event);
            }
            None => trace!("Node has no event sender, dropping {:?}", event),
        }
    }
}

#[derive(Debug, Default)]
struct AirState {
    nodes: HashMap<PeerAddress, Node>,
    /// (notifier, subscriber) pairs whose notifications fail
    failing_notifications: HashSet<(PeerAddress, PeerAddress)>,
}

impl AirState {
    fn node(&self, address: &PeerAddress) -> RadioResult<&Node> {
        self.nodes
            .get(address)
            .ok_or_else(|| RadioError::UnknownPeer(address.clone()))
    }

    fn node_mut(&mut self, address: &PeerAddress) -> RadioResult<&mut Node> {
        self.nodes
            .get_mut(address)
            .ok_or_else(|| RadioError::UnknownPeer(address.clone()))
    }

    fn emit_to(&self, address: &PeerAddress, event: RadioEvent) {
        if let Some(node) = self.nodes.get(address) {
            node.emit(event);
        }
    }

    /// Report `advertiser` to `scanner` if the scan filter matches
    fn announce(&self, advertiser: &PeerAddress, scanner: &PeerAddress) {
        if advertiser == scanner {
            return;
        }
        let (Some(adv), Some(scan)) = (self.nodes.get(advertiser), self.nodes.get(scanner)) else {
            return;
        };
        if let (Some((service, name)), Some(filter)) = (&adv.advertising, scan.scanning) {
            if *service == filter {
                scan.emit(RadioEvent::AdvertisementSeen {
                    address: advertiser.clone(),
                    local_name: Some(name.clone()),
                    services: vec![*service],
                });
            }
        }
    }

    /// Drop the outbound link `central -> peripheral` and tell both ends
    fn sever(&mut self, central: &PeerAddress, peripheral: &PeerAddress) {
        let had_link = self
            .nodes
            .get_mut(central)
            .map(|node| node.links.remove(peripheral))
            .unwrap_or(false);
        let had_subscription = self
            .nodes
            .get_mut(peripheral)
            .map(|node| node.subscribers.remove(central))
            .unwrap_or(false);

        if had_subscription {
            self.emit_to(
                peripheral,
                RadioEvent::CentralUnsubscribed {
                    address: central.clone(),
                },
            );
        }
        if had_link {
            self.emit_to(
                central,
                RadioEvent::LinkDisconnected {
                    address: peripheral.clone(),
                },
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Traffic counters across the whole medium
#[derive(Debug, Default)]
pub struct AirStats {
    pub advertisements: AtomicU64,
    pub connects: AtomicU64,
    pub writes: AtomicU64,
    pub notifications: AtomicU64,
    pub failed_deliveries: AtomicU64,
}

impl AirStats {
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Virtual Air
// ----------------------------------------------------------------------------

/// Shared medium connecting virtual radios
#[derive(Debug, Clone, Default)]
pub struct VirtualAir {
    state: Arc<Mutex<AirState>>,
    stats: Arc<AirStats>,
}

impl VirtualAir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &AirStats {
        &self.stats
    }

    /// Add a node and return its radio
    pub async fn add_node(&self, address: impl Into<PeerAddress>, profile: NodeProfile) -> Arc<VirtualRadio> {
        let address = address.into();
        let mut state = self.state.lock().await;
        state.nodes.insert(address.clone(), Node::new(profile));
        debug!("Virtual air: added node {}", address);
        Arc::new(VirtualRadio {
            address,
            air: self.clone(),
        })
    }

    /// Make notifications from `notifier` to `subscriber` fail
    pub async fn fail_notifications(&self, notifier: &PeerAddress, subscriber: &PeerAddress) {
        let mut state = self.state.lock().await;
        state
            .failing_notifications
            .insert((notifier.clone(), subscriber.clone()));
    }

    /// Re-deliver every matching advertisement, as a platform scan does periodically
    pub async fn rebroadcast(&self) {
        let state = self.state.lock().await;
        let addresses: Vec<PeerAddress> = state.nodes.keys().cloned().collect();
        for advertiser in &addresses {
            for scanner in &addresses {
                state.announce(advertiser, scanner);
            }
        }
        self.stats.advertisements.fetch_add(1, Ordering::Relaxed);
    }

    /// Deliver `event` to `address` through its latest sender, even after `close`
    pub async fn inject(&self, address: &PeerAddress, event: RadioEvent) {
        let state = self.state.lock().await;
        state.emit_to(address, event);
    }

    /// Sender handed to `address` by its latest `open`
    ///
    /// Holding on to it across a restart models a callback from an earlier session.
    pub async fn event_sender(&self, address: &PeerAddress) -> Option<RadioEventSender> {
        let state = self.state.lock().await;
        state.nodes.get(address).and_then(|node| node.sender.clone())
    }

    /// Whether `central` currently holds an outbound link to `peripheral`
    pub async fn is_linked(&self, central: &PeerAddress, peripheral: &PeerAddress) -> bool {
        let state = self.state.lock().await;
        state
            .nodes
            .get(central)
            .map(|node| node.links.contains(peripheral))
            .unwrap_or(false)
    }

    /// Local name `address` is advertising with, if it is advertising
    pub async fn advertised_name(&self, address: &PeerAddress) -> Option<String> {
        let state = self.state.lock().await;
        state
            .nodes
            .get(address)
            .and_then(|node| node.advertising.as_ref())
            .map(|(_, name)| name.clone())
    }

    /// Value a GATT read of `address`'s characteristic would return
    pub async fn characteristic_value(&self, address: &PeerAddress) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.nodes.get(address).map(|node| node.value.clone())
    }
}

// ----------------------------------------------------------------------------
// Virtual Radio
// ----------------------------------------------------------------------------

/// One node's radio on a [`VirtualAir`]
#[derive(Debug)]
pub struct VirtualRadio {
    address: PeerAddress,
    air: VirtualAir,
}

impl VirtualRadio {
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }
}

#[async_trait]
impl Radio for VirtualRadio {
    async fn probe(&self) -> RadioResult<AdapterStatus> {
        let state = self.air.state.lock().await;
        let node = state.node(&self.address)?;
        Ok(AdapterStatus {
            dual_role: node.profile.dual_role,
            powered: node.profile.powered,
        })
    }

    async fn open(&self, identity: &ServiceIdentity, events: RadioEventSender) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        let node = state.node_mut(&self.address)?;
        node.server = Some(*identity);
        node.sender = Some(events);
        node.value.clear();
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.air.state.lock().await;
        let (links, subscribers) = match state.nodes.get(&self.address) {
            Some(node) => (
                node.links.iter().cloned().collect::<Vec<_>>(),
                node.subscribers.iter().cloned().collect::<Vec<_>>(),
            ),
            None => return,
        };
        for peripheral in links {
            state.sever(&self.address, &peripheral);
        }
        for central in subscribers {
            state.sever(&central, &self.address);
        }
        if let Some(node) = state.nodes.get_mut(&self.address) {
            node.server = None;
            node.advertising = None;
            node.scanning = None;
        }
    }

    async fn advertise(&self, service: Uuid, local_name: &str) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        let node = state.node_mut(&self.address)?;
        if let Some(code) = node.profile.reject_advertising {
            return Err(RadioError::Rejected {
                code,
                reason: "advertising rejected".to_string(),
            });
        }
        if node.advertising.is_some() {
            return Err(RadioError::Rejected {
                code: codes::ALREADY_STARTED,
                reason: "already advertising".to_string(),
            });
        }
        node.advertising = Some((service, local_name.to_string()));

        let scanners: Vec<PeerAddress> = state.nodes.keys().cloned().collect();
        for scanner in &scanners {
            state.announce(&self.address, scanner);
        }
        self.air.stats.advertisements.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stop_advertising(&self) {
        let mut state = self.air.state.lock().await;
        if let Some(node) = state.nodes.get_mut(&self.address) {
            node.advertising = None;
        }
    }

    async fn scan(&self, service: Uuid) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        let node = state.node_mut(&self.address)?;
        if let Some(code) = node.profile.reject_scan {
            return Err(RadioError::Rejected {
                code,
                reason: "scan rejected".to_string(),
            });
        }
        node.scanning = Some(service);

        let advertisers: Vec<PeerAddress> = state.nodes.keys().cloned().collect();
        for advertiser in &advertisers {
            state.announce(advertiser, &self.address);
        }
        Ok(())
    }

    async fn stop_scan(&self) {
        let mut state = self.air.state.lock().await;
        if let Some(node) = state.nodes.get_mut(&self.address) {
            node.scanning = None;
        }
    }

    async fn connect(&self, peer: &PeerAddress) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        self.air.stats.connects.fetch_add(1, Ordering::Relaxed);
        if state.node(&self.address)?.profile.stall_connections {
            debug!("Virtual air: connect {} -> {} stalls", self.address, peer);
            return Ok(());
        }

        let reachable = state
            .nodes
            .get(peer)
            .map(|node| node.server.is_some())
            .unwrap_or(false);
        let event = if reachable {
            state.node_mut(&self.address)?.links.insert(peer.clone());
            RadioEvent::LinkConnected {
                address: peer.clone(),
            }
        } else {
            RadioEvent::ConnectFailed {
                address: peer.clone(),
                reason: "peer out of range".to_string(),
            }
        };
        state.emit_to(&self.address, event);
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerAddress) {
        let mut state = self.air.state.lock().await;
        let Some(node) = state.nodes.get(&self.address) else {
            return;
        };
        if node.links.contains(peer) {
            state.sever(&self.address, peer);
        } else if node.subscribers.contains(peer) {
            state.sever(peer, &self.address);
        }
    }

    async fn discover_services(&self, peer: &PeerAddress) -> RadioResult<()> {
        let state = self.air.state.lock().await;
        if !state.node(&self.address)?.links.contains(peer) {
            return Err(RadioError::NotConnected(peer.clone()));
        }
        let remote = state.node(peer)?;
        let services = match remote.server {
            Some(identity) if remote.profile.exposes_service => vec![identity.service_uuid],
            _ => vec![Uuid::from_u128(0x1800)],
        };
        state.emit_to(
            &self.address,
            RadioEvent::ServicesDiscovered {
                address: peer.clone(),
                services,
            },
        );
        Ok(())
    }

    async fn discover_characteristics(&self, peer: &PeerAddress, service: Uuid) -> RadioResult<()> {
        let state = self.air.state.lock().await;
        if !state.node(&self.address)?.links.contains(peer) {
            return Err(RadioError::NotConnected(peer.clone()));
        }
        let remote = state.node(peer)?;
        let characteristics = match remote.server {
            Some(identity) if remote.profile.exposes_characteristic => {
                vec![identity.characteristic_uuid]
            }
            _ => Vec::new(),
        };
        state.emit_to(
            &self.address,
            RadioEvent::CharacteristicsDiscovered {
                address: peer.clone(),
                service,
                characteristics,
            },
        );
        Ok(())
    }

    async fn subscribe(&self, peer: &PeerAddress, _service: Uuid, characteristic: Uuid) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        if !state.node(&self.address)?.links.contains(peer) {
            return Err(RadioError::NotConnected(peer.clone()));
        }
        state.node_mut(peer)?.subscribers.insert(self.address.clone());

        state.emit_to(
            &self.address,
            RadioEvent::Subscribed {
                address: peer.clone(),
                characteristic,
            },
        );
        state.emit_to(
            peer,
            RadioEvent::CentralSubscribed {
                address: self.address.clone(),
                characteristic,
            },
        );
        Ok(())
    }

    async fn write_characteristic(
        &self,
        peer: &PeerAddress,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> RadioResult<()> {
        let state = self.air.state.lock().await;
        if !state.node(&self.address)?.links.contains(peer) {
            self.air.stats.failed_deliveries.fetch_add(1, Ordering::Relaxed);
            return Err(RadioError::NotConnected(peer.clone()));
        }
        state.emit_to(
            peer,
            RadioEvent::WriteReceived {
                address: self.address.clone(),
                characteristic,
                value: value.to_vec(),
            },
        );
        self.air.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn notify(&self, central: &PeerAddress, characteristic: Uuid, value: &[u8]) -> RadioResult<()> {
        let mut state = self.air.state.lock().await;
        let failing = state
            .failing_notifications
            .contains(&(self.address.clone(), central.clone()));

        let node = state.node_mut(&self.address)?;
        node.value = value.to_vec();
        if !node.subscribers.contains(central) {
            self.air.stats.failed_deliveries.fetch_add(1, Ordering::Relaxed);
            return Err(RadioError::UnknownPeer(central.clone()));
        }
        if failing {
            self.air.stats.failed_deliveries.fetch_add(1, Ordering::Relaxed);
            return Err(RadioError::DeliveryFailed {
                peer: central.clone(),
                reason: "notification not acknowledged".to_string(),
            });
        }

        state.emit_to(
            central,
            RadioEvent::NotificationReceived {
                address: self.address.clone(),
                characteristic,
                value: value.to_vec(),
            },
        );
        self.air.stats.notifications.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
