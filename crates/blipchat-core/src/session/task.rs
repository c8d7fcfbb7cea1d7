//! Session task: the single place session state changes
//!
//! Host commands, radio events and the maintenance tick are multiplexed with
//! `tokio::select!` and handled one at a time, so the Connection Manager and
//! the Broadcast Engine never see concurrent mutation.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::advertiser::Advertiser;
use crate::broadcast::BroadcastEngine;
use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, LinkAction, Outcome, PendingAction};
use crate::errors::{SendError, StartError};
use crate::radio::{Radio, RadioEvent, RadioEventSender, StampedEvent};
use crate::scanner::Scanner;
use crate::session::{SessionCommand, SessionEvent};
use crate::types::{FanoutReport, PeerAddress, ServiceIdentity, SessionState};

/// Components that only exist while a session is Active
struct ActiveSession {
    identity: ServiceIdentity,
    advertiser: Advertiser,
    scanner: Scanner,
    connections: ConnectionManager,
    broadcast: BroadcastEngine,
}

impl ActiveSession {
    fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            advertiser: Advertiser::new(),
            scanner: Scanner::new(),
            connections: ConnectionManager::new(identity),
            broadcast: BroadcastEngine::new(identity),
        }
    }
}

pub(crate) struct SessionTask {
    radio: Arc<dyn Radio>,
    config: SessionConfig,
    state: SessionState,
    /// Bumped on every start and stop; events stamped otherwise are stale
    epoch: u64,
    active: Option<ActiveSession>,
    commands: mpsc::Receiver<SessionCommand>,
    radio_tx: mpsc::UnboundedSender<StampedEvent>,
    radio_rx: mpsc::UnboundedReceiver<StampedEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    peers_tx: watch::Sender<Vec<PeerAddress>>,
}

impl SessionTask {
    pub(crate) fn new(
        radio: Arc<dyn Radio>,
        config: SessionConfig,
        commands: mpsc::Receiver<SessionCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
        state_tx: watch::Sender<SessionState>,
        peers_tx: watch::Sender<Vec<PeerAddress>>,
    ) -> Self {
        let (radio_tx, radio_rx) = mpsc::unbounded_channel();
        Self {
            radio,
            config,
            state: SessionState::Idle,
            epoch: 0,
            active: None,
            commands,
            radio_tx,
            radio_rx,
            events,
            state_tx,
            peers_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut maintenance = time::interval(self.config.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(stamped) = self.radio_rx.recv() => {
                    self.handle_radio_event(stamped).await;
                }
                _ = maintenance.tick() => {
                    self.perform_maintenance().await;
                }
            }
        }

        debug!("All session handles dropped, shutting down");
        self.stop().await;
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start {
                identity,
                local_name,
                reply,
            } => {
                let result = self.start(identity, &local_name).await;
                let _ = reply.send(result);
            }
            SessionCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            SessionCommand::Send { payload, reply } => {
                let result = self.send(&payload).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn start(&mut self, identity: ServiceIdentity, local_name: &str) -> Result<(), StartError> {
        if self.state != SessionState::Idle {
            return Err(StartError::AlreadyActive(self.state));
        }
        self.set_state(SessionState::Starting);

        match self.radio.probe().await {
            Ok(status) if !status.dual_role => {
                return self.abort_start(StartError::UnsupportedHardware);
            }
            Ok(status) if !status.powered => {
                return self.abort_start(StartError::RadioDisabled);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Adapter probe failed: {}", e);
                return self.abort_start(StartError::UnsupportedHardware);
            }
        }

        self.epoch += 1;
        let sender = RadioEventSender::new(self.epoch, self.radio_tx.clone());
        if let Err(e) = self.radio.open(&identity, sender).await {
            error!("Failed to publish GATT service {}: {}", identity.service_uuid, e);
            return self.abort_start(StartError::GattServer(e.to_string()));
        }

        let local_name = if local_name.is_empty() {
            self.config.default_local_name.as_str()
        } else {
            local_name
        };

        let mut active = ActiveSession::new(identity);
        let radio = self.radio.as_ref();
        let (advertising, scanning) = tokio::join!(
            active.advertiser.start(radio, &identity, local_name),
            active.scanner.start(radio, identity.service_uuid),
        );
        self.active = Some(active);
        self.set_state(SessionState::Active);
        info!("Session started for {}", identity);

        self.emit(SessionEvent::AdvertisingStateChanged(advertising.is_ok()));
        self.emit(SessionEvent::ScanningStateChanged(scanning.is_ok()));
        Ok(())
    }

    fn abort_start(&mut self, error: StartError) -> Result<(), StartError> {
        warn!("Session start failed: {}", error);
        self.set_state(SessionState::Idle);
        Err(error)
    }

    async fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        self.set_state(SessionState::Stopping);

        let had_ready_peers = !active.connections.registry().ready_addresses().is_empty();
        let teardown = active.connections.teardown_all();
        let radio = self.radio.as_ref();
        for pending in teardown.actions {
            if pending.action == LinkAction::Disconnect {
                radio.disconnect(&pending.address).await;
            }
        }

        let was_advertising = active.advertiser.is_advertising();
        let was_scanning = active.scanner.is_scanning();
        let local_name = active.advertiser.local_name().unwrap_or_default().to_string();
        active.scanner.stop(radio).await;
        active.advertiser.stop(radio).await;
        radio.close().await;

        // Completions still in flight belong to the old epoch
        self.epoch += 1;

        if had_ready_peers {
            self.publish_peer_set(Vec::new());
        }
        if was_advertising {
            self.emit(SessionEvent::AdvertisingStateChanged(false));
        }
        if was_scanning {
            self.emit(SessionEvent::ScanningStateChanged(false));
        }
        self.set_state(SessionState::Idle);
        info!(
            "Session '{}' stopped ({} discoveries, {} peers registered, {} messages sent)",
            local_name,
            active.scanner.discoveries(),
            active.connections.stats().peers_registered,
            active.broadcast.stats().messages_sent
        );
    }

    async fn send(&mut self, payload: &[u8]) -> Result<FanoutReport, SendError> {
        let active = match self.active.as_mut() {
            Some(active) if self.state == SessionState::Active => active,
            _ => return Err(SendError::NotActive),
        };
        if payload.len() > self.config.max_payload_size {
            return Err(SendError::PayloadTooLarge {
                size: payload.len(),
                max_size: self.config.max_payload_size,
            });
        }

        let report = active
            .broadcast
            .send(active.connections.registry(), self.radio.as_ref(), payload)
            .await;
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Radio events
    // ------------------------------------------------------------------------

    async fn handle_radio_event(&mut self, stamped: StampedEvent) {
        if stamped.epoch != self.epoch || self.state != SessionState::Active {
            trace!(
                "Discarding event from epoch {} (current {}, {})",
                stamped.epoch,
                self.epoch,
                self.state
            );
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let outcome = match stamped.event {
            RadioEvent::AdvertisementSeen {
                address, services, ..
            } => match active.scanner.on_advertisement(&address, &services) {
                Some(address) => active.connections.on_peer_discovered(address),
                None => Outcome::default(),
            },
            RadioEvent::ScanFailed { code } => {
                let error = active.scanner.on_scan_failed(code);
                warn!("Scanning ended: {}", error);
                self.emit(SessionEvent::ScanningStateChanged(false));
                return;
            }
            RadioEvent::NotificationReceived {
                characteristic,
                value,
                ..
            }
            | RadioEvent::WriteReceived {
                characteristic,
                value,
                ..
            } => {
                if let Some(payload) = active.broadcast.on_incoming(characteristic, value) {
                    self.emit(SessionEvent::MessageReceived(payload));
                }
                return;
            }
            other => active.connections.on_radio_event(&other),
        };

        self.execute(outcome).await;
    }

    async fn perform_maintenance(&mut self) {
        let timeout = self.config.connection_timeout;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let outcome = active.connections.reap_stuck(Instant::now(), timeout);
        if !outcome.is_empty() {
            self.execute(outcome).await;
        }
    }

    /// Issue the radio requests of `outcome`
    ///
    /// A request the radio refuses outright is fed back into the Connection
    /// Manager as the matching failure event, which may queue further actions.
    async fn execute(&mut self, outcome: Outcome) {
        let radio = Arc::clone(&self.radio);
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let mut peer_set_changed = outcome.peer_set_changed;
        let mut queue: VecDeque<PendingAction> = outcome.actions.into();
        while let Some(pending) = queue.pop_front() {
            if let Some(failure) = issue(radio.as_ref(), &active.identity, &pending).await {
                let follow_up = active.connections.on_radio_event(&failure);
                peer_set_changed |= follow_up.peer_set_changed;
                queue.extend(follow_up.actions);
            }
        }

        if peer_set_changed {
            let ready = active.connections.registry().ready_addresses().into_vec();
            self.publish_peer_set(ready);
        }
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event receiver dropped");
        }
    }

    fn publish_peer_set(&self, ready: Vec<PeerAddress>) {
        debug!("Ready peers: {:?}", ready);
        self.peers_tx.send_replace(ready.clone());
        self.emit(SessionEvent::PeerSetChanged(ready));
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Issue one radio request; returns the failure event when it was refused
async fn issue(radio: &dyn Radio, identity: &ServiceIdentity, pending: &PendingAction) -> Option<RadioEvent> {
    let address = pending.address.clone();
    match pending.action {
        LinkAction::Connect => radio
            .connect(&address)
            .await
            .err()
            .map(|e| RadioEvent::ConnectFailed {
                address,
                reason: e.to_string(),
            }),
        LinkAction::DiscoverServices => radio
            .discover_services(&address)
            .await
            .err()
            .map(|e| RadioEvent::DiscoveryFailed {
                address,
                reason: e.to_string(),
            }),
        LinkAction::DiscoverCharacteristics => radio
            .discover_characteristics(&address, identity.service_uuid)
            .await
            .err()
            .map(|e| RadioEvent::DiscoveryFailed {
                address,
                reason: e.to_string(),
            }),
        LinkAction::Subscribe => radio
            .subscribe(&address, identity.service_uuid, identity.characteristic_uuid)
            .await
            .err()
            .map(|e| RadioEvent::SubscribeFailed {
                address,
                reason: e.to_string(),
            }),
        LinkAction::Disconnect => {
            radio.disconnect(&address).await;
            None
        }
    }
}
