//! Peripheral role: GATT server, advertising and notifications
//!
//! btleplug only covers the central role, so the peripheral half is a
//! per-platform implementation behind [`GattPeripheral`].

pub mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blipchat_core::{AdapterStatus, PeerAddress, RadioEventSender, ServiceIdentity};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::BleRadioError;

// ----------------------------------------------------------------------------
// Cross-platform Peripheral Trait
// ----------------------------------------------------------------------------

/// Platform GATT server and advertiser
#[async_trait::async_trait]
pub trait GattPeripheral: Send + Sync {
    /// Whether the adapter can take the peripheral role and is powered
    async fn probe(&self) -> Result<AdapterStatus, BleRadioError>;

    /// Publish the session service with its characteristic
    async fn open(&mut self, identity: &ServiceIdentity, events: RadioEventSender) -> Result<(), BleRadioError>;

    /// Withdraw the service and drop every subscriber
    async fn close(&mut self);

    async fn advertise(&mut self, service: Uuid, local_name: &str) -> Result<(), BleRadioError>;

    async fn stop_advertising(&mut self);

    /// Subscribers of the published characteristic
    fn subscribers(&self) -> &SubscriberTable;
}

// ----------------------------------------------------------------------------
// Subscriber Table
// ----------------------------------------------------------------------------

/// One notification handed to a subscriber's notifier loop
#[derive(Debug)]
pub struct NotifyRequest {
    pub value: Vec<u8>,
    pub reply: oneshot::Sender<Result<(), String>>,
}

#[derive(Debug)]
struct Subscription {
    id: u64,
    queue: mpsc::Sender<NotifyRequest>,
}

/// Remote centrals subscribed to our characteristic, plus the served value
///
/// Subscribers are keyed by device address, the same address the central
/// role reports, so a device linked both ways is one peer. Each subscriber is
/// driven by its own notifier loop; the table holds the sending half of that
/// loop's queue.
#[derive(Debug, Clone, Default)]
pub struct SubscriberTable {
    loops: Arc<Mutex<HashMap<PeerAddress, Subscription>>>,
    next_id: Arc<AtomicU64>,
    value: Arc<RwLock<Vec<u8>>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address`; returns the subscription id and the loop's queue
    ///
    /// A device that subscribes again replaces its earlier subscription.
    pub async fn register(&self, address: PeerAddress) -> (u64, mpsc::Receiver<NotifyRequest>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (queue, rx) = mpsc::channel(8);
        if self
            .loops
            .lock()
            .await
            .insert(address.clone(), Subscription { id, queue })
            .is_some()
        {
            debug!("Subscriber {} replaced its subscription", address);
        } else {
            debug!("Registered subscriber {}", address);
        }
        (id, rx)
    }

    /// Forget a subscriber; its notifier loop ends once the queue closes
    pub async fn remove(&self, address: &PeerAddress) -> bool {
        self.loops.lock().await.remove(address).is_some()
    }

    /// Remove subscription `id` of `address`, leaving a newer one in place
    pub async fn release(&self, address: &PeerAddress, id: u64) -> bool {
        let mut loops = self.loops.lock().await;
        match loops.get(address) {
            Some(subscription) if subscription.id == id => {
                loops.remove(address);
                true
            }
            _ => false,
        }
    }

    pub async fn clear(&self) {
        self.loops.lock().await.clear();
        self.value.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.loops.lock().await.len()
    }

    pub async fn contains(&self, address: &PeerAddress) -> bool {
        self.loops.lock().await.contains_key(address)
    }

    /// Value served to GATT reads
    pub async fn value(&self) -> Vec<u8> {
        self.value.read().await.clone()
    }

    /// Notify one subscriber and wait for the stack's verdict
    pub async fn notify(&self, address: &PeerAddress, value: &[u8]) -> Result<(), BleRadioError> {
        *self.value.write().await = value.to_vec();

        let queue = self
            .loops
            .lock()
            .await
            .get(address)
            .map(|subscription| subscription.queue.clone())
            .ok_or_else(|| BleRadioError::SubscriberGone(address.clone()))?;

        let (reply, verdict) = oneshot::channel();
        queue
            .send(NotifyRequest {
                value: value.to_vec(),
                reply,
            })
            .await
            .map_err(|_| BleRadioError::SubscriberGone(address.clone()))?;

        match verdict.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(BleRadioError::NotifyFailed {
                peer: address.clone(),
                reason,
            }),
            Err(_) => Err(BleRadioError::SubscriberGone(address.clone())),
        }
    }
}

// ----------------------------------------------------------------------------
// Platform Selection
// ----------------------------------------------------------------------------

/// Peripheral implementation for the current platform
pub enum PlatformPeripheral {
    #[cfg(target_os = "linux")]
    Linux(linux::LinuxPeripheral),
    #[allow(dead_code)]
    Fallback(fallback::FallbackPeripheral),
}

impl PlatformPeripheral {
    pub fn new() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::Linux(linux::LinuxPeripheral::new())
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::Fallback(fallback::FallbackPeripheral::new())
        }
    }
}

impl Default for PlatformPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GattPeripheral for PlatformPeripheral {
    async fn probe(&self) -> Result<AdapterStatus, BleRadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.probe().await,
            Self::Fallback(peripheral) => peripheral.probe().await,
        }
    }

    async fn open(&mut self, identity: &ServiceIdentity, events: RadioEventSender) -> Result<(), BleRadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.open(identity, events).await,
            Self::Fallback(peripheral) => peripheral.open(identity, events).await,
        }
    }

    async fn close(&mut self) {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.close().await,
            Self::Fallback(peripheral) => peripheral.close().await,
        }
    }

    async fn advertise(&mut self, service: Uuid, local_name: &str) -> Result<(), BleRadioError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.advertise(service, local_name).await,
            Self::Fallback(peripheral) => peripheral.advertise(service, local_name).await,
        }
    }

    async fn stop_advertising(&mut self) {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.stop_advertising().await,
            Self::Fallback(peripheral) => peripheral.stop_advertising().await,
        }
    }

    fn subscribers(&self) -> &SubscriberTable {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(peripheral) => peripheral.subscribers(),
            Self::Fallback(peripheral) => peripheral.subscribers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    /// Stand-in for a platform notifier loop
    fn spawn_loop(mut rx: mpsc::Receiver<NotifyRequest>, fail: bool) -> tokio::task::JoinHandle<Vec<Vec<u8>>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(request) = rx.recv().await {
                let verdict = if fail { Err("link lost".to_string()) } else { Ok(()) };
                seen.push(request.value);
                let _ = request.reply.send(verdict);
            }
            seen
        })
    }

    fn device(address: &str) -> PeerAddress {
        PeerAddress::new(address)
    }

    #[tokio::test]
    async fn test_notify_reaches_registered_loop() {
        let table = SubscriberTable::new();
        let address = device("AA:BB:CC:00:11:22");
        let (_, rx) = table.register(address.clone()).await;
        let handle = spawn_loop(rx, false);

        assert_ok!(table.notify(&address, b"hello").await);
        assert_eq!(table.value().await, b"hello".to_vec());

        assert!(table.remove(&address).await);
        assert_eq!(handle.await.unwrap(), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn test_notify_failures_are_reported() {
        let table = SubscriberTable::new();
        let address = device("AA:BB:CC:00:11:22");
        let (_, rx) = table.register(address.clone()).await;
        let _handle = spawn_loop(rx, true);

        let err = assert_err!(table.notify(&address, b"x").await);
        assert!(matches!(err, BleRadioError::NotifyFailed { .. }));

        let err = assert_err!(table.notify(&device("AA:BB:CC:00:11:99"), b"x").await);
        assert!(matches!(err, BleRadioError::SubscriberGone(_)));
    }

    #[tokio::test]
    async fn test_subscribers_are_keyed_by_device_address() {
        let table = SubscriberTable::new();
        let first = device("AA:BB:CC:00:11:22");
        let second = device("AA:BB:CC:00:11:33");
        let (_, _rx1) = table.register(first.clone()).await;
        let (_, _rx2) = table.register(second.clone()).await;
        assert_eq!(table.len().await, 2);

        // Subscribing again keeps a single entry per device
        let (_, _rx3) = table.register(first.clone()).await;
        assert_eq!(table.len().await, 2);

        table.clear().await;
        assert_eq!(table.len().await, 0);
        assert!(!table.contains(&first).await);
    }

    #[tokio::test]
    async fn test_release_leaves_newer_subscription() {
        let table = SubscriberTable::new();
        let address = device("AA:BB:CC:00:11:22");
        let (stale, _rx1) = table.register(address.clone()).await;
        let (current, rx2) = table.register(address.clone()).await;
        let handle = spawn_loop(rx2, false);

        assert!(!table.release(&address, stale).await);
        assert!(table.contains(&address).await);
        assert_ok!(table.notify(&address, b"still here").await);

        assert!(table.release(&address, current).await);
        assert!(!table.contains(&address).await);
        assert_eq!(handle.await.unwrap(), vec![b"still here".to_vec()]);
    }
}
