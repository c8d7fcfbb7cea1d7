//! Hardware radio combining the btleplug central and the platform peripheral

use async_trait::async_trait;
use blipchat_core::{AdapterStatus, PeerAddress, Radio, RadioEventSender, RadioResult, ServiceIdentity};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::central::CentralLink;
use crate::config::BleRadioConfig;
use crate::error::BleRadioError;
use crate::peripheral::{GattPeripheral, PlatformPeripheral, SubscriberTable};

// ----------------------------------------------------------------------------
// BLE Radio
// ----------------------------------------------------------------------------

/// [`Radio`] backed by the host's Bluetooth adapter
///
/// Outbound links go through btleplug. The GATT server, advertising and
/// notifications go through the platform peripheral, since btleplug has no
/// peripheral role.
pub struct BleRadio {
    central: CentralLink,
    peripheral: Mutex<PlatformPeripheral>,
    subscribers: SubscriberTable,
}

impl BleRadio {
    pub async fn new(config: BleRadioConfig) -> Result<Self, BleRadioError> {
        let central = CentralLink::new(config).await?;
        let peripheral = PlatformPeripheral::new();
        let subscribers = peripheral.subscribers().clone();
        Ok(Self {
            central,
            peripheral: Mutex::new(peripheral),
            subscribers,
        })
    }
}

#[async_trait]
impl Radio for BleRadio {
    async fn probe(&self) -> RadioResult<AdapterStatus> {
        Ok(self.peripheral.lock().await.probe().await?)
    }

    async fn open(&self, identity: &ServiceIdentity, events: RadioEventSender) -> RadioResult<()> {
        self.peripheral.lock().await.open(identity, events.clone()).await?;
        if let Err(e) = self.central.open(events).await {
            self.peripheral.lock().await.close().await;
            return Err(e.into());
        }
        info!("BLE radio open for {}", identity);
        Ok(())
    }

    async fn close(&self) {
        self.central.close().await;
        self.peripheral.lock().await.close().await;
        info!("BLE radio closed");
    }

    async fn advertise(&self, service_uuid: Uuid, local_name: &str) -> RadioResult<()> {
        Ok(self.peripheral.lock().await.advertise(service_uuid, local_name).await?)
    }

    async fn stop_advertising(&self) {
        self.peripheral.lock().await.stop_advertising().await;
    }

    async fn scan(&self, service_uuid: Uuid) -> RadioResult<()> {
        Ok(self.central.scan(service_uuid).await?)
    }

    async fn stop_scan(&self) {
        self.central.stop_scan().await;
    }

    async fn connect(&self, address: &PeerAddress) -> RadioResult<()> {
        Ok(self.central.connect(address).await?)
    }

    async fn disconnect(&self, address: &PeerAddress) {
        // An inbound subscriber has no link we own; ending its notifier loop is the closest
        if self.subscribers.remove(address).await {
            debug!("Released subscriber {}", address);
        }
        self.central.disconnect(address).await;
    }

    async fn discover_services(&self, address: &PeerAddress) -> RadioResult<()> {
        Ok(self.central.discover_services(address).await?)
    }

    async fn discover_characteristics(&self, address: &PeerAddress, service: Uuid) -> RadioResult<()> {
        Ok(self.central.discover_characteristics(address, service).await?)
    }

    async fn subscribe(&self, address: &PeerAddress, service: Uuid, characteristic: Uuid) -> RadioResult<()> {
        Ok(self.central.subscribe(address, service, characteristic).await?)
    }

    async fn write_characteristic(
        &self,
        address: &PeerAddress,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> RadioResult<()> {
        Ok(self.central.write(address, service, characteristic, value).await?)
    }

    async fn notify(&self, address: &PeerAddress, _characteristic: Uuid, value: &[u8]) -> RadioResult<()> {
        Ok(self.subscribers.notify(address, value).await?)
    }
}
