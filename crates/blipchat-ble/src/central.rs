//! Central role: scanning, outbound links and remote GATT access via btleplug

use std::collections::HashMap;
use std::sync::Arc;

use blipchat_core::{PeerAddress, RadioEvent, RadioEventSender};
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BleRadioConfig;
use crate::error::BleRadioError;
use crate::protocol::peer_address;

type PeripheralMap = Arc<RwLock<HashMap<PeerAddress, Peripheral>>>;

// ----------------------------------------------------------------------------
// Central Link
// ----------------------------------------------------------------------------

/// Central half of the radio
///
/// Every request that completes asynchronously runs on its own task and
/// reports through the session's event sender, so the caller never waits on
/// the controller.
pub struct CentralLink {
    config: BleRadioConfig,
    adapter: Adapter,
    peripherals: PeripheralMap,
    events: RwLock<Option<RadioEventSender>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CentralLink {
    pub async fn new(config: BleRadioConfig) -> Result<Self, BleRadioError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleRadioError::AdapterNotAvailable)?;
        info!("Central role using adapter {}", config.adapter_index);

        Ok(Self {
            config,
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            events: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start pumping adapter events to `events`
    pub async fn open(&self, events: RadioEventSender) -> Result<(), BleRadioError> {
        self.close().await;

        let mut stream = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let pump_events = events.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if !Self::on_central_event(&adapter, &peripherals, &pump_events, event).await {
                    break;
                }
            }
            debug!("Central event pump ended");
        });

        self.tasks.lock().await.push(pump);
        *self.events.write().await = Some(events);
        Ok(())
    }

    /// Stop every pump and drop all outbound links
    pub async fn close(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.events.write().await.take();

        let peripherals: Vec<_> = self.peripherals.write().await.drain().collect();
        for (address, peripheral) in peripherals {
            if peripheral.is_connected().await.unwrap_or(false) {
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Failed to disconnect {}: {}", address, e);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    pub async fn scan(&self, service: Uuid) -> Result<(), BleRadioError> {
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;
        info!("Scanning for service {}", service);
        Ok(())
    }

    pub async fn stop_scan(&self) {
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }

    /// Returns false once the session side of the sender is gone
    async fn on_central_event(
        adapter: &Adapter,
        peripherals: &PeripheralMap,
        events: &RadioEventSender,
        event: CentralEvent,
    ) -> bool {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::ServicesAdvertisement { id, .. } => {
                let Some(peripheral) = Self::lookup(adapter, &id).await else {
                    return true;
                };
                let address = peer_address(peripheral.address());
                let (local_name, services) = match peripheral.properties().await {
                    Ok(Some(properties)) => (properties.local_name, properties.services),
                    _ => (None, Vec::new()),
                };
                peripherals.write().await.insert(address.clone(), peripheral);
                events.emit(RadioEvent::AdvertisementSeen {
                    address,
                    local_name,
                    services,
                })
            }
            CentralEvent::DeviceDisconnected(id) => {
                let Some(peripheral) = Self::lookup(adapter, &id).await else {
                    return true;
                };
                events.emit(RadioEvent::LinkDisconnected {
                    address: peer_address(peripheral.address()),
                })
            }
            _ => true,
        }
    }

    async fn lookup(adapter: &Adapter, id: &PeripheralId) -> Option<Peripheral> {
        match adapter.peripheral(id).await {
            Ok(peripheral) => Some(peripheral),
            Err(e) => {
                debug!("Peripheral {:?} vanished: {}", id, e);
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Outbound Links
    // ------------------------------------------------------------------------

    async fn peripheral(&self, address: &PeerAddress) -> Result<Peripheral, BleRadioError> {
        self.peripherals
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| BleRadioError::PeerNotFound(address.clone()))
    }

    async fn sender(&self) -> Result<RadioEventSender, BleRadioError> {
        self.events.read().await.clone().ok_or(BleRadioError::NotOpen)
    }

    async fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(tokio::spawn(task));
    }

    pub async fn connect(&self, address: &PeerAddress) -> Result<(), BleRadioError> {
        let peripheral = self.peripheral(address).await?;
        let events = self.sender().await?;
        let limit = self.config.connection_timeout;
        let address = address.clone();

        self.spawn(async move {
            let event = match timeout(limit, peripheral.connect()).await {
                Ok(Ok(())) => RadioEvent::LinkConnected { address },
                Ok(Err(e)) => RadioEvent::ConnectFailed {
                    address,
                    reason: e.to_string(),
                },
                Err(_) => RadioEvent::ConnectFailed {
                    address,
                    reason: format!("timed out after {:?}", limit),
                },
            };
            events.emit(event);
        })
        .await;
        Ok(())
    }

    pub async fn disconnect(&self, address: &PeerAddress) {
        let Ok(peripheral) = self.peripheral(address).await else {
            return;
        };
        if let Err(e) = peripheral.disconnect().await {
            warn!("Failed to disconnect {}: {}", address, e);
        }
        // Duplicates of the adapter's own DeviceDisconnected are ignored upstream
        if let Ok(events) = self.sender().await {
            events.emit(RadioEvent::LinkDisconnected {
                address: address.clone(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Remote GATT
    // ------------------------------------------------------------------------

    pub async fn discover_services(&self, address: &PeerAddress) -> Result<(), BleRadioError> {
        let peripheral = self.peripheral(address).await?;
        let events = self.sender().await?;
        let address = address.clone();

        self.spawn(async move {
            let event = match peripheral.discover_services().await {
                Ok(()) => RadioEvent::ServicesDiscovered {
                    address,
                    services: peripheral.services().iter().map(|s| s.uuid).collect(),
                },
                Err(e) => RadioEvent::DiscoveryFailed {
                    address,
                    reason: e.to_string(),
                },
            };
            events.emit(event);
        })
        .await;
        Ok(())
    }

    /// btleplug resolves characteristics together with services, so this
    /// reports from the cached table
    pub async fn discover_characteristics(&self, address: &PeerAddress, service: Uuid) -> Result<(), BleRadioError> {
        let peripheral = self.peripheral(address).await?;
        let events = self.sender().await?;

        let event = match peripheral.services().into_iter().find(|s| s.uuid == service) {
            Some(found) => RadioEvent::CharacteristicsDiscovered {
                address: address.clone(),
                service,
                characteristics: found.characteristics.iter().map(|c| c.uuid).collect(),
            },
            None => RadioEvent::DiscoveryFailed {
                address: address.clone(),
                reason: format!("service {} not resolved", service),
            },
        };
        events.emit(event);
        Ok(())
    }

    fn find_characteristic(peripheral: &Peripheral, service: Uuid, uuid: Uuid) -> Result<Characteristic, BleRadioError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == uuid)
            .ok_or(BleRadioError::CharacteristicNotFound(uuid))
    }

    pub async fn subscribe(&self, address: &PeerAddress, service: Uuid, characteristic: Uuid) -> Result<(), BleRadioError> {
        let peripheral = self.peripheral(address).await?;
        let events = self.sender().await?;
        let target = Self::find_characteristic(&peripheral, service, characteristic)?;
        let address = address.clone();

        self.spawn(async move {
            let subscribed = match peripheral.subscribe(&target).await {
                Ok(()) => peripheral.notifications().await,
                Err(e) => Err(e),
            };

            let mut notifications = match subscribed {
                Ok(stream) => stream,
                Err(e) => {
                    events.emit(RadioEvent::SubscribeFailed {
                        address,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            events.emit(RadioEvent::Subscribed {
                address: address.clone(),
                characteristic,
            });
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                let delivered = events.emit(RadioEvent::NotificationReceived {
                    address: address.clone(),
                    characteristic,
                    value: notification.value,
                });
                if !delivered {
                    break;
                }
            }
            debug!("Notification stream from {} ended", address);
        })
        .await;
        Ok(())
    }

    pub async fn write(
        &self,
        address: &PeerAddress,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), BleRadioError> {
        let peripheral = self.peripheral(address).await?;
        let target = Self::find_characteristic(&peripheral, service, characteristic)?;
        let write_type = if self.config.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&target, value, write_type).await?;
        debug!("Wrote {} bytes to {}", value.len(), address);
        Ok(())
    }
}
