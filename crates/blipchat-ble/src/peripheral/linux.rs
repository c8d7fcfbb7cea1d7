//! Linux peripheral role using bluer (BlueZ)

use blipchat_core::{AdapterStatus, PeerAddress, RadioEvent, RadioEventSender, ServiceIdentity};
use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    characteristic_control, Application, ApplicationHandle, Characteristic, CharacteristicControl,
    CharacteristicControlEvent, CharacteristicNotify, CharacteristicNotifyMethod, CharacteristicRead,
    CharacteristicReadRequest, CharacteristicWrite, CharacteristicWriteMethod,
    CharacteristicWriteRequest, Service,
};
use bluer::gatt::CharacteristicWriter;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{GattPeripheral, SubscriberTable};
use crate::error::BleRadioError;
use crate::protocol::advertised_name;

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

pub struct LinuxPeripheral {
    session: Option<bluer::Session>,
    adapter: Option<bluer::Adapter>,
    application: Option<ApplicationHandle>,
    advertisement: Option<AdvertisementHandle>,
    /// Accepts notification sessions opened by remote centrals
    control_task: Option<JoinHandle<()>>,
    subscribers: SubscriberTable,
}

impl LinuxPeripheral {
    pub fn new() -> Self {
        Self {
            session: None,
            adapter: None,
            application: None,
            advertisement: None,
            control_task: None,
            subscribers: SubscriberTable::new(),
        }
    }

    async fn initialize(&mut self) -> Result<&bluer::Adapter, BleRadioError> {
        if self.adapter.is_none() {
            let session = bluer::Session::new().await?;
            let adapter = session.default_adapter().await?;
            info!("Using Bluetooth adapter {} for the peripheral role", adapter.name());
            self.session = Some(session);
            self.adapter = Some(adapter);
        }
        self.adapter.as_ref().ok_or(BleRadioError::AdapterNotAvailable)
    }

    fn characteristic(
        &self,
        identity: &ServiceIdentity,
        events: &RadioEventSender,
    ) -> (Characteristic, CharacteristicControl) {
        let uuid = identity.characteristic_uuid;

        let read_table = self.subscribers.clone();
        let read = CharacteristicRead {
            read: true,
            fun: Box::new(move |_req: CharacteristicReadRequest| {
                let table = read_table.clone();
                Box::pin(async move { Ok(table.value().await) })
            }),
            ..Default::default()
        };

        let write_events = events.clone();
        let write = CharacteristicWrite {
            write: true,
            write_without_response: true,
            method: CharacteristicWriteMethod::Fun(Box::new(
                move |value: Vec<u8>, req: CharacteristicWriteRequest| {
                    let events = write_events.clone();
                    Box::pin(async move {
                        debug!("Write of {} bytes from {}", value.len(), req.device_address);
                        events.emit(RadioEvent::WriteReceived {
                            address: PeerAddress::new(req.device_address.to_string()),
                            characteristic: uuid,
                            value,
                        });
                        Ok(())
                    })
                },
            )),
            ..Default::default()
        };

        // Notification sessions arrive on the control stream with the device address
        let (control, control_handle) = characteristic_control();
        let notify = CharacteristicNotify {
            notify: true,
            method: CharacteristicNotifyMethod::Io,
            ..Default::default()
        };

        let characteristic = Characteristic {
            uuid,
            read: Some(read),
            write: Some(write),
            notify: Some(notify),
            control_handle,
            ..Default::default()
        };
        (characteristic, control)
    }
}

/// Accept notification sessions until the application is withdrawn
async fn accept_subscribers(
    mut control: CharacteristicControl,
    table: SubscriberTable,
    events: RadioEventSender,
    characteristic: Uuid,
) {
    while let Some(event) = control.next().await {
        match event {
            CharacteristicControlEvent::Notify(writer) => {
                tokio::spawn(run_notifier(writer, table.clone(), events.clone(), characteristic));
            }
            CharacteristicControlEvent::Write(request) => {
                debug!("Ignoring IO write request from {}", request.device_address());
            }
        }
    }
    debug!("Characteristic control stream ended");
}

/// Drive one subscriber: forward queued notifications until it leaves
async fn run_notifier(
    mut writer: CharacteristicWriter,
    table: SubscriberTable,
    events: RadioEventSender,
    characteristic: Uuid,
) {
    let address = PeerAddress::new(writer.device_address().to_string());
    let (id, mut queue) = table.register(address.clone()).await;
    events.emit(RadioEvent::CentralSubscribed {
        address: address.clone(),
        characteristic,
    });

    loop {
        let request = tokio::select! {
            _ = writer.closed() => None,
            request = queue.recv() => request,
        };
        let Some(request) = request else {
            break;
        };

        let verdict = writer.write_all(&request.value).await.map_err(|e| e.to_string());
        let failed = verdict.is_err();
        let _ = request.reply.send(verdict);
        if failed {
            break;
        }
    }

    table.release(&address, id).await;
    debug!("Notifier for {} ended", address);
    // A newer session from the same device keeps the peer
    if !table.contains(&address).await {
        events.emit(RadioEvent::CentralUnsubscribed { address });
    }
}

impl Default for LinuxPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GattPeripheral for LinuxPeripheral {
    async fn probe(&self) -> Result<AdapterStatus, BleRadioError> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        let powered = adapter.is_powered().await?;
        let instances = adapter.supported_advertising_instances().await.unwrap_or(0);
        debug!(
            "Adapter {}: powered={}, advertising instances={}",
            adapter.name(),
            powered,
            instances
        );
        Ok(AdapterStatus {
            dual_role: instances > 0,
            powered,
        })
    }

    async fn open(&mut self, identity: &ServiceIdentity, events: RadioEventSender) -> Result<(), BleRadioError> {
        self.close().await;
        let (characteristic, control) = self.characteristic(identity, &events);
        let adapter = self.initialize().await?;

        let app = Application {
            services: vec![Service {
                uuid: identity.service_uuid,
                primary: true,
                characteristics: vec![characteristic],
                ..Default::default()
            }],
            ..Default::default()
        };
        let handle = adapter.serve_gatt_application(app).await?;
        self.application = Some(handle);
        self.control_task = Some(tokio::spawn(accept_subscribers(
            control,
            self.subscribers.clone(),
            events,
            identity.characteristic_uuid,
        )));

        info!("GATT service {} registered", identity);
        Ok(())
    }

    async fn close(&mut self) {
        self.advertisement.take();
        if let Some(task) = self.control_task.take() {
            task.abort();
        }
        if self.application.take().is_some() {
            info!("GATT service unregistered");
        }
        self.subscribers.clear().await;
    }

    async fn advertise(&mut self, service: Uuid, local_name: &str) -> Result<(), BleRadioError> {
        if self.application.is_none() {
            return Err(BleRadioError::NotOpen);
        }
        let adapter = self.initialize().await?;

        let name = advertised_name(local_name);
        if name.len() < local_name.len() {
            warn!("Local name '{}' shortened to '{}'", local_name, name);
        }
        let advertisement = Advertisement {
            service_uuids: vec![service].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(name.to_string()),
            ..Default::default()
        };

        let handle = adapter.advertise(advertisement).await?;
        self.advertisement = Some(handle);
        info!("Advertising {} as '{}'", service, name);
        Ok(())
    }

    async fn stop_advertising(&mut self) {
        // Dropping the handle unregisters the advertisement
        if self.advertisement.take().is_some() {
            info!("Stopped advertising");
        }
    }

    fn subscribers(&self) -> &SubscriberTable {
        &self.subscribers
    }
}
