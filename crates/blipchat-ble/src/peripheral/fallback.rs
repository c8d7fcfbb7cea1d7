//! Fallback peripheral for platforms without a GATT server binding

use blipchat_core::{AdapterStatus, RadioEventSender, ServiceIdentity};
use tracing::warn;
use uuid::Uuid;

use super::{GattPeripheral, SubscriberTable};
use crate::error::BleRadioError;

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Reports the peripheral role as unavailable
///
/// Sessions refuse to start on such hosts, since a node that cannot be
/// discovered would only ever see half of the mesh.
#[derive(Default)]
pub struct FallbackPeripheral {
    subscribers: SubscriberTable,
}

impl FallbackPeripheral {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GattPeripheral for FallbackPeripheral {
    async fn probe(&self) -> Result<AdapterStatus, BleRadioError> {
        warn!("BLE peripheral role not supported on this platform");
        Ok(AdapterStatus {
            dual_role: false,
            powered: true,
        })
    }

    async fn open(&mut self, _identity: &ServiceIdentity, _events: RadioEventSender) -> Result<(), BleRadioError> {
        Err(BleRadioError::PeripheralUnsupported)
    }

    async fn close(&mut self) {}

    async fn advertise(&mut self, _service: Uuid, _local_name: &str) -> Result<(), BleRadioError> {
        Err(BleRadioError::PeripheralUnsupported)
    }

    async fn stop_advertising(&mut self) {}

    fn subscribers(&self) -> &SubscriberTable {
        &self.subscribers
    }
}
