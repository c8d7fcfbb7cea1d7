//! Advertiser: announces local presence with the session service UUID

use tracing::{info, warn};

use crate::errors::AdvertiseError;
use crate::radio::{codes, Radio};
use crate::types::ServiceIdentity;

/// Tracks the advertising half of the peripheral role
#[derive(Debug, Default)]
pub struct Advertiser {
    advertising: bool,
    local_name: Option<String>,
}

impl Advertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Start advertising; a platform rejection is returned, never retried
    pub async fn start(
        &mut self,
        radio: &dyn Radio,
        identity: &ServiceIdentity,
        local_name: &str,
    ) -> Result<(), AdvertiseError> {
        match radio.advertise(identity.service_uuid, local_name).await {
            Ok(()) => {
                self.advertising = true;
                self.local_name = Some(local_name.to_string());
                info!(
                    "Advertising service {} as '{}'",
                    identity.service_uuid, local_name
                );
                Ok(())
            }
            Err(e) => {
                self.advertising = false;
                warn!("Advertising rejected: {}", e);
                Err(AdvertiseError::PlatformRejected(
                    e.code().unwrap_or(codes::INTERNAL_ERROR),
                ))
            }
        }
    }

    pub async fn stop(&mut self, radio: &dyn Radio) {
        if self.advertising {
            radio.stop_advertising().await;
            self.advertising = false;
            info!("Advertising stopped");
        }
        self.local_name = None;
    }
}
