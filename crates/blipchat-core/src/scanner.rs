//! Scanner: turns advertisements for the session service into discoveries
//!
//! The scanner does not deduplicate. Every matching advertisement becomes a
//! discovery and the Connection Manager decides whether it is new.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ScanError;
use crate::radio::{codes, Radio};
use crate::types::PeerAddress;

/// Tracks the scanning half of the central role
#[derive(Debug, Default)]
pub struct Scanner {
    service_uuid: Option<Uuid>,
    scanning: bool,
    discoveries: u64,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Matching advertisements seen since the last start
    pub fn discoveries(&self) -> u64 {
        self.discoveries
    }

    /// Start a continuous scan filtered to `service_uuid`
    pub async fn start(&mut self, radio: &dyn Radio, service_uuid: Uuid) -> Result<(), ScanError> {
        self.service_uuid = Some(service_uuid);
        self.discoveries = 0;
        match radio.scan(service_uuid).await {
            Ok(()) => {
                self.scanning = true;
                info!("Scanning for service {}", service_uuid);
                Ok(())
            }
            Err(e) => {
                self.scanning = false;
                warn!("Scan rejected: {}", e);
                Err(ScanError::PlatformRejected(
                    e.code().unwrap_or(codes::INTERNAL_ERROR),
                ))
            }
        }
    }

    pub async fn stop(&mut self, radio: &dyn Radio) {
        if self.scanning {
            radio.stop_scan().await;
            self.scanning = false;
            info!("Scanning stopped");
        }
        self.service_uuid = None;
    }

    /// Filter one advertisement; returns the address to hand to the Connection Manager
    ///
    /// An empty service list is accepted since the platform scan filter already
    /// matched it. Non-conformant peers are caught during GATT discovery.
    pub fn on_advertisement(&mut self, address: &PeerAddress, services: &[Uuid]) -> Option<PeerAddress> {
        let service_uuid = self.service_uuid?;
        if !self.scanning {
            return None;
        }
        if !services.is_empty() && !services.contains(&service_uuid) {
            debug!("Advertisement from {} lacks service {}", address, service_uuid);
            return None;
        }
        self.discoveries += 1;
        Some(address.clone())
    }

    /// The platform aborted the scan
    pub fn on_scan_failed(&mut self, code: i32) -> ScanError {
        self.scanning = false;
        debug!("Scan failed with code {}", code);
        ScanError::PlatformRejected(code)
    }
}
