//! Session wiring for the CLI

use std::sync::Arc;

use tracing::info;

use blipchat_ble::BleRadio;
use blipchat_core::{Radio, SessionController, SessionEvents};

use crate::config::AppConfig;
use crate::error::Result;

/// Configured session plus the radio it runs on
pub struct BlipApp {
    config: AppConfig,
    session: SessionController,
    events: SessionEvents,
}

impl BlipApp {
    /// Open the host's Bluetooth adapter and spawn a session on it
    pub async fn new(config: AppConfig) -> Result<Self> {
        let radio = BleRadio::new(config.ble.clone()).await?;
        Self::with_radio(config, Arc::new(radio))
    }

    pub fn with_radio(config: AppConfig, radio: Arc<dyn Radio>) -> Result<Self> {
        let (session, events) = SessionController::spawn(radio, config.session.clone())?;
        Ok(Self {
            config,
            session,
            events,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Start advertising and scanning with the configured identity
    pub async fn start(&self) -> Result<()> {
        let identity = self.config.service_identity()?;
        self.session.start(identity, self.config.device_name()).await?;
        info!("Session started for {}", identity);
        Ok(())
    }

    pub async fn stop(&self) {
        self.session.stop().await;
    }

    pub fn into_parts(self) -> (SessionController, SessionEvents) {
        (self.session, self.events)
    }
}
