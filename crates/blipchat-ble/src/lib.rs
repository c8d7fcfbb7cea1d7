//! Bluetooth Low Energy radio binding for BlipChat
//!
//! This crate implements the [`Radio`](blipchat_core::Radio) trait from
//! `blipchat-core` on top of the host's Bluetooth adapter, so a
//! [`SessionController`](blipchat_core::SessionController) can run against
//! real hardware.
//!
//! ## Architecture
//!
//! - [`config`] - Radio configuration
//! - [`error`] - Error types and their mapping to session radio errors
//! - [`protocol`] - Default UUIDs, name and address helpers
//! - [`central`] - Scanning and outbound links via `btleplug`
//! - [`peripheral`] - GATT server and advertising per platform
//! - [`radio`] - The combined [`BleRadio`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blipchat_ble::{BleRadio, BleRadioConfig, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
//! use blipchat_core::{SessionConfig, SessionController, ServiceIdentity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let radio = BleRadio::new(BleRadioConfig::default()).await?;
//! let (session, _events) = SessionController::spawn(Arc::new(radio), SessionConfig::default())?;
//!
//! let identity = ServiceIdentity::new(DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID);
//! session.start(identity, "Kitchen").await?;
//! session.send(br#"{"text":"hi"}"#.to_vec()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! - **Linux**: Both roles, with the peripheral role served by BlueZ through `bluer`
//! - **Other platforms**: Central role only, so sessions report the adapter as unsupported

pub mod central;
pub mod config;
pub mod error;
pub mod peripheral;
pub mod protocol;
pub mod radio;

// Public API exports
pub use config::BleRadioConfig;
pub use error::BleRadioError;
pub use peripheral::{GattPeripheral, PlatformPeripheral, SubscriberTable};
pub use protocol::{DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
pub use radio::BleRadio;
