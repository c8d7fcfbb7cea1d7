//! Host application channel
//!
//! JSON rendition of the `blipchat/ble_advertising` method channel used by
//! the mobile front end. Calls are validated before anything reaches the
//! session, and session events are forwarded as `onAdvertisingStateChanged`
//! and `onMessageReceived`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{SendError, StartError};
use crate::session::{SessionController, SessionEvent};
use crate::types::ServiceIdentity;

/// Name of the method channel
pub const CHANNEL_NAME: &str = "blipchat/ble_advertising";

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

/// A method invocation from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// A validated method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    StartAdvertising {
        identity: ServiceIdentity,
        device_name: Option<String>,
    },
    StopAdvertising,
    SendMessage { payload: Vec<u8> },
}

impl HostCommand {
    pub fn parse(call: &MethodCall) -> Result<Self, HostError> {
        match call.method.as_str() {
            "startAdvertising" => Self::parse_start(&call.arguments),
            "stopAdvertising" => Ok(Self::StopAdvertising),
            "sendMessage" => match &call.arguments {
                Value::Object(_) => {
                    let payload = serde_json::to_vec(&call.arguments).map_err(|e| {
                        HostError::new(HostErrorCode::InvalidMessage, e.to_string())
                    })?;
                    Ok(Self::SendMessage { payload })
                }
                _ => Err(HostError::new(
                    HostErrorCode::InvalidMessage,
                    "Invalid message data",
                )),
            },
            other => Err(HostError::new(
                HostErrorCode::NotImplemented,
                format!("Unknown method '{}'", other),
            )),
        }
    }

    fn parse_start(arguments: &Value) -> Result<Self, HostError> {
        let field = |name: &str| arguments.get(name).and_then(Value::as_str);
        let (service, characteristic) = match (field("serviceUuid"), field("characteristicUuid")) {
            (Some(service), Some(characteristic)) => (service, characteristic),
            _ => {
                return Err(HostError::new(
                    HostErrorCode::InvalidArguments,
                    "Missing required arguments",
                ))
            }
        };
        let identity = ServiceIdentity::parse(service, characteristic)
            .map_err(|e| HostError::new(HostErrorCode::InvalidUuid, format!("Invalid UUIDs: {}", e)))?;

        Ok(Self::StartAdvertising {
            identity,
            device_name: field("deviceName").map(str::to_string),
        })
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Error codes reported back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostErrorCode {
    InvalidArguments,
    InvalidUuid,
    InvalidMessage,
    NotImplemented,
    BleNotSupported,
    BluetoothDisabled,
    AlreadyActive,
    NotActive,
    SendError,
    AdvertisingError,
}

impl HostErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArguments => "INVALID_ARGUMENTS",
            Self::InvalidUuid => "INVALID_UUID",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::BleNotSupported => "BLE_NOT_SUPPORTED",
            Self::BluetoothDisabled => "BLUETOOTH_DISABLED",
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::NotActive => "NOT_ACTIVE",
            Self::SendError => "SEND_ERROR",
            Self::AdvertisingError => "ADVERTISING_ERROR",
        }
    }
}

impl std::fmt::Display for HostErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error result of a method call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct HostError {
    pub code: HostErrorCode,
    pub message: String,
}

impl HostError {
    pub fn new(code: HostErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<StartError> for HostError {
    fn from(error: StartError) -> Self {
        let code = match error {
            StartError::UnsupportedHardware => HostErrorCode::BleNotSupported,
            StartError::RadioDisabled => HostErrorCode::BluetoothDisabled,
            StartError::AlreadyActive(_) => HostErrorCode::AlreadyActive,
            StartError::GattServer(_) | StartError::SessionClosed => HostErrorCode::AdvertisingError,
        };
        Self::new(code, error.to_string())
    }
}

impl From<SendError> for HostError {
    fn from(error: SendError) -> Self {
        let code = match error {
            SendError::NotActive => HostErrorCode::NotActive,
            SendError::PayloadTooLarge { .. } | SendError::SessionClosed => HostErrorCode::SendError,
        };
        Self::new(code, error.to_string())
    }
}

/// Reply to one method call, as written back to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodResponse {
    Success(Value),
    Error(HostError),
}

impl From<Result<Value, HostError>> for MethodResponse {
    fn from(result: Result<Value, HostError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Error(error),
        }
    }
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Event pushed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments")]
pub enum HostEvent {
    #[serde(rename = "onAdvertisingStateChanged")]
    AdvertisingStateChanged(bool),
    #[serde(rename = "onMessageReceived")]
    MessageReceived(String),
}

impl HostEvent {
    /// Translate a session event; events the host does not consume map to `None`
    pub fn from_session(event: SessionEvent) -> Option<Self> {
        match event {
            SessionEvent::AdvertisingStateChanged(advertising) => {
                Some(Self::AdvertisingStateChanged(advertising))
            }
            SessionEvent::MessageReceived(payload) => match String::from_utf8(payload) {
                Ok(text) => Some(Self::MessageReceived(text)),
                Err(e) => {
                    warn!("Dropping received message that is not UTF-8: {}", e);
                    None
                }
            },
            SessionEvent::PeerSetChanged(_) | SessionEvent::ScanningStateChanged(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

/// Dispatches host method calls to a session
#[derive(Debug, Clone)]
pub struct HostChannel {
    session: SessionController,
}

impl HostChannel {
    pub fn new(session: SessionController) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub async fn handle(&self, call: &MethodCall) -> Result<Value, HostError> {
        let command = HostCommand::parse(call)?;
        debug!("Host call {}", call.method);

        match command {
            HostCommand::StartAdvertising {
                identity,
                device_name,
            } => {
                let name = device_name.unwrap_or_default();
                self.session.start(identity, &name).await?;
            }
            HostCommand::StopAdvertising => self.session.stop().await,
            HostCommand::SendMessage { payload } => {
                self.session.send(payload).await?;
            }
        }
        Ok(Value::Bool(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SERVICE: &str = "0000b1c0-0000-1000-8000-00805f9b34fb";
    const CHARACTERISTIC: &str = "0000b1c1-0000-1000-8000-00805f9b34fb";

    fn parse(method: &str, arguments: Value) -> Result<HostCommand, HostError> {
        HostCommand::parse(&MethodCall::new(method, arguments))
    }

    #[test]
    fn test_start_requires_both_uuids() {
        let err = parse("startAdvertising", json!({ "serviceUuid": SERVICE })).unwrap_err();
        assert_eq!(err.code, HostErrorCode::InvalidArguments);

        let err = parse("startAdvertising", Value::Null).unwrap_err();
        assert_eq!(err.code, HostErrorCode::InvalidArguments);
    }

    #[test]
    fn test_start_rejects_malformed_uuid() {
        let err = parse(
            "startAdvertising",
            json!({ "serviceUuid": "not-a-uuid", "characteristicUuid": CHARACTERISTIC }),
        )
        .unwrap_err();
        assert_eq!(err.code, HostErrorCode::InvalidUuid);
    }

    #[test]
    fn test_start_parses_identity_and_name() {
        let command = parse(
            "startAdvertising",
            json!({
                "serviceUuid": SERVICE,
                "characteristicUuid": CHARACTERISTIC,
                "deviceName": "Kitchen",
            }),
        )
        .unwrap();
        let expected = ServiceIdentity::parse(SERVICE, CHARACTERISTIC).unwrap();
        assert_eq!(
            command,
            HostCommand::StartAdvertising {
                identity: expected,
                device_name: Some("Kitchen".to_string()),
            }
        );
    }

    #[test]
    fn test_send_message_must_be_object() {
        let err = parse("sendMessage", json!("hello")).unwrap_err();
        assert_eq!(err.code, HostErrorCode::InvalidMessage);

        let command = parse("sendMessage", json!({ "text": "hi" })).unwrap();
        assert_eq!(
            command,
            HostCommand::SendMessage {
                payload: br#"{"text":"hi"}"#.to_vec()
            }
        );
    }

    #[test]
    fn test_unknown_method() {
        let err = parse("startScanning", Value::Null).unwrap_err();
        assert_eq!(err.code, HostErrorCode::NotImplemented);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            HostError::from(StartError::RadioDisabled).code,
            HostErrorCode::BluetoothDisabled
        );
        assert_eq!(
            HostError::from(StartError::UnsupportedHardware).code,
            HostErrorCode::BleNotSupported
        );
        assert_eq!(HostError::from(SendError::NotActive).code, HostErrorCode::NotActive);
        assert_eq!(
            serde_json::to_value(HostErrorCode::BluetoothDisabled).unwrap(),
            json!("BLUETOOTH_DISABLED")
        );
    }

    #[test]
    fn test_event_translation() {
        let event = HostEvent::from_session(SessionEvent::MessageReceived(b"{\"a\":1}".to_vec()));
        assert_eq!(event, Some(HostEvent::MessageReceived("{\"a\":1}".to_string())));
        assert_eq!(
            serde_json::to_value(event.unwrap()).unwrap(),
            json!({ "method": "onMessageReceived", "arguments": "{\"a\":1}" })
        );

        assert_eq!(HostEvent::from_session(SessionEvent::MessageReceived(vec![0xff, 0xfe])), None);
        assert_eq!(HostEvent::from_session(SessionEvent::PeerSetChanged(Vec::new())), None);
    }

    #[test]
    fn test_response_shape() {
        let ok: MethodResponse = Ok(Value::Bool(true)).into();
        assert_eq!(serde_json::to_value(ok).unwrap(), json!({ "success": true }));

        let err: MethodResponse = Err(HostError::new(HostErrorCode::NotActive, "inactive")).into();
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({ "error": { "code": "NOT_ACTIVE", "message": "inactive" } })
        );
    }
}
