//! JSON message codec.
//!
//! Builders always emit the same required fields so consumers on the
//! broker side can rely on the shape; the parser turns an inbound command
//! payload into a name plus the remaining members.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Online/offline status.  Offline carries only `online`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage<'a> {
    pub online: bool,
    #[serde(flatten)]
    pub details: Option<StatusDetails<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDetails<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub mac: &'a str,
    pub ip: &'a str,
}

impl<'a> StatusMessage<'a> {
    pub fn offline() -> Self {
        Self {
            online: false,
            details: None,
        }
    }

    pub fn online(details: StatusDetails<'a>) -> Self {
        Self {
            online: true,
            details: Some(details),
        }
    }
}

/// Periodic heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub sequence: u64,
    /// Link signal strength in dBm; 0 when unknown.
    pub rssi: i8,
    /// Free heap in bytes.
    pub memory: u32,
    pub wifi_disconnects: u32,
    pub mqtt_disconnects: u32,
}

/// OTA progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressMessage<'a> {
    pub message: &'a str,
}

/// Serialise any outbound message.  Our message types contain no maps
/// with non-string keys, so serialisation cannot fail in practice.
pub fn encode<T: Serialize>(msg: &T) -> String {
    serde_json::to_string(msg).unwrap_or_else(|e| {
        log::error!("encode failed: {}", e);
        String::from("{}")
    })
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    pub name: String,
    /// Every member of the payload except `name`.
    pub fields: Map<String, Value>,
}

/// Decode a command payload: a JSON object with a string `name`.
pub fn parse_command(payload: &[u8]) -> Result<CommandMessage, ParseError> {
    let value: Value = serde_json::from_slice(payload).map_err(|_| ParseError::Malformed)?;
    let Value::Object(mut fields) = value else {
        return Err(ParseError::NotAnObject);
    };
    match fields.remove("name") {
        Some(Value::String(name)) => Ok(CommandMessage { name, fields }),
        _ => Err(ParseError::MissingName),
    }
}
