//! SHIP wire message bodies.
//!
//! Every message is a JSON object with a single discriminating top-level
//! key, carried behind a one-byte frame tag (see [`crate::codec`]). Shapes
//! are fixed by the SHIP specification.

use serde::{Deserialize, Serialize};

/// Protocol id carried in data-frame headers.
pub const SHIP_PROTOCOL_ID: &str = "ee1.0";

/// The only message format this stack speaks.
pub const FORMAT_JSON_UTF8: &str = "JSON-UTF8";

/// One-byte frame tag preceding every SHIP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Init = 0x00,
    Control = 0x01,
    Data = 0x02,
    End = 0x03,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(MessageType::Init),
            0x01 => Some(MessageType::Control),
            0x02 => Some(MessageType::Data),
            0x03 => Some(MessageType::End),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Init => "INIT",
            MessageType::Control => "CONTROL",
            MessageType::Data => "DATA",
            MessageType::End => "END",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Hello phase

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionHelloPhase {
    Pending,
    Ready,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHelloType {
    pub phase: ConnectionHelloPhase,
    /// Milliseconds the sender will keep waiting before it aborts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prolongation_request: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHello {
    pub connection_hello: ConnectionHelloType,
}

impl ConnectionHello {
    pub fn ready() -> Self {
        Self {
            connection_hello: ConnectionHelloType {
                phase: ConnectionHelloPhase::Ready,
                waiting: None,
                prolongation_request: None,
            },
        }
    }

    pub fn pending(waiting_ms: u64, prolongation_request: bool) -> Self {
        Self {
            connection_hello: ConnectionHelloType {
                phase: ConnectionHelloPhase::Pending,
                waiting: Some(waiting_ms),
                prolongation_request: prolongation_request.then_some(true),
            },
        }
    }

    pub fn aborted() -> Self {
        Self {
            connection_hello: ConnectionHelloType {
                phase: ConnectionHelloPhase::Aborted,
                waiting: None,
                prolongation_request: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol handshake phase

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolHandshakeType {
    AnnounceMax,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

/// The version this stack implements.
pub const SHIP_VERSION: Version = Version { major: 1, minor: 0 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolFormats {
    #[serde(default)]
    pub format: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshakeType {
    pub handshake_type: ProtocolHandshakeType,
    pub version: Version,
    pub formats: MessageProtocolFormats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshake {
    pub message_protocol_handshake: MessageProtocolHandshakeType,
}

impl MessageProtocolHandshake {
    pub fn new(handshake_type: ProtocolHandshakeType) -> Self {
        Self {
            message_protocol_handshake: MessageProtocolHandshakeType {
                handshake_type,
                version: SHIP_VERSION,
                formats: MessageProtocolFormats {
                    format: vec![FORMAT_JSON_UTF8.to_string()],
                },
            },
        }
    }
}

/// Error codes carried by `messageProtocolHandshakeError`.
pub mod handshake_error {
    pub const RFC_MISMATCH: u8 = 1;
    pub const UNEXPECTED_MESSAGE: u8 = 2;
    pub const SELECTION_MISMATCH: u8 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshakeErrorType {
    pub error: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshakeError {
    pub message_protocol_handshake_error: MessageProtocolHandshakeErrorType,
}

// ---------------------------------------------------------------------------
// PIN phase

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinState {
    Required,
    Optional,
    PinOk,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPinStateType {
    pub pin_state: PinState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPinState {
    pub connection_pin_state: ConnectionPinStateType,
}

impl ConnectionPinState {
    pub fn none() -> Self {
        Self {
            connection_pin_state: ConnectionPinStateType {
                pin_state: PinState::None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Access methods phase

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessMethodsRequestType {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessMethodsRequest {
    pub access_methods_request: AccessMethodsRequestType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessMethodsType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessMethods {
    pub access_methods: AccessMethodsType,
}

impl AccessMethods {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            access_methods: AccessMethodsType {
                id: Some(id.into()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Close phase

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionClosePhase {
    Announce,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCloseType {
    pub phase: ConnectionClosePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionClose {
    pub connection_close: ConnectionCloseType,
}

impl ConnectionClose {
    pub fn announce(reason: Option<String>) -> Self {
        Self {
            connection_close: ConnectionCloseType {
                phase: ConnectionClosePhase::Announce,
                max_time: None,
                reason,
            },
        }
    }

    pub fn confirm() -> Self {
        Self {
            connection_close: ConnectionCloseType {
                phase: ConnectionClosePhase::Confirm,
                max_time: None,
                reason: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Data frames

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipHeader {
    pub protocol_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipDataType {
    pub header: ShipHeader,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipData {
    pub data: ShipDataType,
}

/// Any CONTROL-tagged message, decoded by its top-level key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ControlMessage {
    Hello(ConnectionHello),
    ProtocolHandshake(MessageProtocolHandshake),
    ProtocolHandshakeError(MessageProtocolHandshakeError),
    PinState(ConnectionPinState),
    AccessMethodsRequest(AccessMethodsRequest),
    AccessMethods(AccessMethods),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_decode_by_top_level_key() {
        let hello: ControlMessage =
            serde_json::from_value(serde_json::to_value(ConnectionHello::ready()).unwrap())
                .unwrap();
        assert!(matches!(hello, ControlMessage::Hello(_)));

        let methods: ControlMessage =
            serde_json::from_value(serde_json::to_value(AccessMethods::with_id("peer")).unwrap())
                .unwrap();
        assert!(matches!(methods, ControlMessage::AccessMethods(_)));
    }

    #[test]
    fn hello_pending_serializes_waiting() {
        let json = serde_json::to_value(ConnectionHello::pending(60_000, false)).unwrap();
        assert_eq!(json["connectionHello"]["phase"], "pending");
        assert_eq!(json["connectionHello"]["waiting"], 60_000);
        assert!(json["connectionHello"].get("prolongationRequest").is_none());
    }
}
