//! SHIP wire codec.
//!
//! Frames are binary: one type-tag byte followed by UTF-8 JSON (INIT frames
//! carry a single zero byte instead). The JSON is the EEBUS shape, in which
//! every object field is wrapped in a single-element array. Two pure
//! transforms convert between canonical JSON and that shape.
//!
//! Data frames embed an already EEBUS-encoded SPINE datagram in their
//! `payload` field. The envelope is marshalled with a placeholder string
//! and the datagram text is spliced in afterwards, so the inner message is
//! not wrapped a second time.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::model::{MessageType, ShipData, ShipDataType, ShipHeader, SHIP_PROTOCOL_ID};

/// The INIT frame: type tag plus the mandatory zero value byte.
pub const INIT_FRAME: [u8; 2] = [MessageType::Init as u8, 0x00];

const PAYLOAD_PLACEHOLDER: &str = "@@ship-payload@@";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame body is not valid UTF-8.
    Utf8,
    /// Frame body is not valid JSON, or a model failed to (de)serialize.
    Json(String),
    /// JSON is structurally not EEBUS-shaped.
    Shape(String),
    /// Empty frame or unknown message-type tag.
    Frame(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Utf8 => write!(f, "frame body is not valid UTF-8"),
            CodecError::Json(msg) => write!(f, "invalid JSON: {msg}"),
            CodecError::Shape(msg) => write!(f, "invalid EEBUS JSON shape: {msg}"),
            CodecError::Frame(msg) => write!(f, "invalid frame: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

/// Canonical JSON → EEBUS JSON: wrap every object field in a one-element
/// array, recursively.
pub fn json_to_eebus(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, field)| (key.clone(), Value::Array(vec![json_to_eebus(field)])))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(json_to_eebus).collect()),
        other => other.clone(),
    }
}

/// EEBUS JSON → canonical JSON: unwrap every object field from its
/// one-element array. Any other field shape is an error.
pub fn json_from_eebus(value: &Value) -> Result<Value, CodecError> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, field) in map {
                let Value::Array(items) = field else {
                    return Err(CodecError::Shape(format!("field {key} is not wrapped")));
                };
                if items.len() != 1 {
                    return Err(CodecError::Shape(format!(
                        "field {key} is wrapped in {} elements",
                        items.len()
                    )));
                }
                out.insert(key.clone(), json_from_eebus(&items[0])?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(json_from_eebus)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Split a frame into its type tag and body.
pub fn split_frame(message: &[u8]) -> Result<(MessageType, &[u8]), CodecError> {
    let (&tag, body) = message
        .split_first()
        .ok_or_else(|| CodecError::Frame("empty frame".into()))?;
    let message_type = MessageType::from_byte(tag)
        .ok_or_else(|| CodecError::Frame(format!("unknown message type tag {tag:#04x}")))?;
    Ok((message_type, body))
}

/// Decode a JSON frame body into canonical JSON.
pub fn decode_body(body: &[u8]) -> Result<Value, CodecError> {
    let text = std::str::from_utf8(body).map_err(|_| CodecError::Utf8)?;
    let value: Value = serde_json::from_str(text)?;
    json_from_eebus(&value)
}

/// Encode a SHIP model as a tagged EEBUS frame.
pub fn encode_frame<T: Serialize>(message_type: MessageType, model: &T) -> Result<Bytes, CodecError> {
    let value = serde_json::to_value(model)?;
    let eebus = json_to_eebus(&value);
    let text = serde_json::to_string(&eebus)?;

    let mut frame = BytesMut::with_capacity(1 + text.len());
    frame.put_u8(message_type as u8);
    frame.put_slice(text.as_bytes());
    Ok(frame.freeze())
}

/// Encode a DATA frame around canonical SPINE datagram bytes.
///
/// The datagram is EEBUS-encoded on its own and spliced verbatim into the
/// independently encoded envelope.
pub fn encode_spine_frame(spine_message: &[u8]) -> Result<Bytes, CodecError> {
    let text = std::str::from_utf8(spine_message).map_err(|_| CodecError::Utf8)?;
    let spine_value: Value = serde_json::from_str(text)?;
    let spine_eebus = serde_json::to_string(&json_to_eebus(&spine_value))?;

    let envelope = ShipData {
        data: ShipDataType {
            header: ShipHeader {
                protocol_id: SHIP_PROTOCOL_ID.to_string(),
            },
            payload: Value::String(PAYLOAD_PLACEHOLDER.to_string()),
        },
    };
    let envelope_value = serde_json::to_value(&envelope)?;
    let envelope_text = serde_json::to_string(&json_to_eebus(&envelope_value))?;

    let placeholder = format!("\"{PAYLOAD_PLACEHOLDER}\"");
    let text = envelope_text.replace(&placeholder, &spine_eebus);

    let mut frame = BytesMut::with_capacity(1 + text.len());
    frame.put_u8(MessageType::Data as u8);
    frame.put_slice(text.as_bytes());
    Ok(frame.freeze())
}
