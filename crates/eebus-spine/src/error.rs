//! Error types surfaced by the SPINE router.

use crate::model::{Function, MsgCounter};

/// Error produced while routing, storing, or requesting SPINE data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpineError {
    /// The remote feature does not advertise the requested operation.
    OperationNotSupported {
        function: Function,
        operation: &'static str,
    },
    /// A pending request passed its deadline without a reply.
    ResponseTimeout { counter: MsgCounter },
    /// The connection closed while a reply was outstanding.
    ConnectionClosed,
    /// `data()` was called for a function that was never populated.
    DataNotAvailable { function: Function },
    /// A list element carried none of its identifier fields.
    MissingIdentifier,
    /// The datagram is structurally unusable (missing header fields,
    /// empty command container, unroutable address).
    InvalidDatagram(String),
    /// The datagram payload could not be deserialized.
    Decode(String),
    /// The peer replied with a resultData error.
    RemoteError {
        error_number: u32,
        description: Option<String>,
    },
    /// A required configuration field is missing or empty.
    InvalidConfig(&'static str),
}

impl std::fmt::Display for SpineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpineError::OperationNotSupported {
                function,
                operation,
            } => {
                write!(f, "operation {operation} not supported for {function}")
            }
            SpineError::ResponseTimeout { counter } => {
                write!(f, "no reply for request {counter} before its deadline")
            }
            SpineError::ConnectionClosed => write!(f, "connection closed"),
            SpineError::DataNotAvailable { function } => {
                write!(f, "no data available for {function}")
            }
            SpineError::MissingIdentifier => {
                write!(f, "list element carries no identifier field")
            }
            SpineError::InvalidDatagram(msg) => write!(f, "invalid datagram: {msg}"),
            SpineError::Decode(msg) => write!(f, "decode error: {msg}"),
            SpineError::RemoteError {
                error_number,
                description,
            } => match description {
                Some(d) => write!(f, "remote error {error_number}: {d}"),
                None => write!(f, "remote error {error_number}"),
            },
            SpineError::InvalidConfig(field) => write!(f, "{field} is required"),
        }
    }
}

impl std::error::Error for SpineError {}

impl From<serde_json::Error> for SpineError {
    fn from(e: serde_json::Error) -> Self {
        SpineError::Decode(e.to_string())
    }
}
