//! SPINE datagram envelope: addresses, header, command classifier.
//!
//! Field names and shapes are fixed by the SPINE protocol specification;
//! everything in the header is optional on the wire, so every field is an
//! `Option` and senders fill in what a given classifier requires.

use serde::{Deserialize, Serialize};

use super::cmd::Cmd;

/// SPINE specification version announced in every datagram header.
pub const SPECIFICATION_VERSION: &str = "1.2.0";

/// Opaque address of a device on the premises network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(pub String);

impl DeviceAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of an entity below the device root. Never empty on a valid address;
/// `[0]` is the device-information entity.
pub type EntityAddress = Vec<u32>;

/// Full feature address as carried in datagram headers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entity: EntityAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<u32>,
}

impl FeatureAddress {
    pub fn new(device: Option<DeviceAddress>, entity: EntityAddress, feature: u32) -> Self {
        Self {
            device,
            entity,
            feature: Some(feature),
        }
    }

    /// True when entity path and feature index match, ignoring the device
    /// part if either side leaves it unset.
    pub fn matches(&self, other: &FeatureAddress) -> bool {
        if self.entity != other.entity || self.feature != other.feature {
            return false;
        }
        match (&self.device, &other.device) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl std::fmt::Display for FeatureAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(device) = &self.device {
            write!(f, "{device}:")?;
        }
        for (i, e) in self.entity.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{e}")?;
        }
        if let Some(feature) = self.feature {
            write!(f, ":{feature}")?;
        }
        Ok(())
    }
}

/// Monotonic per-sender message counter used for request/reply correlation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MsgCounter(pub u64);

impl MsgCounter {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MsgCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cnt:{}", self.0)
    }
}

/// Command classifier of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CmdClassifier {
    Read,
    Reply,
    Notify,
    Write,
    Call,
    Result,
}

impl std::fmt::Display for CmdClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CmdClassifier::Read => "read",
            CmdClassifier::Reply => "reply",
            CmdClassifier::Notify => "notify",
            CmdClassifier::Write => "write",
            CmdClassifier::Call => "call",
            CmdClassifier::Result => "result",
        };
        f.write_str(s)
    }
}

/// Datagram header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_source: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_destination: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_counter: Option<MsgCounter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_counter_reference: Option<MsgCounter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_classifier: Option<CmdClassifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_request: Option<bool>,
}

/// Datagram payload: a container of commands. In practice exactly one
/// command is populated per datagram.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub cmd: Vec<Cmd>,
}

/// A SPINE datagram: header plus command payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Datagram {
    pub header: Header,
    pub payload: Payload,
}

/// Wire envelope: the outermost JSON object is `{"datagram": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub datagram: Datagram,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_address_display_and_match() {
        let a = FeatureAddress::new(Some(DeviceAddress::new("d:_i:Demo")), vec![1, 2], 4);
        assert_eq!(a.to_string(), "d:_i:Demo:1.2:4");

        let device_less = FeatureAddress::new(None, vec![1, 2], 4);
        assert!(a.matches(&device_less));
        assert!(device_less.matches(&a));

        let other_entity = FeatureAddress::new(None, vec![1], 4);
        assert!(!a.matches(&other_entity));
    }

    #[test]
    fn header_round_trips_as_camel_case() {
        let header = Header {
            specification_version: Some(SPECIFICATION_VERSION.to_string()),
            address_source: Some(FeatureAddress::new(None, vec![0], 0)),
            address_destination: None,
            msg_counter: Some(MsgCounter::new(7)),
            msg_counter_reference: None,
            cmd_classifier: Some(CmdClassifier::Read),
            ack_request: None,
        };

        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["msgCounter"], 7);
        assert_eq!(json["cmdClassifier"], "read");
        assert!(json.get("msgCounterReference").is_none());

        let back: Header = serde_json::from_value(json).unwrap();
        assert_eq!(back, header);
    }
}
