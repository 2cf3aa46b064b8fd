//! Device-diagnosis payloads: operating state and heartbeats.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceDiagnosisOperatingState {
    NormalOperation,
    Standby,
    Failure,
    ServiceNeeded,
    OverrideDetected,
    InAlarm,
    NotReachable,
    Finished,
}

/// Current operating state of a device. Scalar payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDiagnosisStateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_state: Option<DeviceDiagnosisOperatingState>,
}

/// One heartbeat. `heartbeat_counter` increases by one per beat for the
/// lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDiagnosisHeartbeatData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_counter: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<String>,
}
