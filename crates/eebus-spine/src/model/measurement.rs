//! Measurement list payloads.

use serde::{Deserialize, Serialize};

use super::commondatatypes::{ScaledNumber, TimestampInterval};
use super::update::{ListElement, SelectorMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementValueType {
    Value,
    AverageValue,
    MinValue,
    MaxValue,
    StandardDeviation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementValueState {
    Normal,
    OutOfRange,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementValueTendency {
    Rising,
    Stable,
    Falling,
}

/// One measurement, keyed by `measurementId`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<MeasurementValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_period: Option<TimestampInterval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ScaledNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_state: Option<MeasurementValueState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_tendency: Option<MeasurementValueTendency>,
}

impl ListElement for MeasurementData {
    type Key = u32;

    fn identifier(&self) -> Option<u32> {
        self.measurement_id
    }

    fn update_from(&mut self, incoming: &Self) {
        if incoming.value_type.is_some() {
            self.value_type = incoming.value_type;
        }
        if incoming.timestamp.is_some() {
            self.timestamp = incoming.timestamp.clone();
        }
        if incoming.evaluation_period.is_some() {
            self.evaluation_period = incoming.evaluation_period.clone();
        }
        if incoming.value.is_some() {
            self.value = incoming.value;
        }
        if incoming.value_state.is_some() {
            self.value_state = incoming.value_state;
        }
        if incoming.value_tendency.is_some() {
            self.value_tendency = incoming.value_tendency;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementListData {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub measurement_data: Vec<MeasurementData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementListDataSelectors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<MeasurementValueType>,
}

impl SelectorMatch for MeasurementListDataSelectors {
    type Element = MeasurementData;

    fn matches(&self, item: &MeasurementData) -> bool {
        if let Some(id) = self.measurement_id {
            if item.measurement_id != Some(id) {
                return false;
            }
        }
        if let Some(value_type) = self.value_type {
            if item.value_type != Some(value_type) {
                return false;
            }
        }
        true
    }
}
