//! Device-configuration key/value payloads.

use serde::{Deserialize, Serialize};

use super::commondatatypes::ScaledNumber;
use super::update::{ListElement, SelectorMatch};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceConfigurationKeyName {
    PeakPowerOfPvSystem,
    PvCurtailmentLimitFactor,
    AsymmetricChargingSupported,
    CommunicationsStandard,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceConfigurationKeyValueType {
    Boolean,
    Date,
    DateTime,
    Duration,
    String,
    Time,
    ScaledNumber,
}

/// Value of a configuration key; exactly one field is populated, matching
/// the key's declared value type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaled_number: Option<ScaledNumber>,
}

/// One key/value entry, keyed by `keyId`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<DeviceConfigurationKeyValueValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_value_changeable: Option<bool>,
}

impl ListElement for DeviceConfigurationKeyValueData {
    type Key = u32;

    fn identifier(&self) -> Option<u32> {
        self.key_id
    }

    fn update_from(&mut self, incoming: &Self) {
        if incoming.value.is_some() {
            self.value = incoming.value.clone();
        }
        if incoming.is_value_changeable.is_some() {
            self.is_value_changeable = incoming.is_value_changeable;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueListData {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub device_configuration_key_value_data: Vec<DeviceConfigurationKeyValueData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueListDataSelectors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u32>,
}

impl SelectorMatch for DeviceConfigurationKeyValueListDataSelectors {
    type Element = DeviceConfigurationKeyValueData;

    fn matches(&self, item: &DeviceConfigurationKeyValueData) -> bool {
        match self.key_id {
            Some(id) => item.key_id == Some(id),
            None => true,
        }
    }
}

/// Static description of a configuration key, keyed by `keyId`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueDescriptionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<DeviceConfigurationKeyName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<DeviceConfigurationKeyValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListElement for DeviceConfigurationKeyValueDescriptionData {
    type Key = u32;

    fn identifier(&self) -> Option<u32> {
        self.key_id
    }

    fn update_from(&mut self, incoming: &Self) {
        if incoming.key_name.is_some() {
            self.key_name = incoming.key_name.clone();
        }
        if incoming.value_type.is_some() {
            self.value_type = incoming.value_type.clone();
        }
        if incoming.unit.is_some() {
            self.unit = incoming.unit.clone();
        }
        if incoming.label.is_some() {
            self.label = incoming.label.clone();
        }
        if incoming.description.is_some() {
            self.description = incoming.description.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueDescriptionListData {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub device_configuration_key_value_description_data:
        Vec<DeviceConfigurationKeyValueDescriptionData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigurationKeyValueDescriptionListDataSelectors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<DeviceConfigurationKeyName>,
}

impl SelectorMatch for DeviceConfigurationKeyValueDescriptionListDataSelectors {
    type Element = DeviceConfigurationKeyValueDescriptionData;

    fn matches(&self, item: &DeviceConfigurationKeyValueDescriptionData) -> bool {
        if let Some(id) = self.key_id {
            if item.key_id != Some(id) {
                return false;
            }
        }
        if let Some(name) = &self.key_name {
            if item.key_name.as_ref() != Some(name) {
                return false;
            }
        }
        true
    }
}
