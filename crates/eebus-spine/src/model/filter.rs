//! Partial/delete filters scoping list updates.
//!
//! A command may carry up to two filters: one marked `partial`, one marked
//! `delete` (via `cmdControl`). Each filter optionally carries a selector
//! naming the subset of list elements it applies to.

use serde::{Deserialize, Serialize};

use super::deviceconfiguration::{
    DeviceConfigurationKeyValueDescriptionListDataSelectors,
    DeviceConfigurationKeyValueListDataSelectors,
};
use super::measurement::MeasurementListDataSelectors;

/// Marker for presence-only JSON fields (`{}` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementTag {}

/// `cmdControl` discriminates what a filter does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmdControl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<ElementTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<ElementTag>,
}

/// A filter attached to a command. Exactly one selector field is populated,
/// matching the list function the command carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_control: Option<CmdControl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_list_data_selectors: Option<MeasurementListDataSelectors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_configuration_key_value_list_data_selectors:
        Option<DeviceConfigurationKeyValueListDataSelectors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_configuration_key_value_description_list_data_selectors:
        Option<DeviceConfigurationKeyValueDescriptionListDataSelectors>,
}

impl Filter {
    pub fn partial() -> Self {
        Self {
            cmd_control: Some(CmdControl {
                partial: Some(ElementTag {}),
                delete: None,
            }),
            ..Default::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            cmd_control: Some(CmdControl {
                partial: None,
                delete: Some(ElementTag {}),
            }),
            ..Default::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        self.cmd_control.is_some_and(|c| c.partial.is_some())
    }

    pub fn is_delete(&self) -> bool {
        self.cmd_control.is_some_and(|c| c.delete.is_some())
    }

    /// Mark this filter as the partial filter of a command.
    pub fn into_partial(mut self) -> Self {
        self.cmd_control = Some(CmdControl {
            partial: Some(ElementTag {}),
            delete: None,
        });
        self
    }

    /// Mark this filter as the delete filter of a command.
    pub fn into_delete(mut self) -> Self {
        self.cmd_control = Some(CmdControl {
            partial: None,
            delete: Some(ElementTag {}),
        });
        self
    }
}

/// Split a command's filter list into its partial and delete parts.
pub fn partition_filters(filters: &[Filter]) -> (Option<&Filter>, Option<&Filter>) {
    let partial = filters.iter().find(|f| f.is_partial());
    let delete = filters.iter().find(|f| f.is_delete());
    (partial, delete)
}
