//! The command container: one populated function field per command.
//!
//! On the wire a `cmd` object carries exactly one function payload plus
//! optional filters. `CmdData` is the extracted tagged form the router and
//! the function-data store dispatch on.

use serde::{Deserialize, Serialize};

use super::commondatatypes::ResultData;
use super::deviceclassification::DeviceClassificationManufacturerData;
use super::deviceconfiguration::{
    DeviceConfigurationKeyValueDescriptionListData, DeviceConfigurationKeyValueListData,
};
use super::devicediagnosis::{DeviceDiagnosisHeartbeatData, DeviceDiagnosisStateData};
use super::filter::Filter;
use super::measurement::MeasurementListData;
use super::nodemanagement::{
    NodeManagementBindingDeleteCall, NodeManagementBindingRequestCall,
    NodeManagementDestinationListData, NodeManagementDetailedDiscoveryData,
    NodeManagementSubscriptionDeleteCall, NodeManagementSubscriptionRequestCall,
    NodeManagementUseCaseData,
};
use super::types::Function;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cmd {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub filter: Vec<Filter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_detailed_discovery_data: Option<NodeManagementDetailedDiscoveryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_destination_list_data: Option<NodeManagementDestinationListData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_use_case_data: Option<NodeManagementUseCaseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_subscription_request_call: Option<NodeManagementSubscriptionRequestCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_subscription_delete_call: Option<NodeManagementSubscriptionDeleteCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_binding_request_call: Option<NodeManagementBindingRequestCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_management_binding_delete_call: Option<NodeManagementBindingDeleteCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_classification_manufacturer_data: Option<DeviceClassificationManufacturerData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_configuration_key_value_list_data: Option<DeviceConfigurationKeyValueListData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_configuration_key_value_description_list_data:
        Option<DeviceConfigurationKeyValueDescriptionListData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_diagnosis_state_data: Option<DeviceDiagnosisStateData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_diagnosis_heartbeat_data: Option<DeviceDiagnosisHeartbeatData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_list_data: Option<MeasurementListData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<ResultData>,
}

impl Cmd {
    /// The function of the populated payload field, if any.
    pub fn data_function(&self) -> Option<Function> {
        self.clone().extract().map(|d| d.function())
    }

    /// Pull the populated payload out of the container.
    pub fn extract(self) -> Option<CmdData> {
        if let Some(d) = self.node_management_detailed_discovery_data {
            return Some(CmdData::NodeManagementDetailedDiscoveryData(d));
        }
        if let Some(d) = self.node_management_destination_list_data {
            return Some(CmdData::NodeManagementDestinationListData(d));
        }
        if let Some(d) = self.node_management_use_case_data {
            return Some(CmdData::NodeManagementUseCaseData(d));
        }
        if let Some(d) = self.node_management_subscription_request_call {
            return Some(CmdData::NodeManagementSubscriptionRequestCall(d));
        }
        if let Some(d) = self.node_management_subscription_delete_call {
            return Some(CmdData::NodeManagementSubscriptionDeleteCall(d));
        }
        if let Some(d) = self.node_management_binding_request_call {
            return Some(CmdData::NodeManagementBindingRequestCall(d));
        }
        if let Some(d) = self.node_management_binding_delete_call {
            return Some(CmdData::NodeManagementBindingDeleteCall(d));
        }
        if let Some(d) = self.device_classification_manufacturer_data {
            return Some(CmdData::DeviceClassificationManufacturerData(d));
        }
        if let Some(d) = self.device_configuration_key_value_list_data {
            return Some(CmdData::DeviceConfigurationKeyValueListData(d));
        }
        if let Some(d) = self.device_configuration_key_value_description_list_data {
            return Some(CmdData::DeviceConfigurationKeyValueDescriptionListData(d));
        }
        if let Some(d) = self.device_diagnosis_state_data {
            return Some(CmdData::DeviceDiagnosisStateData(d));
        }
        if let Some(d) = self.device_diagnosis_heartbeat_data {
            return Some(CmdData::DeviceDiagnosisHeartbeatData(d));
        }
        if let Some(d) = self.measurement_list_data {
            return Some(CmdData::MeasurementListData(d));
        }
        if let Some(d) = self.result_data {
            return Some(CmdData::ResultData(d));
        }
        None
    }

    /// A read command: the addressed function with an empty payload
    /// element, `{"cmd":[{"<functionName>":{}}]}` on the wire.
    pub fn read(function: Function) -> Self {
        CmdData::empty(function).into()
    }

    /// A read command with partial/delete filters attached.
    pub fn read_with_filters(
        function: Function,
        filter_partial: Option<Filter>,
        filter_delete: Option<Filter>,
    ) -> Self {
        let mut cmd = Self::read(function);
        if let Some(f) = filter_partial {
            cmd.filter.push(f.into_partial());
        }
        if let Some(f) = filter_delete {
            cmd.filter.push(f.into_delete());
        }
        cmd
    }
}

impl From<CmdData> for Cmd {
    fn from(data: CmdData) -> Self {
        let mut cmd = Cmd::default();
        match data {
            CmdData::NodeManagementDetailedDiscoveryData(d) => {
                cmd.node_management_detailed_discovery_data = Some(d)
            }
            CmdData::NodeManagementDestinationListData(d) => {
                cmd.node_management_destination_list_data = Some(d)
            }
            CmdData::NodeManagementUseCaseData(d) => cmd.node_management_use_case_data = Some(d),
            CmdData::NodeManagementSubscriptionRequestCall(d) => {
                cmd.node_management_subscription_request_call = Some(d)
            }
            CmdData::NodeManagementSubscriptionDeleteCall(d) => {
                cmd.node_management_subscription_delete_call = Some(d)
            }
            CmdData::NodeManagementBindingRequestCall(d) => {
                cmd.node_management_binding_request_call = Some(d)
            }
            CmdData::NodeManagementBindingDeleteCall(d) => {
                cmd.node_management_binding_delete_call = Some(d)
            }
            CmdData::DeviceClassificationManufacturerData(d) => {
                cmd.device_classification_manufacturer_data = Some(d)
            }
            CmdData::DeviceConfigurationKeyValueListData(d) => {
                cmd.device_configuration_key_value_list_data = Some(d)
            }
            CmdData::DeviceConfigurationKeyValueDescriptionListData(d) => {
                cmd.device_configuration_key_value_description_list_data = Some(d)
            }
            CmdData::DeviceDiagnosisStateData(d) => cmd.device_diagnosis_state_data = Some(d),
            CmdData::DeviceDiagnosisHeartbeatData(d) => {
                cmd.device_diagnosis_heartbeat_data = Some(d)
            }
            CmdData::MeasurementListData(d) => cmd.measurement_list_data = Some(d),
            CmdData::ResultData(d) => cmd.result_data = Some(d),
        }
        cmd
    }
}

/// A function payload, tagged by its function. The router dispatches on the
/// tag; the function-data store keys its entries by it.
#[derive(Debug, Clone, PartialEq)]
pub enum CmdData {
    NodeManagementDetailedDiscoveryData(NodeManagementDetailedDiscoveryData),
    NodeManagementDestinationListData(NodeManagementDestinationListData),
    NodeManagementUseCaseData(NodeManagementUseCaseData),
    NodeManagementSubscriptionRequestCall(NodeManagementSubscriptionRequestCall),
    NodeManagementSubscriptionDeleteCall(NodeManagementSubscriptionDeleteCall),
    NodeManagementBindingRequestCall(NodeManagementBindingRequestCall),
    NodeManagementBindingDeleteCall(NodeManagementBindingDeleteCall),
    DeviceClassificationManufacturerData(DeviceClassificationManufacturerData),
    DeviceConfigurationKeyValueListData(DeviceConfigurationKeyValueListData),
    DeviceConfigurationKeyValueDescriptionListData(DeviceConfigurationKeyValueDescriptionListData),
    DeviceDiagnosisStateData(DeviceDiagnosisStateData),
    DeviceDiagnosisHeartbeatData(DeviceDiagnosisHeartbeatData),
    MeasurementListData(MeasurementListData),
    ResultData(ResultData),
}

impl CmdData {
    /// An empty payload for the given function, as carried by reads.
    pub fn empty(function: Function) -> Self {
        match function {
            Function::NodeManagementDetailedDiscoveryData => {
                CmdData::NodeManagementDetailedDiscoveryData(Default::default())
            }
            Function::NodeManagementDestinationListData => {
                CmdData::NodeManagementDestinationListData(Default::default())
            }
            Function::NodeManagementUseCaseData => {
                CmdData::NodeManagementUseCaseData(Default::default())
            }
            Function::NodeManagementSubscriptionRequestCall => {
                CmdData::NodeManagementSubscriptionRequestCall(Default::default())
            }
            Function::NodeManagementSubscriptionDeleteCall => {
                CmdData::NodeManagementSubscriptionDeleteCall(Default::default())
            }
            Function::NodeManagementBindingRequestCall => {
                CmdData::NodeManagementBindingRequestCall(Default::default())
            }
            Function::NodeManagementBindingDeleteCall => {
                CmdData::NodeManagementBindingDeleteCall(Default::default())
            }
            Function::DeviceClassificationManufacturerData => {
                CmdData::DeviceClassificationManufacturerData(Default::default())
            }
            Function::DeviceConfigurationKeyValueListData => {
                CmdData::DeviceConfigurationKeyValueListData(Default::default())
            }
            Function::DeviceConfigurationKeyValueDescriptionListData => {
                CmdData::DeviceConfigurationKeyValueDescriptionListData(Default::default())
            }
            Function::DeviceDiagnosisStateData => CmdData::DeviceDiagnosisStateData(Default::default()),
            Function::DeviceDiagnosisHeartbeatData => {
                CmdData::DeviceDiagnosisHeartbeatData(Default::default())
            }
            Function::MeasurementListData => CmdData::MeasurementListData(Default::default()),
            Function::ResultData => CmdData::ResultData(Default::default()),
        }
    }

    pub fn function(&self) -> Function {
        match self {
            CmdData::NodeManagementDetailedDiscoveryData(_) => {
                Function::NodeManagementDetailedDiscoveryData
            }
            CmdData::NodeManagementDestinationListData(_) => {
                Function::NodeManagementDestinationListData
            }
            CmdData::NodeManagementUseCaseData(_) => Function::NodeManagementUseCaseData,
            CmdData::NodeManagementSubscriptionRequestCall(_) => {
                Function::NodeManagementSubscriptionRequestCall
            }
            CmdData::NodeManagementSubscriptionDeleteCall(_) => {
                Function::NodeManagementSubscriptionDeleteCall
            }
            CmdData::NodeManagementBindingRequestCall(_) => {
                Function::NodeManagementBindingRequestCall
            }
            CmdData::NodeManagementBindingDeleteCall(_) => Function::NodeManagementBindingDeleteCall,
            CmdData::DeviceClassificationManufacturerData(_) => {
                Function::DeviceClassificationManufacturerData
            }
            CmdData::DeviceConfigurationKeyValueListData(_) => {
                Function::DeviceConfigurationKeyValueListData
            }
            CmdData::DeviceConfigurationKeyValueDescriptionListData(_) => {
                Function::DeviceConfigurationKeyValueDescriptionListData
            }
            CmdData::DeviceDiagnosisStateData(_) => Function::DeviceDiagnosisStateData,
            CmdData::DeviceDiagnosisHeartbeatData(_) => Function::DeviceDiagnosisHeartbeatData,
            CmdData::MeasurementListData(_) => Function::MeasurementListData,
            CmdData::ResultData(_) => Function::ResultData,
        }
    }
}
