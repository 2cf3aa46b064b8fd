//! Shared SPINE enumerations: feature/entity/device types, roles, functions.

use serde::{Deserialize, Serialize};

/// Function names dispatched by the router. One variant per function the
/// core understands; the wire name is the camelCase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Function {
    NodeManagementDetailedDiscoveryData,
    NodeManagementDestinationListData,
    NodeManagementUseCaseData,
    NodeManagementSubscriptionRequestCall,
    NodeManagementSubscriptionDeleteCall,
    NodeManagementBindingRequestCall,
    NodeManagementBindingDeleteCall,
    DeviceClassificationManufacturerData,
    DeviceConfigurationKeyValueListData,
    DeviceConfigurationKeyValueDescriptionListData,
    DeviceDiagnosisStateData,
    DeviceDiagnosisHeartbeatData,
    MeasurementListData,
    ResultData,
}

impl Function {
    /// NodeManagement functions route to the special feature on entity 0
    /// even when the destination address does not resolve.
    pub fn is_node_management(self) -> bool {
        matches!(
            self,
            Function::NodeManagementDetailedDiscoveryData
                | Function::NodeManagementDestinationListData
                | Function::NodeManagementUseCaseData
                | Function::NodeManagementSubscriptionRequestCall
                | Function::NodeManagementSubscriptionDeleteCall
                | Function::NodeManagementBindingRequestCall
                | Function::NodeManagementBindingDeleteCall
        )
    }

    /// The camelCase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Function::NodeManagementDetailedDiscoveryData => "nodeManagementDetailedDiscoveryData",
            Function::NodeManagementDestinationListData => "nodeManagementDestinationListData",
            Function::NodeManagementUseCaseData => "nodeManagementUseCaseData",
            Function::NodeManagementSubscriptionRequestCall => {
                "nodeManagementSubscriptionRequestCall"
            }
            Function::NodeManagementSubscriptionDeleteCall => "nodeManagementSubscriptionDeleteCall",
            Function::NodeManagementBindingRequestCall => "nodeManagementBindingRequestCall",
            Function::NodeManagementBindingDeleteCall => "nodeManagementBindingDeleteCall",
            Function::DeviceClassificationManufacturerData => "deviceClassificationManufacturerData",
            Function::DeviceConfigurationKeyValueListData => "deviceConfigurationKeyValueListData",
            Function::DeviceConfigurationKeyValueDescriptionListData => {
                "deviceConfigurationKeyValueDescriptionListData"
            }
            Function::DeviceDiagnosisStateData => "deviceDiagnosisStateData",
            Function::DeviceDiagnosisHeartbeatData => "deviceDiagnosisHeartbeatData",
            Function::MeasurementListData => "measurementListData",
            Function::ResultData => "resultData",
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature types appearing in discovery data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    NodeManagement,
    DeviceClassification,
    DeviceConfiguration,
    DeviceDiagnosis,
    Measurement,
    ElectricalConnection,
    LoadControl,
    Identification,
    TimeSeries,
    IncentiveTable,
    Generic,
}

/// Role of a feature within its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Client,
    Server,
    Special,
}

/// Entity types appearing in discovery data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    DeviceInformation,
    #[serde(rename = "CEM")]
    Cem,
    #[serde(rename = "EVSE")]
    Evse,
    #[serde(rename = "EV")]
    Ev,
    GridConnectionPointOfPremises,
    Inverter,
    HeatPumpAppliance,
    ElectricityStorageSystem,
    ElectricityGenerationSystem,
    SubMeterElectricity,
}

/// Device types appearing in discovery data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    EnergyManagementSystem,
    ChargingStation,
    HeatPumpAppliance,
    Inverter,
    SmartEnergyAppliance,
    SubMeterElectricity,
    ElectricitySupplySystem,
    Generic,
}

/// Network feature set announced in the device description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkFeatureSet {
    Simple,
    Smart,
    Gateway,
    Router,
}

/// Use-case actors announced via `nodeManagementUseCaseData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseCaseActor {
    #[serde(rename = "CEM")]
    Cem,
    #[serde(rename = "EV")]
    Ev,
    #[serde(rename = "EVSE")]
    Evse,
    HeatPump,
    Inverter,
    MonitoringAppliance,
    VisualizationAppliance,
    ControllableSystem,
    EnergyGuard,
}

/// Use-case names form an open registry, so they stay a plain string on the
/// wire rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UseCaseName(pub String);

impl UseCaseName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_wire_names_match_serde() {
        for function in [
            Function::NodeManagementDetailedDiscoveryData,
            Function::DeviceClassificationManufacturerData,
            Function::MeasurementListData,
            Function::ResultData,
        ] {
            let wire = serde_json::to_value(function).unwrap();
            assert_eq!(wire, function.as_str());
        }
    }

    #[test]
    fn entity_type_abbreviations() {
        assert_eq!(serde_json::to_value(EntityType::Evse).unwrap(), "EVSE");
        assert_eq!(
            serde_json::from_value::<EntityType>(serde_json::json!("EV")).unwrap(),
            EntityType::Ev
        );
    }
}
