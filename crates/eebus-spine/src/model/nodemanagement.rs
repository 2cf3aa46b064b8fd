//! NodeManagement payloads: detailed discovery, destinations, use cases,
//! subscription and binding management.

use serde::{Deserialize, Serialize};

use super::datagram::{DeviceAddress, EntityAddress, FeatureAddress};
use super::filter::ElementTag;
use super::types::{
    DeviceType, EntityType, FeatureType, Function, NetworkFeatureSet, Role, UseCaseActor,
    UseCaseName,
};

/// Device part of an address, as nested in description records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAddressEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceAddress>,
}

/// Entity part of an address, as nested in description records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAddressEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entity: EntityAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkManagementStateChange {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkManagementDeviceDescriptionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_address: Option<DeviceAddressEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_feature_set: Option<NetworkFeatureSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkManagementEntityDescriptionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_address: Option<EntityAddressEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state_change: Option<NetworkManagementStateChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Operations a function supports. Presence of `read`/`write` is the signal;
/// the nested `partial` tag advertises partial access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PossibleOperationsRead {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<ElementTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PossibleOperationsWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<ElementTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PossibleOperations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<PossibleOperationsRead>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<PossibleOperationsWrite>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionProperty {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_operations: Option<PossibleOperations>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkManagementFeatureDescriptionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<FeatureType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub supported_function: Vec<FunctionProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ISO-8601 duration, e.g. `PT10S`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_delay: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDetailedDiscoveryDeviceInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<NetworkManagementDeviceDescriptionData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDetailedDiscoveryEntityInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<NetworkManagementEntityDescriptionData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDetailedDiscoveryFeatureInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<NetworkManagementFeatureDescriptionData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationVersionList {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub specification_version: Vec<String>,
}

/// The full discovery record: the device, its entities, their features.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDetailedDiscoveryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification_version_list: Option<SpecificationVersionList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_information: Option<NodeManagementDetailedDiscoveryDeviceInformation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entity_information: Vec<NodeManagementDetailedDiscoveryEntityInformation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub feature_information: Vec<NodeManagementDetailedDiscoveryFeatureInformation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDestinationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_description: Option<NetworkManagementDeviceDescriptionData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementDestinationListData {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub node_management_destination_data: Vec<NodeManagementDestinationData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseSupport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_name: Option<UseCaseName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenario_support: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseInformationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<UseCaseActor>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub use_case_support: Vec<UseCaseSupport>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementUseCaseData {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub use_case_information: Vec<UseCaseInformationData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionManagementRequestCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_feature_type: Option<FeatureType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionManagementDeleteCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<FeatureAddress>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementSubscriptionRequestCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_request: Option<SubscriptionManagementRequestCall>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementSubscriptionDeleteCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_delete: Option<SubscriptionManagementDeleteCall>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingManagementRequestCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_feature_type: Option<FeatureType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingManagementDeleteCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<FeatureAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<FeatureAddress>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementBindingRequestCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_request: Option<BindingManagementRequestCall>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeManagementBindingDeleteCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_delete: Option<BindingManagementDeleteCall>,
}
