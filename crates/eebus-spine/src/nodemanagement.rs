//! Handlers for the NodeManagement special feature.
//!
//! Serves detailed-discovery, destination-list and use-case reads from the
//! local tree, materializes the remote tree from discovery replies and
//! notifies, and maintains subscriptions/bindings from management calls.

use std::sync::Arc;

use tracing::{debug, info};

use crate::device::{DeviceLocal, DeviceRemote};
use crate::entity::EntityRemote;
use crate::error::SpineError;
use crate::feature::FeatureRemote;
use crate::model::nodemanagement::{
    NetworkManagementStateChange, NodeManagementDestinationListData,
    NodeManagementDetailedDiscoveryData, NodeManagementDetailedDiscoveryEntityInformation,
    NodeManagementDetailedDiscoveryFeatureInformation,
};
use crate::model::{CmdData, FeatureType, Function, Header, ResultData, Role};

/// Serve a NodeManagement read from the local device.
pub(crate) fn handle_read(
    device: &Arc<DeviceLocal>,
    remote: &Arc<DeviceRemote>,
    header: &Header,
    function: Function,
) -> Result<(), SpineError> {
    let node_management = device.node_management();
    let data = match function {
        Function::NodeManagementDetailedDiscoveryData => {
            CmdData::NodeManagementDetailedDiscoveryData(device.detailed_discovery_data())
        }
        Function::NodeManagementDestinationListData => {
            CmdData::NodeManagementDestinationListData(NodeManagementDestinationListData {
                node_management_destination_data: vec![device.destination_data()],
            })
        }
        Function::NodeManagementUseCaseData => {
            CmdData::NodeManagementUseCaseData(device.use_case_information())
        }
        _ => {
            remote.sender().result(
                header,
                node_management.address().clone(),
                ResultData::error(1, format!("{function} is not readable")),
            )?;
            return Ok(());
        }
    };
    remote
        .sender()
        .reply(header, node_management.address().clone(), data)?;
    Ok(())
}

/// Apply a detailed-discovery reply or notify to the remote tree.
///
/// Entities are created or updated in place; an entity's features are
/// rebuilt wholesale from the record. Entities flagged `removed` are
/// dropped with everything below them.
pub(crate) fn handle_discovery_data(
    remote: &Arc<DeviceRemote>,
    data: NodeManagementDetailedDiscoveryData,
) -> Result<(), SpineError> {
    if let Some(description) = data
        .device_information
        .as_ref()
        .and_then(|i| i.description.as_ref())
    {
        remote.update_device(description);
    }

    for entity_information in &data.entity_information {
        let (description, entity_address) = check_entity_information(remote, entity_information)?;

        if description.last_state_change == Some(NetworkManagementStateChange::Removed) {
            info!(ski = remote.ski(), ?entity_address, "entity removed");
            remote.remove_entity(&entity_address);
            continue;
        }

        let entity = match remote.entity(&entity_address) {
            Some(entity) => entity,
            None => {
                let entity_type = description.entity_type.ok_or_else(|| {
                    SpineError::InvalidDatagram("entity information carries no type".into())
                })?;
                let entity = EntityRemote::new(
                    remote.address(),
                    entity_address.clone(),
                    entity_type,
                    remote.sender().clone(),
                );
                remote.add_entity(entity.clone());
                entity
            }
        };

        entity.set_description(description.description.clone());
        entity.remove_all_features();
        for feature_information in &data.feature_information {
            let Some(feature_description) = feature_information.description.as_ref() else {
                continue;
            };
            let Some(feature_address) = feature_description.feature_address.as_ref() else {
                continue;
            };
            if feature_address.entity == entity_address {
                add_remote_feature(&entity, feature_information);
            }
        }
    }

    Ok(())
}

/// Validate an entity record and return its description plus address.
fn check_entity_information<'a>(
    remote: &Arc<DeviceRemote>,
    entity: &'a NodeManagementDetailedDiscoveryEntityInformation,
) -> Result<
    (
        &'a crate::model::nodemanagement::NetworkManagementEntityDescriptionData,
        crate::model::EntityAddress,
    ),
    SpineError,
> {
    let description = entity
        .description
        .as_ref()
        .ok_or_else(|| SpineError::InvalidDatagram("entity information has no description".into()))?;
    let address = description
        .entity_address
        .as_ref()
        .ok_or_else(|| SpineError::InvalidDatagram("entity information has no address".into()))?;
    if address.entity.is_empty() {
        return Err(SpineError::InvalidDatagram(
            "entity information has an empty address".into(),
        ));
    }

    // On initial discovery the device is still unknown; afterwards the
    // record must keep naming the same device.
    if let (Some(incoming), Some(known)) = (&address.device, &remote.address()) {
        if incoming != known {
            return Err(SpineError::InvalidDatagram(format!(
                "device address mismatch: {incoming} != {known}"
            )));
        }
    }

    Ok((description, address.entity.clone()))
}

fn add_remote_feature(
    entity: &Arc<EntityRemote>,
    information: &NodeManagementDetailedDiscoveryFeatureInformation,
) -> Option<Arc<FeatureRemote>> {
    let description = information.description.as_ref()?;
    let index = description.feature_address.as_ref()?.feature?;
    let feature_type = description.feature_type?;
    let role = description.role?;

    let feature = entity.add_feature(index, feature_type, role);
    feature.set_description(description.description.clone());
    feature.set_max_response_delay(description.max_response_delay.as_deref());
    feature.set_operations(&description.supported_function);
    Some(feature)
}

/// Handle subscription/binding management calls from the peer.
pub(crate) fn handle_call(
    device: &Arc<DeviceLocal>,
    remote: &Arc<DeviceRemote>,
    header: &Header,
    data: CmdData,
) -> Result<(), SpineError> {
    let node_management = device.node_management();
    let ski = remote.ski();

    match data {
        CmdData::NodeManagementSubscriptionRequestCall(call) => {
            let request = call.subscription_request.ok_or_else(|| {
                SpineError::InvalidDatagram("subscription request without body".into())
            })?;
            let (client, server) = match (request.client_address, request.server_address) {
                (Some(c), Some(s)) => (c, s),
                _ => {
                    return Err(SpineError::InvalidDatagram(
                        "subscription request without addresses".into(),
                    ))
                }
            };
            let feature = device.feature_by_address(&server).ok_or_else(|| {
                SpineError::InvalidDatagram(format!("unknown subscription server {server}"))
            })?;

            if device.subscriptions.add(ski, client.clone(), server.clone()) {
                info!(ski, %server, "subscription added");
            }

            // A subscription on the DeviceDiagnosis server turns on the
            // heartbeat push towards the subscriber.
            if feature.feature_type() == FeatureType::DeviceDiagnosis
                && feature.role() == Role::Server
            {
                remote.start_heartbeat(server, client);
            }
        }
        CmdData::NodeManagementSubscriptionDeleteCall(call) => {
            let delete = call.subscription_delete.ok_or_else(|| {
                SpineError::InvalidDatagram("subscription delete without body".into())
            })?;
            let (client, server) = match (delete.client_address, delete.server_address) {
                (Some(c), Some(s)) => (c, s),
                _ => {
                    return Err(SpineError::InvalidDatagram(
                        "subscription delete without addresses".into(),
                    ))
                }
            };
            if device.subscriptions.remove(ski, &client, &server) {
                info!(ski, %server, "subscription removed");
            }

            let is_diagnosis_server = device
                .feature_by_address(&server)
                .is_some_and(|f| {
                    f.feature_type() == FeatureType::DeviceDiagnosis && f.role() == Role::Server
                });
            if is_diagnosis_server && !device.subscriptions.has_server_subscription(ski, &server) {
                remote.stop_heartbeat();
            }
        }
        CmdData::NodeManagementBindingRequestCall(call) => {
            let request = call
                .binding_request
                .ok_or_else(|| SpineError::InvalidDatagram("binding request without body".into()))?;
            let (client, server) = match (request.client_address, request.server_address) {
                (Some(c), Some(s)) => (c, s),
                _ => {
                    return Err(SpineError::InvalidDatagram(
                        "binding request without addresses".into(),
                    ))
                }
            };
            if device.feature_by_address(&server).is_none() {
                return Err(SpineError::InvalidDatagram(format!(
                    "unknown binding server {server}"
                )));
            }
            if device.bindings.add(ski, client, server.clone()) {
                info!(ski, %server, "binding added");
            }
        }
        CmdData::NodeManagementBindingDeleteCall(call) => {
            let delete = call
                .binding_delete
                .ok_or_else(|| SpineError::InvalidDatagram("binding delete without body".into()))?;
            let (client, server) = match (delete.client_address, delete.server_address) {
                (Some(c), Some(s)) => (c, s),
                _ => {
                    return Err(SpineError::InvalidDatagram(
                        "binding delete without addresses".into(),
                    ))
                }
            };
            if device.bindings.remove(ski, &client, &server) {
                info!(ski, %server, "binding removed");
            }
        }
        other => {
            debug!(function = %other.function(), "unexpected call payload");
            return Err(SpineError::InvalidDatagram(format!(
                "{} is not callable",
                other.function()
            )));
        }
    }

    if header.ack_request == Some(true) {
        remote
            .sender()
            .result(header, node_management.address().clone(), ResultData::success())?;
    }
    Ok(())
}
