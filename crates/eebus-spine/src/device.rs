//! Local and remote devices, and the inbound datagram router.
//!
//! The local device is built once from configuration and owns the entity
//! tree the peer discovers. Each accepted SHIP connection materializes one
//! remote device; its tree is populated by detailed discovery and torn down
//! atomically on close.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::entity::{EntityLocal, EntityRemote};
use crate::error::SpineError;
use crate::feature::{FeatureLocal, FeatureRemote, Operations, DEFAULT_MAX_RESPONSE_DELAY};
use crate::heartbeat::HeartbeatSender;
use crate::model::nodemanagement::{
    NetworkManagementDeviceDescriptionData, NodeManagementDestinationData,
    NodeManagementDetailedDiscoveryData, NodeManagementDetailedDiscoveryDeviceInformation,
    NodeManagementDetailedDiscoveryEntityInformation,
    NodeManagementDetailedDiscoveryFeatureInformation, NodeManagementUseCaseData,
    DeviceAddressEnvelope,
};
use crate::model::{
    Cmd, CmdClassifier, CmdData, DeviceAddress, DeviceType, EntityAddress, EntityType, Envelope,
    FeatureAddress, FeatureType, Filter, Function, Header, NetworkFeatureSet, ResultData, Role,
    UseCaseActor, UseCaseName, partition_filters,
};
use crate::nodemanagement;
use crate::pending::{PendingRequests, ReplyMessage};
use crate::sender::{Sender, SpineDataSink};
use crate::subscription::{BindingManager, SubscriptionManager};
use crate::usecase::UseCaseManager;

/// Index of the device-information entity.
pub const DEVICE_INFORMATION_ENTITY_ID: u32 = 0;

/// Identity of the local device, as required by the device address and the
/// SHIP identifier.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    vendor_code: String,
    brand: String,
    model: String,
    serial_number: String,
    device_type: DeviceType,
    feature_set: NetworkFeatureSet,
}

impl DeviceConfig {
    pub fn new(
        vendor_code: impl Into<String>,
        brand: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
        device_type: DeviceType,
    ) -> Result<Self, SpineError> {
        let config = Self {
            vendor_code: vendor_code.into(),
            brand: brand.into(),
            model: model.into(),
            serial_number: serial_number.into(),
            device_type,
            feature_set: NetworkFeatureSet::Smart,
        };
        if config.vendor_code.is_empty() {
            return Err(SpineError::InvalidConfig("vendorCode"));
        }
        if config.brand.is_empty() {
            return Err(SpineError::InvalidConfig("brand"));
        }
        if config.model.is_empty() {
            return Err(SpineError::InvalidConfig("model"));
        }
        if config.serial_number.is_empty() {
            return Err(SpineError::InvalidConfig("serialNumber"));
        }
        Ok(config)
    }

    pub fn with_feature_set(mut self, feature_set: NetworkFeatureSet) -> Self {
        self.feature_set = feature_set;
        self
    }

    /// Device address per the SPINE addressing scheme.
    pub fn device_address(&self) -> DeviceAddress {
        DeviceAddress::new(format!(
            "d:_i:{}_{}-{}",
            self.vendor_code, self.model, self.serial_number
        ))
    }

    /// Identifier used as the SHIP id: `Brand-Model-SerialNumber`.
    pub fn ship_identifier(&self) -> String {
        format!("{}-{}-{}", self.brand, self.model, self.serial_number)
    }
}

/// The local device: root of the served entity tree, router for every
/// connected peer's inbound datagrams.
pub struct DeviceLocal {
    address: DeviceAddress,
    device_type: DeviceType,
    feature_set: NetworkFeatureSet,
    ship_identifier: String,
    entities: Mutex<Vec<Arc<EntityLocal>>>,
    next_entity_id: Mutex<u32>,
    remote_devices: Mutex<HashMap<String, Arc<DeviceRemote>>>,
    pub(crate) subscriptions: SubscriptionManager,
    pub(crate) bindings: BindingManager,
    use_cases: Mutex<UseCaseManager>,
    pending: Arc<PendingRequests>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DeviceLocal {
    pub fn new(config: DeviceConfig) -> Arc<Self> {
        let address = config.device_address();
        let device = Arc::new(Self {
            address: address.clone(),
            device_type: config.device_type,
            feature_set: config.feature_set,
            ship_identifier: config.ship_identifier(),
            entities: Mutex::new(Vec::new()),
            next_entity_id: Mutex::new(DEVICE_INFORMATION_ENTITY_ID + 1),
            remote_devices: Mutex::new(HashMap::new()),
            subscriptions: SubscriptionManager::default(),
            bindings: BindingManager::default(),
            use_cases: Mutex::new(UseCaseManager::default()),
            pending: PendingRequests::new(),
            sweeper: Mutex::new(None),
        });

        let device_information = EntityLocal::new(
            address,
            vec![DEVICE_INFORMATION_ENTITY_ID],
            EntityType::DeviceInformation,
        );
        let node_management =
            device_information.add_feature(FeatureType::NodeManagement, Role::Special);
        node_management.add_function(
            Function::NodeManagementDetailedDiscoveryData,
            Operations::read_only(),
        );
        node_management.add_function(
            Function::NodeManagementDestinationListData,
            Operations::read_only(),
        );
        node_management.add_function(Function::NodeManagementUseCaseData, Operations::read_only());
        device.entities.lock().push(device_information);

        device
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn feature_set(&self) -> NetworkFeatureSet {
        self.feature_set
    }

    /// SHIP id derived from the configuration, handed to the hub.
    pub fn ship_identifier(&self) -> &str {
        &self.ship_identifier
    }

    /// Any reply correlation entries outstanding for this peer?
    pub fn has_pending_requests(&self, ski: &str) -> bool {
        self.pending.has_for_device(ski)
    }

    /// Register a use case served by the local device.
    pub fn add_use_case(
        &self,
        actor: UseCaseActor,
        name: UseCaseName,
        version: impl Into<String>,
        scenarios: Vec<u32>,
    ) {
        self.use_cases.lock().add(actor, name, version, scenarios);
    }

    /// Create a new entity below the device root.
    pub fn add_entity(&self, entity_type: EntityType) -> Arc<EntityLocal> {
        let mut next = self.next_entity_id.lock();
        let entity = EntityLocal::new(self.address.clone(), vec![*next], entity_type);
        *next += 1;
        self.entities.lock().push(entity.clone());
        entity
    }

    pub fn entities(&self) -> Vec<Arc<EntityLocal>> {
        self.entities.lock().clone()
    }

    pub fn entity(&self, address: &EntityAddress) -> Option<Arc<EntityLocal>> {
        self.entities
            .lock()
            .iter()
            .find(|e| e.address() == address)
            .cloned()
    }

    pub fn feature_by_address(&self, address: &FeatureAddress) -> Option<Arc<FeatureLocal>> {
        if let Some(device) = &address.device {
            if device != &self.address {
                return None;
            }
        }
        self.entity(&address.entity)
            .and_then(|entity| entity.feature(address.feature?))
    }

    /// The mandatory special feature on entity 0.
    pub fn node_management(&self) -> Arc<FeatureLocal> {
        self.entity(&vec![DEVICE_INFORMATION_ENTITY_ID])
            .and_then(|entity| entity.feature(0))
            .expect("entity 0 always carries the NodeManagement feature")
    }

    /// Attach a remote device for a completed SHIP connection and kick off
    /// detailed discovery of its tree.
    pub fn add_remote_device(
        self: &Arc<Self>,
        ski: impl Into<String>,
        sink: Arc<dyn SpineDataSink>,
    ) -> Arc<DeviceRemote> {
        let ski = ski.into();
        let remote = DeviceRemote::new(ski.clone(), sink, self.pending.clone());
        self.remote_devices
            .lock()
            .insert(ski.clone(), remote.clone());

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(self.pending.spawn_sweeper());
        }
        drop(sweeper);

        let node_management = self.node_management();
        let cmd = Cmd::read(Function::NodeManagementDetailedDiscoveryData);
        match remote.sender().request_with_reply(
            node_management.address().clone(),
            remote.node_management().address().clone(),
            cmd,
            DEFAULT_MAX_RESPONSE_DELAY,
        ) {
            // The reply materializes the tree through the router; nobody
            // needs to await it here.
            Ok((counter, _reply)) => debug!(ski = %ski, %counter, "requested detailed discovery"),
            Err(e) => warn!(ski = %ski, error = %e, "failed to request detailed discovery"),
        }

        remote
    }

    /// Tear down a remote device: stop its heartbeat, drain its pending
    /// requests, drop its subscriptions and bindings.
    pub fn remove_remote_device(&self, ski: &str) {
        if let Some(remote) = self.remote_devices.lock().remove(ski) {
            remote.close();
        }
        self.pending.drain_device(ski);
        self.subscriptions.remove_device(ski);
        self.bindings.remove_device(ski);
    }

    pub fn remote_device(&self, ski: &str) -> Option<Arc<DeviceRemote>> {
        self.remote_devices.lock().get(ski).cloned()
    }

    /// This device's destination record, served on destination-list reads.
    pub fn destination_data(&self) -> NodeManagementDestinationData {
        NodeManagementDestinationData {
            device_description: Some(self.device_description()),
        }
    }

    fn device_description(&self) -> NetworkManagementDeviceDescriptionData {
        NetworkManagementDeviceDescriptionData {
            device_address: Some(DeviceAddressEnvelope {
                device: Some(self.address.clone()),
            }),
            device_type: Some(self.device_type),
            network_feature_set: Some(self.feature_set),
            description: None,
        }
    }

    /// The full discovery record of the local tree.
    pub fn detailed_discovery_data(&self) -> NodeManagementDetailedDiscoveryData {
        let entities = self.entities.lock().clone();
        let mut entity_information = Vec::new();
        let mut feature_information = Vec::new();
        for entity in &entities {
            entity_information.push(NodeManagementDetailedDiscoveryEntityInformation {
                description: Some(entity.description_data()),
            });
            for feature in entity.features() {
                feature_information.push(NodeManagementDetailedDiscoveryFeatureInformation {
                    description: Some(feature.description_data()),
                });
            }
        }
        NodeManagementDetailedDiscoveryData {
            specification_version_list: None,
            device_information: Some(NodeManagementDetailedDiscoveryDeviceInformation {
                description: Some(self.device_description()),
            }),
            entity_information,
            feature_information,
        }
    }

    pub fn use_case_information(&self) -> NodeManagementUseCaseData {
        self.use_cases.lock().use_case_information()
    }

    /// Entry point for decoded SPINE payload bytes from a SHIP connection.
    pub fn process_spine_message(
        self: &Arc<Self>,
        message: &[u8],
        remote: &Arc<DeviceRemote>,
    ) -> Result<(), SpineError> {
        let envelope: Envelope = serde_json::from_slice(message)?;
        self.process_datagram(envelope.datagram.header, envelope.datagram.payload.cmd, remote)
    }

    /// Route one datagram to the feature and handler its header names.
    fn process_datagram(
        self: &Arc<Self>,
        header: Header,
        cmds: Vec<Cmd>,
        remote: &Arc<DeviceRemote>,
    ) -> Result<(), SpineError> {
        let classifier = header
            .cmd_classifier
            .ok_or_else(|| SpineError::InvalidDatagram("missing cmdClassifier".into()))?;
        let cmd = cmds
            .into_iter()
            .next()
            .ok_or_else(|| SpineError::InvalidDatagram("empty cmd container".into()))?;

        let filters = cmd.filter.clone();
        let (filter_partial, filter_delete) = partition_filters(&filters);

        match classifier {
            CmdClassifier::Read => {
                let function = cmd
                    .data_function()
                    .ok_or_else(|| SpineError::InvalidDatagram("read names no function".into()))?;
                self.handle_read(&header, function, remote)
            }
            CmdClassifier::Reply => {
                let data = cmd
                    .clone()
                    .extract()
                    .ok_or_else(|| SpineError::InvalidDatagram("reply carries no data".into()))?;
                self.correlate(&header, cmd, remote);
                self.route_incoming_data(&header, data, filter_partial, filter_delete, remote)
            }
            CmdClassifier::Notify => {
                let data = cmd
                    .extract()
                    .ok_or_else(|| SpineError::InvalidDatagram("notify carries no data".into()))?;
                let result =
                    self.route_incoming_data(&header, data, filter_partial, filter_delete, remote);
                if result.is_ok() {
                    self.acknowledge(&header, remote);
                }
                result
            }
            CmdClassifier::Result => {
                let data = cmd
                    .clone()
                    .extract()
                    .ok_or_else(|| SpineError::InvalidDatagram("result carries no data".into()))?;
                self.handle_result(&header, cmd, data, remote);
                Ok(())
            }
            CmdClassifier::Write => {
                let data = cmd
                    .extract()
                    .ok_or_else(|| SpineError::InvalidDatagram("write carries no data".into()))?;
                self.handle_write(&header, data, filter_partial, filter_delete, remote)
            }
            CmdClassifier::Call => {
                let data = cmd
                    .extract()
                    .ok_or_else(|| SpineError::InvalidDatagram("call carries no data".into()))?;
                nodemanagement::handle_call(self, remote, &header, data)
            }
        }
    }

    /// Serve a read from the addressed local feature.
    fn handle_read(
        self: &Arc<Self>,
        header: &Header,
        function: Function,
        remote: &Arc<DeviceRemote>,
    ) -> Result<(), SpineError> {
        if function.is_node_management() {
            return nodemanagement::handle_read(self, remote, header, function);
        }

        let destination = header
            .address_destination
            .as_ref()
            .ok_or_else(|| SpineError::InvalidDatagram("read has no destination".into()))?;
        let feature = self.feature_by_address(destination).ok_or_else(|| {
            SpineError::InvalidDatagram(format!("unknown destination feature {destination}"))
        })?;

        match feature.data(function) {
            Ok(data) => {
                remote
                    .sender()
                    .reply(header, feature.address().clone(), data)?;
            }
            Err(SpineError::DataNotAvailable { .. }) => {
                remote.sender().result(
                    header,
                    feature.address().clone(),
                    ResultData::error(1, format!("no data for {function}")),
                )?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Remove the correlation entry a reply references. Unknown references
    /// are logged and tolerated.
    fn correlate(&self, header: &Header, cmd: Cmd, remote: &Arc<DeviceRemote>) {
        let Some(reference) = header.msg_counter_reference else {
            debug!(ski = remote.ski(), "reply without msgCounterReference");
            return;
        };
        if remote.is_heartbeat_counter(reference) {
            return;
        }
        let reply = ReplyMessage {
            header: header.clone(),
            cmd,
        };
        if !self.pending.complete(remote.ski(), reference, reply) {
            debug!(ski = remote.ski(), %reference, "reply for unknown request");
        }
    }

    /// Store reply/notify data at the feature the source address names.
    fn route_incoming_data(
        self: &Arc<Self>,
        header: &Header,
        data: CmdData,
        filter_partial: Option<&Filter>,
        filter_delete: Option<&Filter>,
        remote: &Arc<DeviceRemote>,
    ) -> Result<(), SpineError> {
        if let CmdData::NodeManagementDetailedDiscoveryData(discovery) = data {
            return nodemanagement::handle_discovery_data(remote, discovery);
        }
        if data.function().is_node_management() {
            debug!(function = %data.function(), "ignoring unhandled NodeManagement payload");
            return Ok(());
        }

        let source = header
            .address_source
            .as_ref()
            .ok_or_else(|| SpineError::InvalidDatagram("data has no source address".into()))?;
        match remote.feature_by_address(source) {
            Some(feature) => feature.update_data(data, filter_partial, filter_delete),
            None => {
                debug!(ski = remote.ski(), %source, "data from undiscovered feature");
                Ok(())
            }
        }
    }

    /// A `result` either answers one of our requests or acks a heartbeat.
    fn handle_result(&self, header: &Header, cmd: Cmd, data: CmdData, remote: &Arc<DeviceRemote>) {
        let CmdData::ResultData(result) = data else {
            debug!("result datagram without resultData");
            return;
        };

        let Some(reference) = header.msg_counter_reference else {
            debug!(ski = remote.ski(), "result without msgCounterReference");
            return;
        };
        if remote.is_heartbeat_counter(reference) {
            return;
        }

        let completed = if result.is_success() {
            self.pending.complete(
                remote.ski(),
                reference,
                ReplyMessage {
                    header: header.clone(),
                    cmd,
                },
            )
        } else {
            self.pending.fail(
                remote.ski(),
                reference,
                SpineError::RemoteError {
                    error_number: result.error_number.unwrap_or(0),
                    description: result.description.clone(),
                },
            )
        };
        if !completed {
            debug!(ski = remote.ski(), %reference, "result for unknown request");
        }
    }

    /// Apply a peer's write to the addressed local server feature.
    fn handle_write(
        self: &Arc<Self>,
        header: &Header,
        data: CmdData,
        filter_partial: Option<&Filter>,
        filter_delete: Option<&Filter>,
        remote: &Arc<DeviceRemote>,
    ) -> Result<(), SpineError> {
        let destination = header
            .address_destination
            .as_ref()
            .ok_or_else(|| SpineError::InvalidDatagram("write has no destination".into()))?;
        let source = header
            .address_source
            .as_ref()
            .ok_or_else(|| SpineError::InvalidDatagram("write has no source".into()))?;
        let feature = self.feature_by_address(destination).ok_or_else(|| {
            SpineError::InvalidDatagram(format!("unknown destination feature {destination}"))
        })?;

        if !self.bindings.has_binding(remote.ski(), source, destination) {
            remote.sender().result(
                header,
                feature.address().clone(),
                ResultData::error(2, "write requires a binding"),
            )?;
            return Ok(());
        }

        let function = data.function();
        feature.update_data(data.clone(), filter_partial, filter_delete)?;
        feature.invoke_write_handler(function, header, &data);
        self.acknowledge(header, remote);
        Ok(())
    }

    /// Send a success result when the peer asked for an ack.
    fn acknowledge(&self, header: &Header, remote: &Arc<DeviceRemote>) {
        if header.ack_request != Some(true) {
            return;
        }
        let Some(destination) = header.address_destination.clone() else {
            return;
        };
        if let Err(e) = remote
            .sender()
            .result(header, destination, ResultData::success())
        {
            debug!(error = %e, "failed to send ack");
        }
    }
}

/// A remote device, one per SHIP connection.
pub struct DeviceRemote {
    ski: String,
    address: Mutex<Option<DeviceAddress>>,
    device_type: Mutex<Option<DeviceType>>,
    feature_set: Mutex<Option<NetworkFeatureSet>>,
    entities: Mutex<Vec<Arc<EntityRemote>>>,
    sender: Sender,
    heartbeat: HeartbeatSender,
}

impl DeviceRemote {
    pub fn new(
        ski: String,
        sink: Arc<dyn SpineDataSink>,
        pending: Arc<PendingRequests>,
    ) -> Arc<Self> {
        let sender = Sender::new(ski.clone(), sink, pending);
        let device = Arc::new(Self {
            ski,
            address: Mutex::new(None),
            device_type: Mutex::new(None),
            feature_set: Mutex::new(None),
            entities: Mutex::new(Vec::new()),
            sender,
            heartbeat: HeartbeatSender::new(),
        });

        // Until discovery says otherwise, the peer is assumed to carry the
        // mandatory NodeManagement feature on entity 0.
        let device_information = EntityRemote::new(
            None,
            vec![DEVICE_INFORMATION_ENTITY_ID],
            EntityType::DeviceInformation,
            device.sender.clone(),
        );
        let index = device_information.next_feature_id();
        device_information.add_feature(index, FeatureType::NodeManagement, Role::Special);
        device.entities.lock().push(device_information);

        device
    }

    pub fn ski(&self) -> &str {
        &self.ski
    }

    pub fn address(&self) -> Option<DeviceAddress> {
        self.address.lock().clone()
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        *self.device_type.lock()
    }

    pub fn feature_set(&self) -> Option<NetworkFeatureSet> {
        *self.feature_set.lock()
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn entities(&self) -> Vec<Arc<EntityRemote>> {
        self.entities.lock().clone()
    }

    pub fn entity(&self, address: &EntityAddress) -> Option<Arc<EntityRemote>> {
        self.entities
            .lock()
            .iter()
            .find(|e| e.address() == address)
            .cloned()
    }

    pub fn feature_by_address(&self, address: &FeatureAddress) -> Option<Arc<FeatureRemote>> {
        self.entity(&address.entity)
            .and_then(|entity| entity.feature(address.feature?))
    }

    /// The peer's NodeManagement feature.
    pub fn node_management(&self) -> Arc<FeatureRemote> {
        self.entity(&vec![DEVICE_INFORMATION_ENTITY_ID])
            .and_then(|entity| entity.feature(0))
            .expect("entity 0 always carries the NodeManagement feature")
    }

    /// Apply the device part of a discovery record.
    pub fn update_device(&self, description: &NetworkManagementDeviceDescriptionData) {
        if let Some(address) = description
            .device_address
            .as_ref()
            .and_then(|a| a.device.clone())
        {
            *self.address.lock() = Some(address);
        }
        if let Some(device_type) = description.device_type {
            *self.device_type.lock() = Some(device_type);
        }
        if let Some(feature_set) = description.network_feature_set {
            *self.feature_set.lock() = Some(feature_set);
        }
    }

    pub(crate) fn add_entity(&self, entity: Arc<EntityRemote>) {
        self.entities.lock().push(entity);
    }

    pub(crate) fn remove_entity(&self, address: &EntityAddress) {
        self.entities.lock().retain(|e| e.address() != address);
    }

    /// Start pushing heartbeats to a subscriber.
    pub fn start_heartbeat(&self, source: FeatureAddress, destination: FeatureAddress) {
        self.heartbeat.start(self.sender.clone(), source, destination);
    }

    pub fn stop_heartbeat(&self) {
        self.heartbeat.stop();
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    pub fn is_heartbeat_counter(&self, counter: crate::model::MsgCounter) -> bool {
        self.heartbeat.is_heartbeat_counter(counter)
    }

    /// Connection closed: stop supervised work owned by this device.
    pub fn close(&self) {
        self.heartbeat.stop();
    }
}
