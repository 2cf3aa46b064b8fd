//! Local and remote entities: ordered feature sets below a device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::feature::{FeatureLocal, FeatureRemote};
use crate::model::nodemanagement::{EntityAddressEnvelope, NetworkManagementEntityDescriptionData};
use crate::model::{DeviceAddress, EntityAddress, EntityType, FeatureAddress, FeatureType, Role};
use crate::sender::Sender;

/// An entity of the local device.
pub struct EntityLocal {
    device_address: DeviceAddress,
    address: EntityAddress,
    entity_type: EntityType,
    description: Mutex<Option<String>>,
    features: Mutex<Vec<Arc<FeatureLocal>>>,
    next_feature_id: AtomicU32,
}

impl EntityLocal {
    pub fn new(
        device_address: DeviceAddress,
        address: EntityAddress,
        entity_type: EntityType,
    ) -> Arc<Self> {
        Arc::new(Self {
            device_address,
            address,
            entity_type,
            description: Mutex::new(None),
            features: Mutex::new(Vec::new()),
            next_feature_id: AtomicU32::new(0),
        })
    }

    pub fn address(&self) -> &EntityAddress {
        &self.address
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = Some(description.into());
    }

    /// Allocate the next feature index. Indices are never recycled.
    pub fn next_feature_id(&self) -> u32 {
        self.next_feature_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create and attach a feature with the next free index.
    pub fn add_feature(&self, feature_type: FeatureType, role: Role) -> Arc<FeatureLocal> {
        let address = FeatureAddress::new(
            Some(self.device_address.clone()),
            self.address.clone(),
            self.next_feature_id(),
        );
        let feature = FeatureLocal::new(address, feature_type, role);
        self.features.lock().push(feature.clone());
        feature
    }

    pub fn features(&self) -> Vec<Arc<FeatureLocal>> {
        self.features.lock().clone()
    }

    pub fn feature(&self, index: u32) -> Option<Arc<FeatureLocal>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.address().feature == Some(index))
            .cloned()
    }

    /// First feature with the given type and role.
    pub fn feature_of_type(&self, feature_type: FeatureType, role: Role) -> Option<Arc<FeatureLocal>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.feature_type() == feature_type && f.role() == role)
            .cloned()
    }

    pub(crate) fn description_data(&self) -> NetworkManagementEntityDescriptionData {
        NetworkManagementEntityDescriptionData {
            entity_address: Some(EntityAddressEnvelope {
                device: Some(self.device_address.clone()),
                entity: self.address.clone(),
            }),
            entity_type: Some(self.entity_type),
            last_state_change: None,
            description: self.description.lock().clone(),
        }
    }
}

/// An entity of a remote device.
pub struct EntityRemote {
    device_address: Mutex<Option<DeviceAddress>>,
    address: EntityAddress,
    entity_type: EntityType,
    description: Mutex<Option<String>>,
    features: Mutex<Vec<Arc<FeatureRemote>>>,
    next_feature_id: AtomicU32,
    sender: Sender,
}

impl EntityRemote {
    pub fn new(
        device_address: Option<DeviceAddress>,
        address: EntityAddress,
        entity_type: EntityType,
        sender: Sender,
    ) -> Arc<Self> {
        Arc::new(Self {
            device_address: Mutex::new(device_address),
            address,
            entity_type,
            description: Mutex::new(None),
            features: Mutex::new(Vec::new()),
            next_feature_id: AtomicU32::new(0),
            sender,
        })
    }

    pub fn address(&self) -> &EntityAddress {
        &self.address
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn set_description(&self, description: Option<String>) {
        *self.description.lock() = description;
    }

    pub fn device_address(&self) -> Option<DeviceAddress> {
        self.device_address.lock().clone()
    }

    pub fn next_feature_id(&self) -> u32 {
        self.next_feature_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a feature at a peer-assigned index.
    pub fn add_feature(
        &self,
        index: u32,
        feature_type: FeatureType,
        role: Role,
    ) -> Arc<FeatureRemote> {
        let address = FeatureAddress::new(
            self.device_address.lock().clone(),
            self.address.clone(),
            index,
        );
        let feature = FeatureRemote::new(address, feature_type, role, self.sender.clone());
        self.features.lock().push(feature.clone());
        feature
    }

    /// Drop every feature; discovery replies rebuild the set wholesale.
    pub fn remove_all_features(&self) {
        self.features.lock().clear();
    }

    pub fn features(&self) -> Vec<Arc<FeatureRemote>> {
        self.features.lock().clone()
    }

    pub fn feature(&self, index: u32) -> Option<Arc<FeatureRemote>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.address().feature == Some(index))
            .cloned()
    }

    pub fn feature_of_type(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<FeatureRemote>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.feature_type() == feature_type && f.role() == role)
            .cloned()
    }
}
