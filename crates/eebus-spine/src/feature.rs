//! Local and remote features.
//!
//! A feature is the addressable unit of function on an entity. Local
//! features serve reads/writes from their own data store; remote features
//! mirror the peer's advertised operations and cache received data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::SpineError;
use crate::function_data::FunctionDataStore;
use crate::model::nodemanagement::{
    BindingManagementRequestCall, FunctionProperty, NetworkManagementFeatureDescriptionData,
    NodeManagementBindingRequestCall, NodeManagementSubscriptionDeleteCall,
    NodeManagementSubscriptionRequestCall, PossibleOperations, PossibleOperationsRead,
    PossibleOperationsWrite, SubscriptionManagementDeleteCall, SubscriptionManagementRequestCall,
};
use crate::model::{
    Cmd, CmdClassifier, CmdData, FeatureAddress, FeatureType, Filter, Function, Header,
    MsgCounter, Role,
};
use crate::sender::ReplyFuture;

/// Fallback when a feature does not advertise `maxResponseDelay`.
pub const DEFAULT_MAX_RESPONSE_DELAY: Duration = Duration::from_secs(10);

/// Which access a function supports on a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operations {
    pub read: bool,
    pub write: bool,
}

impl Operations {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    pub fn to_possible_operations(self) -> PossibleOperations {
        PossibleOperations {
            read: self.read.then_some(PossibleOperationsRead::default()),
            write: self.write.then_some(PossibleOperationsWrite::default()),
        }
    }
}

impl From<&PossibleOperations> for Operations {
    fn from(ops: &PossibleOperations) -> Self {
        Self {
            read: ops.read.is_some(),
            write: ops.write.is_some(),
        }
    }
}

/// Handler invoked when a peer writes to a local server feature.
pub type WriteHandler = Box<dyn Fn(&Header, &CmdData) + Send + Sync>;

/// A feature of the local device.
pub struct FeatureLocal {
    address: FeatureAddress,
    feature_type: FeatureType,
    role: Role,
    description: Mutex<Option<String>>,
    operations: Mutex<HashMap<Function, Operations>>,
    data: Mutex<FunctionDataStore>,
    write_handlers: Mutex<HashMap<Function, WriteHandler>>,
}

impl FeatureLocal {
    pub fn new(address: FeatureAddress, feature_type: FeatureType, role: Role) -> Arc<Self> {
        Arc::new(Self {
            address,
            feature_type,
            role,
            description: Mutex::new(None),
            operations: Mutex::new(HashMap::new()),
            data: Mutex::new(FunctionDataStore::new()),
            write_handlers: Mutex::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> &FeatureAddress {
        &self.address
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = Some(description.into());
    }

    /// Declare a function this feature serves.
    pub fn add_function(&self, function: Function, operations: Operations) {
        self.operations.lock().insert(function, operations);
    }

    pub fn operations(&self, function: Function) -> Option<Operations> {
        self.operations.lock().get(&function).copied()
    }

    /// Store data to be served for `function`.
    pub fn set_data(&self, data: CmdData) {
        self.data.lock().set(data);
    }

    pub fn data(&self, function: Function) -> Result<CmdData, SpineError> {
        self.data.lock().data(function)
    }

    /// Apply a peer's write.
    pub(crate) fn update_data(
        &self,
        data: CmdData,
        filter_partial: Option<&Filter>,
        filter_delete: Option<&Filter>,
    ) -> Result<(), SpineError> {
        self.data.lock().update(data, filter_partial, filter_delete)
    }

    /// Register a callback fired after a peer's write is stored.
    pub fn set_write_handler(&self, function: Function, handler: WriteHandler) {
        self.write_handlers.lock().insert(function, handler);
    }

    pub(crate) fn invoke_write_handler(&self, function: Function, header: &Header, data: &CmdData) {
        if let Some(handler) = self.write_handlers.lock().get(&function) {
            handler(header, data);
        }
    }

    /// Request data from a remote server feature. Fails before any bytes
    /// are sent when the peer does not advertise the read operation.
    pub fn request_data(
        &self,
        function: Function,
        filter_partial: Option<Filter>,
        filter_delete: Option<Filter>,
        remote: &FeatureRemote,
    ) -> Result<(MsgCounter, ReplyFuture), SpineError> {
        if !remote.operations(function).is_some_and(|ops| ops.read) {
            return Err(SpineError::OperationNotSupported {
                function,
                operation: "read",
            });
        }

        let cmd = Cmd::read_with_filters(function, filter_partial, filter_delete);
        remote.sender().request_with_reply(
            self.address.clone(),
            remote.address().clone(),
            cmd,
            remote.max_response_delay(),
        )
    }

    /// Write data to a remote server feature.
    pub fn write_data(
        &self,
        data: CmdData,
        remote: &FeatureRemote,
    ) -> Result<MsgCounter, SpineError> {
        let function = data.function();
        if !remote.operations(function).is_some_and(|ops| ops.write) {
            return Err(SpineError::OperationNotSupported {
                function,
                operation: "write",
            });
        }
        remote.sender().request(
            CmdClassifier::Write,
            self.address.clone(),
            remote.address().clone(),
            true,
            data.into(),
        )
    }

    /// Subscribe this client feature to a remote server feature. Issued as
    /// a NodeManagement call to the peer's entity-0 special feature.
    pub fn subscribe_to(&self, remote: &FeatureRemote) -> Result<MsgCounter, SpineError> {
        let call = NodeManagementSubscriptionRequestCall {
            subscription_request: Some(SubscriptionManagementRequestCall {
                client_address: Some(self.address.clone()),
                server_address: Some(remote.address().clone()),
                server_feature_type: Some(remote.feature_type()),
            }),
        };
        remote.sender().request(
            CmdClassifier::Call,
            self.address.clone(),
            remote.node_management_address(),
            true,
            CmdData::NodeManagementSubscriptionRequestCall(call).into(),
        )
    }

    /// Drop a subscription previously established with
    /// [`subscribe_to`](Self::subscribe_to).
    pub fn unsubscribe_from(&self, remote: &FeatureRemote) -> Result<MsgCounter, SpineError> {
        let call = NodeManagementSubscriptionDeleteCall {
            subscription_delete: Some(SubscriptionManagementDeleteCall {
                client_address: Some(self.address.clone()),
                server_address: Some(remote.address().clone()),
            }),
        };
        remote.sender().request(
            CmdClassifier::Call,
            self.address.clone(),
            remote.node_management_address(),
            true,
            CmdData::NodeManagementSubscriptionDeleteCall(call).into(),
        )
    }

    /// Bind this client feature to a remote server feature.
    pub fn bind_to(&self, remote: &FeatureRemote) -> Result<MsgCounter, SpineError> {
        let call = NodeManagementBindingRequestCall {
            binding_request: Some(BindingManagementRequestCall {
                client_address: Some(self.address.clone()),
                server_address: Some(remote.address().clone()),
                server_feature_type: Some(remote.feature_type()),
            }),
        };
        remote.sender().request(
            CmdClassifier::Call,
            self.address.clone(),
            remote.node_management_address(),
            true,
            CmdData::NodeManagementBindingRequestCall(call).into(),
        )
    }

    /// This feature's entry in a detailed-discovery record.
    pub(crate) fn description_data(&self) -> NetworkManagementFeatureDescriptionData {
        let supported_function = self
            .operations
            .lock()
            .iter()
            .map(|(function, ops)| FunctionProperty {
                function: Some(*function),
                possible_operations: Some(ops.to_possible_operations()),
            })
            .collect();
        NetworkManagementFeatureDescriptionData {
            feature_address: Some(self.address.clone()),
            feature_type: Some(self.feature_type),
            role: Some(self.role),
            supported_function,
            description: self.description.lock().clone(),
            max_response_delay: None,
        }
    }
}

/// A feature of a remote device, materialized from detailed discovery.
pub struct FeatureRemote {
    address: FeatureAddress,
    feature_type: FeatureType,
    role: Role,
    description: Mutex<Option<String>>,
    operations: Mutex<HashMap<Function, Operations>>,
    data: Mutex<FunctionDataStore>,
    max_response_delay: Mutex<Option<Duration>>,
    sender: crate::sender::Sender,
}

impl FeatureRemote {
    pub fn new(
        address: FeatureAddress,
        feature_type: FeatureType,
        role: Role,
        sender: crate::sender::Sender,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            feature_type,
            role,
            description: Mutex::new(None),
            operations: Mutex::new(HashMap::new()),
            data: Mutex::new(FunctionDataStore::new()),
            max_response_delay: Mutex::new(None),
            sender,
        })
    }

    pub fn address(&self) -> &FeatureAddress {
        &self.address
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn sender(&self) -> &crate::sender::Sender {
        &self.sender
    }

    /// Address of the peer's NodeManagement feature (entity 0, feature 0).
    pub fn node_management_address(&self) -> FeatureAddress {
        FeatureAddress::new(self.address.device.clone(), vec![0], 0)
    }

    pub fn set_description(&self, description: Option<String>) {
        *self.description.lock() = description;
    }

    /// Replace the operations map from a discovery record.
    pub fn set_operations(&self, functions: &[FunctionProperty]) {
        let mut operations = self.operations.lock();
        operations.clear();
        for property in functions {
            let (Some(function), Some(possible)) =
                (property.function, property.possible_operations.as_ref())
            else {
                continue;
            };
            operations.insert(function, Operations::from(possible));
        }
    }

    pub fn operations(&self, function: Function) -> Option<Operations> {
        self.operations.lock().get(&function).copied()
    }

    /// Parse and store the advertised `maxResponseDelay`.
    pub fn set_max_response_delay(&self, delay: Option<&str>) {
        if let Some(text) = delay {
            if let Some(duration) = parse_iso8601_duration(text) {
                *self.max_response_delay.lock() = Some(duration);
            } else {
                tracing::debug!(delay = text, "unparseable maxResponseDelay, keeping default");
            }
        }
    }

    pub fn max_response_delay(&self) -> Duration {
        self.max_response_delay
            .lock()
            .unwrap_or(DEFAULT_MAX_RESPONSE_DELAY)
    }

    pub fn data(&self, function: Function) -> Result<CmdData, SpineError> {
        self.data.lock().data(function)
    }

    /// Merge received data into the store (reply/notify path).
    pub(crate) fn update_data(
        &self,
        data: CmdData,
        filter_partial: Option<&Filter>,
        filter_delete: Option<&Filter>,
    ) -> Result<(), SpineError> {
        self.data.lock().update(data, filter_partial, filter_delete)
    }
}

/// Parse the ISO-8601 duration subset used by `maxResponseDelay`
/// (`PT10S`, `PT1M30S`, `P1DT2H`, fractional seconds allowed).
fn parse_iso8601_duration(text: &str) -> Option<Duration> {
    let rest = text.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds = 0f64;
    let mut parse_part = |part: &str, units: &[(char, f64)]| -> Option<()> {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
            } else {
                let factor = units.iter().find(|(u, _)| *u == c)?.1;
                seconds += number.parse::<f64>().ok()? * factor;
                number.clear();
            }
        }
        number.is_empty().then_some(())
    };

    parse_part(date_part, &[('D', 86_400.0)])?;
    parse_part(time_part, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
    Some(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_durations() {
        assert_eq!(
            parse_iso8601_duration("PT10S"),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            parse_iso8601_duration("PT1M30S"),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            parse_iso8601_duration("P1DT2H"),
            Some(Duration::from_secs(86_400 + 7_200))
        );
        assert_eq!(
            parse_iso8601_duration("PT0.5S"),
            Some(Duration::from_millis(500))
        );
        assert_eq!(parse_iso8601_duration("10S"), None);
        assert_eq!(parse_iso8601_duration("PT10X"), None);
    }

    #[test]
    fn operations_from_discovery() {
        let possible = PossibleOperations {
            read: Some(PossibleOperationsRead::default()),
            write: None,
        };
        let ops = Operations::from(&possible);
        assert!(ops.read);
        assert!(!ops.write);
    }
}
