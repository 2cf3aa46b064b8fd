//! SPINE wire model: datagram envelope, command container, function
//! payloads, filters, and the list-merge machinery.

mod cmd;
mod commondatatypes;
mod datagram;
mod filter;
mod types;
mod update;

pub mod deviceclassification;
pub mod deviceconfiguration;
pub mod devicediagnosis;
pub mod measurement;
pub mod nodemanagement;

pub use cmd::{Cmd, CmdData};
pub use commondatatypes::{ResultData, ScaledNumber, TimestampInterval};
pub use datagram::{
    CmdClassifier, Datagram, DeviceAddress, EntityAddress, Envelope, FeatureAddress, Header,
    MsgCounter, Payload, SPECIFICATION_VERSION,
};
pub use filter::{partition_filters, CmdControl, ElementTag, Filter};
pub use types::{
    DeviceType, EntityType, FeatureType, Function, NetworkFeatureSet, Role, UseCaseActor,
    UseCaseName,
};
pub use update::{update_list, FilterScope, ListElement, SelectorMatch};
