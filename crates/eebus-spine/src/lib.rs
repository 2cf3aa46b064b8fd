//! SPINE message router.
//!
//! Owns the local device's entity/feature tree, materializes one remote
//! device per SHIP connection via detailed discovery, decodes and routes
//! command datagrams, correlates requests with replies by message counter,
//! and pushes heartbeats to subscribed peers.
//!
//! The SHIP layer feeds decoded payload bytes into
//! [`DeviceLocal::process_spine_message`] and implements [`SpineDataSink`]
//! for the outbound direction. No network I/O happens here.

pub mod model;

mod device;
mod entity;
mod error;
mod feature;
mod function_data;
mod heartbeat;
mod nodemanagement;
mod pending;
mod sender;
mod subscription;
mod usecase;

pub use device::{DeviceConfig, DeviceLocal, DeviceRemote, DEVICE_INFORMATION_ENTITY_ID};
pub use entity::{EntityLocal, EntityRemote};
pub use error::SpineError;
pub use feature::{
    FeatureLocal, FeatureRemote, Operations, WriteHandler, DEFAULT_MAX_RESPONSE_DELAY,
};
pub use function_data::FunctionDataStore;
pub use heartbeat::{HeartbeatSender, HEARTBEAT_INTERVAL};
pub use pending::{PendingRequests, ReplyMessage};
pub use sender::{ReplyFuture, Sender, SpineDataSink};
pub use subscription::{BindingManager, SubscriptionManager};
pub use usecase::UseCaseManager;
