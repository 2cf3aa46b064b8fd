//! SHIP connection engine.
//!
//! A state machine layered on a TLS-secured WebSocket (injected as a
//! [`MessageTransport`]): the multi-phase handshake, framing and
//! multiplexing of application payloads, and graceful close with
//! announce/confirm semantics. Completed connections hand their SPINE
//! payloads to an [`eebus_spine::DeviceLocal`] router.

pub mod codec;
pub mod model;

mod connection;
mod handshake;
mod transport;

#[cfg(test)]
mod tests;

pub use connection::{Role, ShipConnection, ShipConnectionHandle, ShipError};
pub use handshake::{ShipState, TimerMode, CMI_TIMEOUT, HELLO_PENDING_WAITING_MS, T_HELLO_INIT};
pub use transport::{normalize_ski, MessageTransport, ServiceDataProvider};
