//! The SHIP connection actor.
//!
//! One actor per remote peer owns the transport and processes events in
//! FIFO order: inbound frames, commands from application handles, and the
//! handshake timer. All state transitions happen on this single task, so
//! the state machine itself needs no locks.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use eebus_spine::{DeviceLocal, DeviceRemote, SpineDataSink};

use crate::codec::{self, CodecError};
use crate::handshake::{HandshakeTimer, ShipState};
use crate::model::{
    ConnectionClose, ConnectionClosePhase, MessageType, ShipData,
};
use crate::transport::{MessageTransport, ServiceDataProvider};

/// Error terminating a SHIP connection.
#[derive(Debug)]
pub enum ShipError {
    /// Transport I/O failed.
    Io(std::io::Error),
    /// A frame could not be decoded.
    Codec(CodecError),
    /// The peer sent a message the current state does not allow, or a
    /// malformed handshake field.
    ProtocolViolation { context: String },
    /// No common protocol version or message format.
    VersionMismatch,
    /// A handshake timer expired.
    HandshakeTimeout,
    /// The transport closed while the connection was still in use.
    Closed,
}

impl std::fmt::Display for ShipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShipError::Io(e) => write!(f, "transport error: {e}"),
            ShipError::Codec(e) => write!(f, "codec error: {e}"),
            ShipError::ProtocolViolation { context } => {
                write!(f, "protocol violation: {context}")
            }
            ShipError::VersionMismatch => write!(f, "no common protocol version or format"),
            ShipError::HandshakeTimeout => write!(f, "handshake timer expired"),
            ShipError::Closed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for ShipError {}

impl From<std::io::Error> for ShipError {
    fn from(e: std::io::Error) -> Self {
        ShipError::Io(e)
    }
}

impl From<CodecError> for ShipError {
    fn from(e: CodecError) -> Self {
        ShipError::Codec(e)
    }
}

/// Which side of the TLS dial this connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

pub(crate) enum Command {
    SendSpine(Bytes),
    Close { reason: Option<String> },
    Trusted,
}

/// Cloneable handle into a running connection actor. Doubles as the SPINE
/// router's outbound byte sink.
#[derive(Clone)]
pub struct ShipConnectionHandle {
    ski: String,
    commands: mpsc::UnboundedSender<Command>,
    remote_ship_id: Arc<parking_lot::Mutex<Option<String>>>,
}

impl ShipConnectionHandle {
    pub fn ski(&self) -> &str {
        &self.ski
    }

    /// The ship-id the peer announced during the hello phase. `None` until
    /// the handshake completes. The hub persists the SKI ↔ ship-id pair.
    pub fn remote_ship_id(&self) -> Option<String> {
        self.remote_ship_id.lock().clone()
    }

    /// Ask the actor for a graceful close with announce/confirm semantics.
    /// Safe to call any number of times; shutdown runs once.
    pub fn close(&self, reason: Option<String>) {
        let _ = self.commands.send(Command::Close { reason });
    }

    /// Tell a connection stuck in the pending hello phase that the peer is
    /// now trusted.
    pub fn approve_trust(&self) {
        let _ = self.commands.send(Command::Trusted);
    }
}

impl SpineDataSink for ShipConnectionHandle {
    fn write_spine_message(&self, message: Bytes) {
        let _ = self.commands.send(Command::SendSpine(message));
    }
}

/// State machine and actor for one SHIP connection.
pub struct ShipConnection<T, P> {
    pub(crate) role: Role,
    pub(crate) local_ship_id: String,
    pub(crate) remote_ski: String,
    pub(crate) remote_ship_id: Option<String>,
    pub(crate) state: ShipState,
    pub(crate) transport: T,
    pub(crate) provider: Arc<P>,
    pub(crate) local_device: Arc<DeviceLocal>,
    pub(crate) remote_device: Option<Arc<DeviceRemote>>,
    pub(crate) timer: HandshakeTimer,
    pub(crate) remote_ready: bool,
    pub(crate) protocol_select_sent: bool,
    pub(crate) last_received_waiting: Option<u64>,
    pub(crate) handshake_completed: bool,
    handle: ShipConnectionHandle,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<T, P> ShipConnection<T, P>
where
    T: MessageTransport,
    P: ServiceDataProvider,
{
    /// Build a connection actor for an accepted or dialed transport.
    /// `remote_ski` is the normalized fingerprint from the peer's TLS
    /// certificate.
    pub fn new(
        role: Role,
        transport: T,
        provider: Arc<P>,
        local_device: Arc<DeviceLocal>,
        remote_ski: impl Into<String>,
    ) -> (Self, ShipConnectionHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let remote_ski = remote_ski.into();
        let handle = ShipConnectionHandle {
            ski: remote_ski.clone(),
            commands: commands_tx,
            remote_ship_id: Arc::new(parking_lot::Mutex::new(None)),
        };
        let local_ship_id = local_device.ship_identifier().to_string();
        let connection = Self {
            role,
            local_ship_id,
            remote_ski,
            remote_ship_id: None,
            state: ShipState::InitStart,
            transport,
            provider,
            local_device,
            remote_device: None,
            timer: HandshakeTimer::new(),
            remote_ready: false,
            protocol_select_sent: false,
            last_received_waiting: None,
            handshake_completed: false,
            handle: handle.clone(),
            commands: commands_rx,
        };
        (connection, handle)
    }

    pub fn handle(&self) -> ShipConnectionHandle {
        self.handle.clone()
    }

    pub(crate) fn publish_remote_ship_id(&self) {
        *self.handle.remote_ship_id.lock() = self.remote_ship_id.clone();
    }

    pub fn remote_ship_id(&self) -> Option<&str> {
        self.remote_ship_id.as_deref()
    }

    pub fn state(&self) -> ShipState {
        self.state
    }

    /// Drive the connection until it closes. Shutdown actions (transport
    /// close, remote-device teardown, hub notification) run exactly once,
    /// on every exit path.
    pub async fn run(mut self) -> Result<(), ShipError> {
        let result = self.run_inner().await;
        self.shutdown(&result).await;
        result
    }

    async fn run_inner(&mut self) -> Result<(), ShipError> {
        self.start_handshake().await?;

        loop {
            let deadline = self.timer.deadline();
            tokio::select! {
                message = self.transport.recv() => match message {
                    Ok(Some(bytes)) => {
                        if self.handle_message(&bytes).await? {
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        if self.state == ShipState::CloseAnnounce {
                            return Ok(());
                        }
                        return Err(ShipError::Closed);
                    }
                    Err(e) => return Err(ShipError::Io(e)),
                },
                command = self.commands.recv() => {
                    // The actor holds a handle itself, so the channel never
                    // yields None.
                    if let Some(command) = command {
                        if self.handle_command(command).await? {
                            return Ok(());
                        }
                    }
                }
                _ = sleep_until_or_forever(deadline) => {
                    if self.handle_timer_expired().await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<bool, ShipError> {
        match command {
            Command::SendSpine(message) => {
                self.send_spine(message).await?;
                Ok(false)
            }
            Command::Close { reason } => self.begin_close(reason).await,
            Command::Trusted => {
                self.handle_trust_granted().await?;
                Ok(false)
            }
        }
    }

    /// Route one inbound frame. Returns true when the connection finished
    /// cleanly.
    async fn handle_message(&mut self, message: &[u8]) -> Result<bool, ShipError> {
        match self.state {
            ShipState::Complete => self.handle_data_phase(message).await,
            ShipState::CloseAnnounce => self.handle_close_phase(message).await,
            _ => {
                self.handle_handshake_message(message).await?;
                Ok(false)
            }
        }
    }

    async fn handle_data_phase(&mut self, message: &[u8]) -> Result<bool, ShipError> {
        let (message_type, body) = codec::split_frame(message)?;
        match message_type {
            MessageType::Data => {
                self.handle_data_frame(message, body)?;
                Ok(false)
            }
            MessageType::End => {
                let close: ConnectionClose = serde_json::from_value(codec::decode_body(body)?)
                    .map_err(|e| CodecError::Json(e.to_string()))?;
                match close.connection_close.phase {
                    ConnectionClosePhase::Announce => {
                        info!(
                            ski = %self.remote_ski,
                            reason = ?close.connection_close.reason,
                            "peer announced connection close"
                        );
                        let confirm =
                            codec::encode_frame(MessageType::End, &ConnectionClose::confirm())?;
                        if let Err(e) = self.transport.send(confirm).await {
                            debug!(error = %e, "failed to send close confirm");
                        }
                        Ok(true)
                    }
                    ConnectionClosePhase::Confirm => {
                        debug!(ski = %self.remote_ski, "unexpected close confirm");
                        Ok(false)
                    }
                }
            }
            other => Err(ShipError::ProtocolViolation {
                context: format!("{other} frame during data exchange"),
            }),
        }
    }

    /// Fast path: SPINE datagrams are detected by the literal `datagram`
    /// before the frame is fully parsed.
    fn handle_data_frame(&mut self, raw: &[u8], body: &[u8]) -> Result<(), ShipError> {
        if !contains_datagram(raw) {
            debug!(ski = %self.remote_ski, "ignoring non-SPINE data frame");
            return Ok(());
        }

        let canonical = codec::decode_body(body)?;
        let data: ShipData = serde_json::from_value(canonical)
            .map_err(|e| CodecError::Json(e.to_string()))?;
        let payload = serde_json::to_vec(&data.data.payload)
            .map_err(|e| CodecError::Json(e.to_string()))?;

        let Some(remote) = &self.remote_device else {
            debug!(ski = %self.remote_ski, "data frame before remote device exists");
            return Ok(());
        };

        // Handler errors stay on this side of the connection.
        if let Err(e) = self.local_device.process_spine_message(&payload, remote) {
            warn!(ski = %self.remote_ski, error = %e, "spine message not processed");
        }
        Ok(())
    }

    async fn handle_close_phase(&mut self, message: &[u8]) -> Result<bool, ShipError> {
        let (message_type, body) = codec::split_frame(message)?;
        match message_type {
            MessageType::End => {
                let close: ConnectionClose = serde_json::from_value(codec::decode_body(body)?)
                    .map_err(|e| CodecError::Json(e.to_string()))?;
                match close.connection_close.phase {
                    // Simultaneous announce: answer it and close anyway.
                    ConnectionClosePhase::Announce => {
                        let confirm =
                            codec::encode_frame(MessageType::End, &ConnectionClose::confirm())?;
                        let _ = self.transport.send(confirm).await;
                        Ok(true)
                    }
                    ConnectionClosePhase::Confirm => Ok(true),
                }
            }
            // Data frames already in flight when we announced are dropped.
            MessageType::Data => Ok(false),
            other => Err(ShipError::ProtocolViolation {
                context: format!("{other} frame while awaiting close confirm"),
            }),
        }
    }

    async fn send_spine(&mut self, message: Bytes) -> Result<(), ShipError> {
        if self.state != ShipState::Complete {
            warn!(
                ski = %self.remote_ski,
                state = ?self.state,
                "dropping spine message outside data exchange"
            );
            return Ok(());
        }
        let frame = match codec::encode_spine_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(ski = %self.remote_ski, error = %e, "unencodable spine message");
                return Ok(());
            }
        };
        self.transport.send(frame).await?;
        Ok(())
    }

    /// Start a graceful close. Returns true when the actor can exit
    /// immediately (handshake never completed: drop the transport).
    async fn begin_close(&mut self, reason: Option<String>) -> Result<bool, ShipError> {
        match self.state {
            ShipState::Complete => {
                let announce =
                    codec::encode_frame(MessageType::End, &ConnectionClose::announce(reason))?;
                self.transport.send(announce).await?;
                self.state = ShipState::CloseAnnounce;
                self.timer
                    .start(crate::handshake::TimerMode::WaitForReady, CLOSE_CONFIRM_TIMEOUT);
                Ok(false)
            }
            ShipState::CloseAnnounce => Ok(false),
            _ => Ok(true),
        }
    }

    async fn handle_timer_expired(&mut self) -> Result<bool, ShipError> {
        if self.state == ShipState::CloseAnnounce {
            // The confirm is expected but not required.
            debug!(ski = %self.remote_ski, "closing without confirm");
            return Ok(true);
        }
        self.handle_handshake_timer().await?;
        Ok(false)
    }

    async fn shutdown(&mut self, result: &Result<(), ShipError>) {
        if let Err(e) = result {
            warn!(ski = %self.remote_ski, error = %e, "connection terminated");
        }
        self.timer.stop();
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "transport close failed");
        }
        if let Some(remote) = self.remote_device.take() {
            self.local_device.remove_remote_device(remote.ski());
        }
        self.provider
            .handle_connection_closed(&self.remote_ski, self.handshake_completed);
        self.state = ShipState::Closed;
    }
}

/// How long a close announce waits for the peer's confirm.
const CLOSE_CONFIRM_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

fn contains_datagram(message: &[u8]) -> bool {
    message
        .windows(b"datagram".len())
        .any(|window| window == b"datagram")
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
