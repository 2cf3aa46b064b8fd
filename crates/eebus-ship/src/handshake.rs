//! Handshake phases of the SHIP state machine.
//!
//! Transitions are monotone along the handshake sequence: init exchange,
//! hello (trust), protocol handshake, PIN check, access methods, data
//! exchange. Each waiting state accepts exactly one message kind; anything
//! else terminates the connection as a protocol violation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use eebus_spine::SpineDataSink;

use crate::codec;
use crate::connection::{Role, ShipConnection, ShipError};
use crate::model::{
    AccessMethods, AccessMethodsRequest, ConnectionHello, ConnectionHelloPhase,
    ConnectionHelloType, ConnectionPinState, ControlMessage, MessageProtocolHandshake,
    MessageProtocolHandshakeError, MessageProtocolHandshakeErrorType,
    MessageProtocolHandshakeType, MessageType, PinState, ProtocolHandshakeType,
    handshake_error, FORMAT_JSON_UTF8, SHIP_VERSION,
};
use crate::transport::{MessageTransport, ServiceDataProvider};

/// Timeout for the init exchange and the post-hello phases.
pub const CMI_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a ready side waits for the peer's ready during hello.
pub const T_HELLO_INIT: Duration = Duration::from_secs(60);

/// Waiting window advertised while our own trust decision is pending.
pub const HELLO_PENDING_WAITING_MS: u64 = 60_000;

/// A pending side re-requests prolongation this long before the window it
/// advertised runs out.
const PROLONGATION_MARGIN: Duration = Duration::from_secs(5);

/// States of the SHIP connection mode exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShipState {
    InitStart,
    ClientSend,
    ClientWait,
    ClientEvaluate,
    ServerWait,
    ServerEvaluate,
    Hello,
    HelloPending,
    ProtocolHandshake,
    PinStateCheck,
    PinOk,
    AccessMethodsRequest,
    AccessMethods,
    Complete,
    CloseAnnounce,
    Closed,
}

/// Logical mode of the single per-connection handshake timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// The peer must send READY (or request prolongation) before expiry.
    WaitForReady,
    /// We are pending and must request prolongation before the window we
    /// advertised to the peer runs out.
    SendProlongationRequest,
    /// Bounds the wait for the peer to answer a prolongation; equals the
    /// last `waiting` value the peer advertised.
    ProlongationRequestReply,
}

/// The single handshake timer. Starting it cancels any current timer.
pub(crate) struct HandshakeTimer {
    armed: Option<(TimerMode, Instant)>,
}

impl HandshakeTimer {
    pub(crate) fn new() -> Self {
        Self { armed: None }
    }

    pub(crate) fn start(&mut self, mode: TimerMode, duration: Duration) {
        self.armed = Some((mode, Instant::now() + duration));
    }

    pub(crate) fn stop(&mut self) {
        self.armed = None;
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.armed.map(|(_, deadline)| deadline)
    }

    pub(crate) fn mode(&self) -> Option<TimerMode> {
        self.armed.map(|(mode, _)| mode)
    }

    pub(crate) fn expire(&mut self) -> Option<TimerMode> {
        self.armed.take().map(|(mode, _)| mode)
    }
}

impl<T, P> ShipConnection<T, P>
where
    T: MessageTransport,
    P: ServiceDataProvider,
{
    /// Current timer state, for diagnostics and tests.
    pub fn handshake_timer(&self) -> Option<(TimerMode, Instant)> {
        self.timer.mode().zip(self.timer.deadline())
    }

    pub(crate) async fn start_handshake(&mut self) -> Result<(), ShipError> {
        match self.role {
            Role::Client => {
                self.state = ShipState::ClientSend;
                self.transport
                    .send(Bytes::from_static(&codec::INIT_FRAME))
                    .await?;
                self.state = ShipState::ClientWait;
            }
            Role::Server => {
                self.state = ShipState::ServerWait;
            }
        }
        self.timer.start(TimerMode::WaitForReady, CMI_TIMEOUT);
        Ok(())
    }

    pub(crate) async fn handle_handshake_message(
        &mut self,
        message: &[u8],
    ) -> Result<(), ShipError> {
        let (message_type, body) = codec::split_frame(message)?;

        match self.state {
            ShipState::ClientWait => {
                validate_init(message_type, body)?;
                self.state = ShipState::ClientEvaluate;
                self.enter_hello().await
            }
            ShipState::ServerWait => {
                validate_init(message_type, body)?;
                self.state = ShipState::ServerEvaluate;
                self.transport
                    .send(Bytes::from_static(&codec::INIT_FRAME))
                    .await?;
                self.enter_hello().await
            }
            ShipState::Hello | ShipState::HelloPending => {
                match self.control_message(message_type, body)? {
                    ControlMessage::Hello(hello) => {
                        self.handle_hello(hello.connection_hello).await
                    }
                    other => Err(self.unexpected(&other)),
                }
            }
            ShipState::ProtocolHandshake => match self.control_message(message_type, body)? {
                ControlMessage::ProtocolHandshake(handshake) => {
                    self.handle_protocol_handshake(handshake.message_protocol_handshake)
                        .await
                }
                ControlMessage::ProtocolHandshakeError(error) => {
                    debug!(
                        code = error.message_protocol_handshake_error.error,
                        "peer rejected protocol handshake"
                    );
                    Err(ShipError::VersionMismatch)
                }
                other => Err(self.unexpected(&other)),
            },
            ShipState::PinStateCheck => match self.control_message(message_type, body)? {
                ControlMessage::PinState(state) => {
                    self.handle_pin_state(state.connection_pin_state.pin_state)
                        .await
                }
                other => Err(self.unexpected(&other)),
            },
            ShipState::AccessMethodsRequest => match self.control_message(message_type, body)? {
                ControlMessage::AccessMethodsRequest(_) => {
                    self.send_control(&AccessMethods::with_id(self.local_ship_id.clone()))
                        .await?;
                    self.state = ShipState::AccessMethods;
                    Ok(())
                }
                other => Err(self.unexpected(&other)),
            },
            ShipState::AccessMethods => match self.control_message(message_type, body)? {
                ControlMessage::AccessMethods(methods) => {
                    self.remote_ship_id = methods.access_methods.id;
                    self.complete_handshake()
                }
                other => Err(self.unexpected(&other)),
            },
            state => Err(ShipError::ProtocolViolation {
                context: format!("{message_type} message in state {state:?}"),
            }),
        }
    }

    // -- hello phase --------------------------------------------------------

    async fn enter_hello(&mut self) -> Result<(), ShipError> {
        if self.provider.is_remote_trusted(&self.remote_ski) {
            self.send_control(&ConnectionHello::ready()).await?;
            self.state = ShipState::Hello;
            self.timer.start(TimerMode::WaitForReady, T_HELLO_INIT);
        } else {
            self.send_control(&ConnectionHello::pending(HELLO_PENDING_WAITING_MS, false))
                .await?;
            self.state = ShipState::HelloPending;
            self.timer.start(
                TimerMode::SendProlongationRequest,
                prolongation_delay(HELLO_PENDING_WAITING_MS),
            );
        }
        Ok(())
    }

    async fn handle_hello(&mut self, hello: ConnectionHelloType) -> Result<(), ShipError> {
        match hello.phase {
            ConnectionHelloPhase::Ready => {
                self.remote_ready = true;
                match self.state {
                    ShipState::Hello => self.enter_protocol_handshake().await?,
                    // Still pending ourselves: keep the prolongation cycle
                    // alive so the ready peer keeps waiting for us.
                    ShipState::HelloPending => self.timer.start(
                        TimerMode::SendProlongationRequest,
                        prolongation_delay(HELLO_PENDING_WAITING_MS),
                    ),
                    _ => {}
                }
                Ok(())
            }
            ConnectionHelloPhase::Pending => {
                self.remote_ready = false;
                if let Some(waiting) = hello.waiting {
                    self.last_received_waiting = Some(waiting);
                    self.timer.start(
                        TimerMode::ProlongationRequestReply,
                        Duration::from_millis(waiting),
                    );
                } else if self.state == ShipState::Hello {
                    self.timer.start(TimerMode::WaitForReady, T_HELLO_INIT);
                }
                // The pending peer needs to hear our state again.
                if self.state == ShipState::Hello {
                    self.send_control(&ConnectionHello::ready()).await?;
                }
                Ok(())
            }
            ConnectionHelloPhase::Aborted => Err(ShipError::ProtocolViolation {
                context: "peer aborted the hello phase".into(),
            }),
        }
    }

    pub(crate) async fn handle_trust_granted(&mut self) -> Result<(), ShipError> {
        if self.state != ShipState::HelloPending {
            return Ok(());
        }
        self.send_control(&ConnectionHello::ready()).await?;
        self.state = ShipState::Hello;
        if self.remote_ready {
            self.enter_protocol_handshake().await
        } else {
            self.timer.start(TimerMode::WaitForReady, T_HELLO_INIT);
            Ok(())
        }
    }

    // -- protocol handshake phase -------------------------------------------

    async fn enter_protocol_handshake(&mut self) -> Result<(), ShipError> {
        self.state = ShipState::ProtocolHandshake;
        self.timer.start(TimerMode::WaitForReady, CMI_TIMEOUT);
        self.send_control(&MessageProtocolHandshake::new(
            ProtocolHandshakeType::AnnounceMax,
        ))
        .await
    }

    async fn handle_protocol_handshake(
        &mut self,
        handshake: MessageProtocolHandshakeType,
    ) -> Result<(), ShipError> {
        let supported = handshake.version == SHIP_VERSION
            && handshake
                .formats
                .format
                .iter()
                .any(|f| f == FORMAT_JSON_UTF8);

        match handshake.handshake_type {
            ProtocolHandshakeType::AnnounceMax => {
                if !supported {
                    return self.abort_selection_mismatch().await;
                }
                self.send_control(&MessageProtocolHandshake::new(ProtocolHandshakeType::Select))
                    .await?;
                self.protocol_select_sent = true;
                self.timer.start(TimerMode::WaitForReady, CMI_TIMEOUT);
                Ok(())
            }
            ProtocolHandshakeType::Select => {
                if !self.protocol_select_sent {
                    return Err(ShipError::ProtocolViolation {
                        context: "select before announceMax exchange".into(),
                    });
                }
                if !supported {
                    return self.abort_selection_mismatch().await;
                }
                self.enter_pin_check().await
            }
        }
    }

    async fn abort_selection_mismatch(&mut self) -> Result<(), ShipError> {
        let error = MessageProtocolHandshakeError {
            message_protocol_handshake_error: MessageProtocolHandshakeErrorType {
                error: handshake_error::SELECTION_MISMATCH,
            },
        };
        if let Err(e) = self.send_control(&error).await {
            debug!(error = %e, "failed to send handshake error");
        }
        Err(ShipError::VersionMismatch)
    }

    // -- PIN phase ----------------------------------------------------------

    async fn enter_pin_check(&mut self) -> Result<(), ShipError> {
        self.state = ShipState::PinStateCheck;
        self.timer.start(TimerMode::WaitForReady, CMI_TIMEOUT);
        self.send_control(&ConnectionPinState::none()).await
    }

    async fn handle_pin_state(&mut self, pin_state: PinState) -> Result<(), ShipError> {
        // PIN-based trust is not supported; anything but `none` ends the
        // connection.
        if pin_state != PinState::None {
            return Err(ShipError::ProtocolViolation {
                context: format!("unsupported pin state {pin_state:?}"),
            });
        }
        self.state = ShipState::PinOk;
        self.enter_access_methods_request().await
    }

    // -- access methods phase -----------------------------------------------

    async fn enter_access_methods_request(&mut self) -> Result<(), ShipError> {
        self.state = ShipState::AccessMethodsRequest;
        self.timer.start(TimerMode::WaitForReady, CMI_TIMEOUT);
        self.send_control(&AccessMethodsRequest::default()).await
    }

    fn complete_handshake(&mut self) -> Result<(), ShipError> {
        self.state = ShipState::Complete;
        self.timer.stop();
        self.handshake_completed = true;
        self.publish_remote_ship_id();

        let sink: Arc<dyn SpineDataSink> = Arc::new(self.handle());
        let remote = self
            .local_device
            .add_remote_device(self.remote_ski.clone(), sink);
        self.remote_device = Some(remote);

        info!(
            ski = %self.remote_ski,
            remote_ship_id = ?self.remote_ship_id,
            "SHIP handshake complete"
        );
        self.provider.handle_connection_ready(&self.remote_ski);
        Ok(())
    }

    // -- timers -------------------------------------------------------------

    pub(crate) async fn handle_handshake_timer(&mut self) -> Result<(), ShipError> {
        match self.timer.expire() {
            Some(TimerMode::SendProlongationRequest) => {
                self.send_control(&ConnectionHello::pending(HELLO_PENDING_WAITING_MS, true))
                    .await?;
                // Bound the wait for the peer's answer by the window it
                // last advertised.
                let bound = self
                    .last_received_waiting
                    .map(Duration::from_millis)
                    .unwrap_or(T_HELLO_INIT);
                self.timer.start(TimerMode::ProlongationRequestReply, bound);
                Ok(())
            }
            Some(TimerMode::WaitForReady) | Some(TimerMode::ProlongationRequestReply) => {
                if matches!(self.state, ShipState::Hello | ShipState::HelloPending) {
                    if let Err(e) = self.send_control(&ConnectionHello::aborted()).await {
                        debug!(error = %e, "failed to send hello abort");
                    }
                }
                Err(ShipError::HandshakeTimeout)
            }
            None => Ok(()),
        }
    }

    // -- helpers ------------------------------------------------------------

    async fn send_control<M: Serialize>(&mut self, model: &M) -> Result<(), ShipError> {
        let frame = codec::encode_frame(MessageType::Control, model)?;
        self.transport.send(frame).await?;
        Ok(())
    }

    fn control_message(
        &self,
        message_type: MessageType,
        body: &[u8],
    ) -> Result<ControlMessage, ShipError> {
        if message_type != MessageType::Control {
            return Err(ShipError::ProtocolViolation {
                context: format!("{message_type} message in state {:?}", self.state),
            });
        }
        let canonical = codec::decode_body(body)?;
        serde_json::from_value(canonical).map_err(|_| ShipError::ProtocolViolation {
            context: format!("unrecognized control message in state {:?}", self.state),
        })
    }

    fn unexpected(&self, message: &ControlMessage) -> ShipError {
        let kind = match message {
            ControlMessage::Hello(_) => "connectionHello",
            ControlMessage::ProtocolHandshake(_) => "messageProtocolHandshake",
            ControlMessage::ProtocolHandshakeError(_) => "messageProtocolHandshakeError",
            ControlMessage::PinState(_) => "connectionPinState",
            ControlMessage::AccessMethodsRequest(_) => "accessMethodsRequest",
            ControlMessage::AccessMethods(_) => "accessMethods",
        };
        ShipError::ProtocolViolation {
            context: format!("{kind} in state {:?}", self.state),
        }
    }
}

/// The INIT frame must carry exactly one value byte, `0x00`.
fn validate_init(message_type: MessageType, body: &[u8]) -> Result<(), ShipError> {
    if message_type != MessageType::Init {
        return Err(ShipError::ProtocolViolation {
            context: format!("expected INIT, got {message_type}"),
        });
    }
    if body != [0x00] {
        return Err(ShipError::ProtocolViolation {
            context: "INIT value byte must be 0x00".into(),
        });
    }
    Ok(())
}

fn prolongation_delay(waiting_ms: u64) -> Duration {
    let waiting = Duration::from_millis(waiting_ms);
    waiting
        .checked_sub(PROLONGATION_MARGIN)
        .filter(|d| !d.is_zero())
        .unwrap_or(waiting / 2)
}
