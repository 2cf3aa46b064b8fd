//! State-machine tests driving handshake phases directly.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use eebus_spine::model::DeviceType;
use eebus_spine::{DeviceConfig, DeviceLocal};

use crate::codec;
use crate::connection::{Role, ShipConnection, ShipError};
use crate::handshake::{ShipState, TimerMode, T_HELLO_INIT};
use crate::model::{
    AccessMethods, AccessMethodsRequest, ConnectionHello, ConnectionPinState,
    ConnectionPinStateType, MessageProtocolFormats, MessageProtocolHandshake,
    MessageProtocolHandshakeType, MessageType, PinState, ProtocolHandshakeType, Version,
    FORMAT_JSON_UTF8,
};
use crate::transport::{MessageTransport, ServiceDataProvider};

const REMOTE_SKI: &str = "f00dd00d";

/// Records outbound frames; inbound frames are fed to the state machine
/// directly, so `recv` never resolves.
#[derive(Clone, Default)]
struct ScriptTransport {
    sent: Arc<Mutex<Vec<Bytes>>>,
}

impl ScriptTransport {
    fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    fn last_control<M: serde::de::DeserializeOwned>(&self) -> M {
        let frames = self.sent_frames();
        let frame = frames.last().expect("a frame was sent");
        let (_, body) = codec::split_frame(frame).unwrap();
        serde_json::from_value(codec::decode_body(body).unwrap()).unwrap()
    }
}

impl MessageTransport for ScriptTransport {
    async fn send(&mut self, message: Bytes) -> io::Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct TestProvider {
    untrusted: bool,
    ready: Mutex<Vec<String>>,
    closed: Mutex<Vec<(String, bool)>>,
}

impl ServiceDataProvider for TestProvider {
    fn is_remote_trusted(&self, _ski: &str) -> bool {
        !self.untrusted
    }

    fn handle_connection_ready(&self, ski: &str) {
        self.ready.lock().push(ski.to_string());
    }

    fn handle_connection_closed(&self, ski: &str, handshake_completed: bool) {
        self.closed.lock().push((ski.to_string(), handshake_completed));
    }
}

fn local_device() -> Arc<DeviceLocal> {
    let config = DeviceConfig::new(
        "Demo",
        "Demo",
        "HEMS",
        "123456789",
        DeviceType::EnergyManagementSystem,
    )
    .unwrap();
    DeviceLocal::new(config)
}

fn connection(
    role: Role,
    trusted: bool,
) -> (
    ShipConnection<ScriptTransport, TestProvider>,
    ScriptTransport,
    Arc<TestProvider>,
) {
    let transport = ScriptTransport::default();
    let provider = Arc::new(TestProvider {
        untrusted: !trusted,
        ..Default::default()
    });
    let (connection, _handle) = ShipConnection::new(
        role,
        transport.clone(),
        provider.clone(),
        local_device(),
        REMOTE_SKI,
    );
    (connection, transport, provider)
}

fn control_frame<M: Serialize>(model: &M) -> Bytes {
    codec::encode_frame(MessageType::Control, model).unwrap()
}

fn protocol_handshake(
    handshake_type: ProtocolHandshakeType,
    version: Version,
) -> MessageProtocolHandshake {
    MessageProtocolHandshake {
        message_protocol_handshake: MessageProtocolHandshakeType {
            handshake_type,
            version,
            formats: MessageProtocolFormats {
                format: vec![FORMAT_JSON_UTF8.to_string()],
            },
        },
    }
}

const V1: Version = Version { major: 1, minor: 0 };

/// Drive a trusted client to the given state with the server's side of a
/// well-formed transcript.
async fn advance_client_to(
    connection: &mut ShipConnection<ScriptTransport, TestProvider>,
    state: ShipState,
) {
    connection.start_handshake().await.unwrap();
    if state == ShipState::ClientWait {
        return;
    }

    let script: &[Bytes] = &[
        Bytes::from_static(&codec::INIT_FRAME),
        control_frame(&ConnectionHello::ready()),
        control_frame(&protocol_handshake(ProtocolHandshakeType::AnnounceMax, V1)),
        control_frame(&protocol_handshake(ProtocolHandshakeType::Select, V1)),
        control_frame(&ConnectionPinState::none()),
        control_frame(&AccessMethodsRequest::default()),
        control_frame(&AccessMethods::with_id("peer-123")),
    ];
    for frame in script {
        connection.handle_handshake_message(frame).await.unwrap();
        if connection.state() == state {
            return;
        }
    }
    panic!("state {state:?} not reached, stuck in {:?}", connection.state());
}

// -- S1: happy path ---------------------------------------------------------

#[tokio::test]
async fn client_handshake_happy_path() {
    let (mut connection, transport, provider) = connection(Role::Client, true);

    connection.start_handshake().await.unwrap();
    assert_eq!(connection.state(), ShipState::ClientWait);
    assert_eq!(transport.sent_frames()[0], codec::INIT_FRAME.as_slice());

    // Server transcript: INIT, hello ready, announceMax, select, pin none,
    // access methods request, access methods.
    connection
        .handle_handshake_message(&codec::INIT_FRAME)
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::Hello);
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello, ConnectionHello::ready());

    connection
        .handle_handshake_message(&control_frame(&ConnectionHello::ready()))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::ProtocolHandshake);
    let announce: MessageProtocolHandshake = transport.last_control();
    assert_eq!(
        announce.message_protocol_handshake.handshake_type,
        ProtocolHandshakeType::AnnounceMax
    );

    connection
        .handle_handshake_message(&control_frame(&protocol_handshake(
            ProtocolHandshakeType::AnnounceMax,
            V1,
        )))
        .await
        .unwrap();
    let select: MessageProtocolHandshake = transport.last_control();
    assert_eq!(
        select.message_protocol_handshake.handshake_type,
        ProtocolHandshakeType::Select
    );

    connection
        .handle_handshake_message(&control_frame(&protocol_handshake(
            ProtocolHandshakeType::Select,
            V1,
        )))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::PinStateCheck);

    connection
        .handle_handshake_message(&control_frame(&ConnectionPinState::none()))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::AccessMethodsRequest);

    connection
        .handle_handshake_message(&control_frame(&AccessMethodsRequest::default()))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::AccessMethods);
    let methods: AccessMethods = transport.last_control();
    assert_eq!(
        methods.access_methods.id.as_deref(),
        Some("Demo-HEMS-123456789")
    );

    connection
        .handle_handshake_message(&control_frame(&AccessMethods::with_id("peer-123")))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::Complete);
    assert_eq!(connection.remote_ship_id(), Some("peer-123"));
    assert_eq!(connection.handle().remote_ship_id().as_deref(), Some("peer-123"));
    assert!(connection.handshake_timer().is_none());
    assert_eq!(provider.ready.lock().as_slice(), [REMOTE_SKI.to_string()]);
}

#[tokio::test]
async fn server_mirrors_the_handshake() {
    let (mut connection, transport, provider) = connection(Role::Server, true);

    connection.start_handshake().await.unwrap();
    assert_eq!(connection.state(), ShipState::ServerWait);
    assert!(transport.sent_frames().is_empty());

    connection
        .handle_handshake_message(&codec::INIT_FRAME)
        .await
        .unwrap();
    // Server answers the INIT before its hello.
    assert_eq!(transport.sent_frames()[0], codec::INIT_FRAME.as_slice());
    assert_eq!(connection.state(), ShipState::Hello);

    for frame in [
        control_frame(&ConnectionHello::ready()),
        control_frame(&protocol_handshake(ProtocolHandshakeType::AnnounceMax, V1)),
        control_frame(&protocol_handshake(ProtocolHandshakeType::Select, V1)),
        control_frame(&ConnectionPinState::none()),
        control_frame(&AccessMethodsRequest::default()),
        control_frame(&AccessMethods::with_id("client-peer")),
    ] {
        connection.handle_handshake_message(&frame).await.unwrap();
    }

    assert_eq!(connection.state(), ShipState::Complete);
    assert_eq!(provider.ready.lock().len(), 1);
}

// -- S2: prolongation -------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pending_hello_arms_prolongation_reply_timer() {
    let (mut connection, transport, _provider) = connection(Role::Client, true);
    connection.start_handshake().await.unwrap();
    connection
        .handle_handshake_message(&codec::INIT_FRAME)
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::Hello);

    let before = tokio::time::Instant::now();
    connection
        .handle_handshake_message(&control_frame(&ConnectionHello::pending(30_000, false)))
        .await
        .unwrap();

    let (mode, deadline) = connection.handshake_timer().unwrap();
    assert_eq!(mode, TimerMode::ProlongationRequestReply);
    assert_eq!(deadline - before, Duration::from_secs(30));

    // We re-affirmed readiness towards the pending peer.
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello, ConnectionHello::ready());

    // A subsequent ready is accepted and moves on.
    connection
        .handle_handshake_message(&control_frame(&ConnectionHello::ready()))
        .await
        .unwrap();
    assert_eq!(connection.state(), ShipState::ProtocolHandshake);
}

#[tokio::test(start_paused = true)]
async fn untrusted_side_goes_pending_and_requests_prolongation() {
    let (mut connection, transport, _provider) = connection(Role::Client, false);
    connection.start_handshake().await.unwrap();
    connection
        .handle_handshake_message(&codec::INIT_FRAME)
        .await
        .unwrap();

    assert_eq!(connection.state(), ShipState::HelloPending);
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello.connection_hello.phase, crate::model::ConnectionHelloPhase::Pending);
    assert_eq!(hello.connection_hello.waiting, Some(60_000));
    assert_eq!(
        connection.handshake_timer().unwrap().0,
        TimerMode::SendProlongationRequest
    );

    // The prolongation timer fires: a pending hello with the request flag
    // goes out and the reply timer takes over.
    connection.handle_handshake_timer().await.unwrap();
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello.connection_hello.prolongation_request, Some(true));
    assert_eq!(
        connection.handshake_timer().unwrap().0,
        TimerMode::ProlongationRequestReply
    );

    // Trust arrives: we turn ready.
    connection.handle_trust_granted().await.unwrap();
    assert_eq!(connection.state(), ShipState::Hello);
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello, ConnectionHello::ready());
}

// -- S3: protocol mismatch --------------------------------------------------

#[tokio::test]
async fn version_mismatch_closes_with_selection_mismatch() {
    let (mut connection, transport, provider) = connection(Role::Client, true);
    advance_client_to(&mut connection, ShipState::ProtocolHandshake).await;

    let err = connection
        .handle_handshake_message(&control_frame(&protocol_handshake(
            ProtocolHandshakeType::AnnounceMax,
            Version { major: 2, minor: 0 },
        )))
        .await
        .unwrap_err();

    assert!(matches!(err, ShipError::VersionMismatch));
    let abort: crate::model::MessageProtocolHandshakeError = transport.last_control();
    assert_eq!(
        abort.message_protocol_handshake_error.error,
        crate::model::handshake_error::SELECTION_MISMATCH
    );
    assert!(provider.ready.lock().is_empty());
}

#[tokio::test]
async fn missing_common_format_is_a_mismatch() {
    let (mut connection, _transport, _provider) = connection(Role::Client, true);
    advance_client_to(&mut connection, ShipState::ProtocolHandshake).await;

    let handshake = MessageProtocolHandshake {
        message_protocol_handshake: MessageProtocolHandshakeType {
            handshake_type: ProtocolHandshakeType::AnnounceMax,
            version: V1,
            formats: MessageProtocolFormats {
                format: vec!["XML".to_string()],
            },
        },
    };
    let err = connection
        .handle_handshake_message(&control_frame(&handshake))
        .await
        .unwrap_err();
    assert!(matches!(err, ShipError::VersionMismatch));
}

// -- gating -----------------------------------------------------------------

#[tokio::test]
async fn unexpected_messages_are_protocol_violations() {
    // (state to reach, offending frame) pairs. Every waiting state accepts
    // exactly one message kind.
    let offenders: Vec<(ShipState, Bytes)> = vec![
        (
            ShipState::ClientWait,
            control_frame(&ConnectionHello::ready()),
        ),
        (ShipState::Hello, Bytes::from_static(&codec::INIT_FRAME)),
        (
            ShipState::Hello,
            control_frame(&AccessMethods::with_id("x")),
        ),
        (
            ShipState::ProtocolHandshake,
            control_frame(&ConnectionHello::ready()),
        ),
        (
            ShipState::PinStateCheck,
            control_frame(&protocol_handshake(ProtocolHandshakeType::Select, V1)),
        ),
        (
            ShipState::AccessMethodsRequest,
            control_frame(&AccessMethods::with_id("x")),
        ),
        (
            ShipState::AccessMethods,
            control_frame(&AccessMethodsRequest::default()),
        ),
    ];

    for (state, frame) in offenders {
        let (mut connection, _transport, _provider) = connection(Role::Client, true);
        advance_client_to(&mut connection, state).await;

        let err = connection.handle_handshake_message(&frame).await.unwrap_err();
        assert!(
            matches!(err, ShipError::ProtocolViolation { .. }),
            "state {state:?} accepted an unexpected message: {err}"
        );
    }
}

#[tokio::test]
async fn init_value_byte_must_be_zero() {
    for bad in [
        Bytes::from_static(&[0x00, 0x01]),
        Bytes::from_static(&[0x00]),
        Bytes::from_static(&[0x00, 0x00, 0x00]),
    ] {
        let (mut connection, _transport, _provider) = connection(Role::Client, true);
        connection.start_handshake().await.unwrap();

        let err = connection.handle_handshake_message(&bad).await.unwrap_err();
        assert!(
            matches!(err, ShipError::ProtocolViolation { .. }),
            "accepted invalid INIT {bad:?}"
        );
    }
}

#[tokio::test]
async fn pin_protected_peers_are_rejected() {
    let (mut connection, _transport, _provider) = connection(Role::Client, true);
    advance_client_to(&mut connection, ShipState::PinStateCheck).await;

    let pin = ConnectionPinState {
        connection_pin_state: ConnectionPinStateType {
            pin_state: PinState::Required,
        },
    };
    let err = connection
        .handle_handshake_message(&control_frame(&pin))
        .await
        .unwrap_err();
    assert!(matches!(err, ShipError::ProtocolViolation { .. }));
}

// -- timers -----------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn wait_for_ready_expiry_is_a_handshake_timeout() {
    let (mut connection, transport, _provider) = connection(Role::Client, true);
    connection.start_handshake().await.unwrap();
    connection
        .handle_handshake_message(&codec::INIT_FRAME)
        .await
        .unwrap();
    assert_eq!(
        connection.handshake_timer().unwrap().0,
        TimerMode::WaitForReady
    );

    tokio::time::advance(T_HELLO_INIT).await;
    let err = connection.handle_handshake_timer().await.unwrap_err();
    assert!(matches!(err, ShipError::HandshakeTimeout));

    // The hello phase announces the abort before dropping the transport.
    let hello: ConnectionHello = transport.last_control();
    assert_eq!(hello, ConnectionHello::aborted());
}
