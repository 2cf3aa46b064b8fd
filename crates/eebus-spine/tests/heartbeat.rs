//! Heartbeat supervision: start on subscription, monotone counters, stop on
//! unsubscribe.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use eebus_spine::model::nodemanagement::{
    NodeManagementSubscriptionDeleteCall, NodeManagementSubscriptionRequestCall,
    SubscriptionManagementDeleteCall, SubscriptionManagementRequestCall,
};
use eebus_spine::model::{
    CmdClassifier, CmdData, Datagram, DeviceType, EntityType, Envelope, FeatureAddress,
    FeatureType, Function, Header, MsgCounter, Payload, Role, SPECIFICATION_VERSION,
};
use eebus_spine::{DeviceConfig, DeviceLocal, SpineDataSink, HEARTBEAT_INTERVAL};

const REMOTE_SKI: &str = "a1b2c3";

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Bytes>>,
}

impl SpineDataSink for RecordingSink {
    fn write_spine_message(&self, message: Bytes) {
        self.sent.lock().push(message);
    }
}

impl RecordingSink {
    fn heartbeats(&self) -> Vec<(u64, u64)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|bytes| {
                let datagram = serde_json::from_slice::<Envelope>(bytes).ok()?.datagram;
                let beat = datagram.payload.cmd[0]
                    .device_diagnosis_heartbeat_data
                    .as_ref()?;
                Some((
                    datagram.header.msg_counter?.raw(),
                    beat.heartbeat_counter?,
                ))
            })
            .collect()
    }
}

struct Setup {
    device: Arc<DeviceLocal>,
    remote: Arc<eebus_spine::DeviceRemote>,
    sink: Arc<RecordingSink>,
    diagnosis_address: FeatureAddress,
    subscriber_address: FeatureAddress,
}

fn setup() -> Setup {
    let config = DeviceConfig::new(
        "Demo",
        "Demo",
        "HEMS",
        "123456789",
        DeviceType::EnergyManagementSystem,
    )
    .unwrap();
    let device = DeviceLocal::new(config);

    let entity = device.add_entity(EntityType::Cem);
    let diagnosis = entity.add_feature(FeatureType::DeviceDiagnosis, Role::Server);
    diagnosis.add_function(
        Function::DeviceDiagnosisHeartbeatData,
        eebus_spine::Operations::read_only(),
    );

    let sink = Arc::new(RecordingSink::default());
    let remote = device.add_remote_device(REMOTE_SKI, sink.clone());

    Setup {
        diagnosis_address: diagnosis.address().clone(),
        subscriber_address: FeatureAddress::new(None, vec![1], 0),
        device,
        remote,
        sink,
    }
}

fn call_header(device: &DeviceLocal, source: FeatureAddress) -> Header {
    Header {
        specification_version: Some(SPECIFICATION_VERSION.to_string()),
        address_source: Some(source),
        address_destination: Some(device.node_management().address().clone()),
        msg_counter: Some(MsgCounter::new(1)),
        msg_counter_reference: None,
        cmd_classifier: Some(CmdClassifier::Call),
        ack_request: None,
    }
}

fn envelope(header: Header, data: CmdData) -> Vec<u8> {
    serde_json::to_vec(&Envelope {
        datagram: Datagram {
            header,
            payload: Payload {
                cmd: vec![data.into()],
            },
        },
    })
    .unwrap()
}

fn subscribe(setup: &Setup) {
    let call = NodeManagementSubscriptionRequestCall {
        subscription_request: Some(SubscriptionManagementRequestCall {
            client_address: Some(setup.subscriber_address.clone()),
            server_address: Some(setup.diagnosis_address.clone()),
            server_feature_type: Some(FeatureType::DeviceDiagnosis),
        }),
    };
    let message = envelope(
        call_header(&setup.device, setup.subscriber_address.clone()),
        CmdData::NodeManagementSubscriptionRequestCall(call),
    );
    setup
        .device
        .process_spine_message(&message, &setup.remote)
        .unwrap();
}

fn unsubscribe(setup: &Setup) {
    let call = NodeManagementSubscriptionDeleteCall {
        subscription_delete: Some(SubscriptionManagementDeleteCall {
            client_address: Some(setup.subscriber_address.clone()),
            server_address: Some(setup.diagnosis_address.clone()),
        }),
    };
    let message = envelope(
        call_header(&setup.device, setup.subscriber_address.clone()),
        CmdData::NodeManagementSubscriptionDeleteCall(call),
    );
    setup
        .device
        .process_spine_message(&message, &setup.remote)
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn subscription_starts_heartbeats_with_monotone_counters() {
    let setup = setup();

    subscribe(&setup);
    assert!(setup.remote.is_heartbeat_running());

    for _ in 0..3 {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
    }

    let beats = setup.sink.heartbeats();
    assert!(beats.len() >= 3, "expected beats, got {beats:?}");
    for pair in beats.windows(2) {
        assert!(
            pair[1].1 == pair[0].1 + 1,
            "heartbeat counters must increase by one: {beats:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn heartbeat_acks_are_recognized_by_message_counter() {
    let setup = setup();
    subscribe(&setup);

    tokio::time::sleep(HEARTBEAT_INTERVAL).await;
    let beats = setup.sink.heartbeats();
    let beat_counter = MsgCounter::new(beats[0].0);
    assert!(setup.remote.is_heartbeat_counter(beat_counter));

    // A result referencing the heartbeat is swallowed, not treated as an
    // unsolicited result.
    let ack = envelope(
        Header {
            specification_version: Some(SPECIFICATION_VERSION.to_string()),
            address_source: Some(setup.subscriber_address.clone()),
            address_destination: Some(setup.diagnosis_address.clone()),
            msg_counter: Some(MsgCounter::new(50)),
            msg_counter_reference: Some(beat_counter),
            cmd_classifier: Some(CmdClassifier::Result),
            ack_request: None,
        },
        CmdData::ResultData(eebus_spine::model::ResultData::success()),
    );
    setup
        .device
        .process_spine_message(&ack, &setup.remote)
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_stops_heartbeats() {
    let setup = setup();
    subscribe(&setup);

    tokio::time::sleep(HEARTBEAT_INTERVAL * 2).await;
    assert!(!setup.sink.heartbeats().is_empty());

    unsubscribe(&setup);
    assert!(!setup.remote.is_heartbeat_running());

    let count = setup.sink.heartbeats().len();
    tokio::time::sleep(HEARTBEAT_INTERVAL * 3).await;
    assert_eq!(setup.sink.heartbeats().len(), count);
}

#[tokio::test(start_paused = true)]
async fn connection_close_stops_heartbeats() {
    let setup = setup();
    subscribe(&setup);
    tokio::time::sleep(HEARTBEAT_INTERVAL).await;

    setup.device.remove_remote_device(REMOTE_SKI);
    assert!(!setup.remote.is_heartbeat_running());

    let count = setup.sink.heartbeats().len();
    tokio::time::sleep(HEARTBEAT_INTERVAL * 3).await;
    assert_eq!(setup.sink.heartbeats().len(), count);
}
