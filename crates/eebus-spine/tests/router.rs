//! Router scenarios: detailed discovery, reply correlation, timeouts.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use eebus_spine::model::deviceclassification::DeviceClassificationManufacturerData;
use eebus_spine::model::nodemanagement::{
    DeviceAddressEnvelope, EntityAddressEnvelope, FunctionProperty,
    NetworkManagementDeviceDescriptionData, NetworkManagementEntityDescriptionData,
    NetworkManagementFeatureDescriptionData, NodeManagementDetailedDiscoveryData,
    NodeManagementDetailedDiscoveryDeviceInformation,
    NodeManagementDetailedDiscoveryEntityInformation,
    NodeManagementDetailedDiscoveryFeatureInformation, PossibleOperations,
    PossibleOperationsRead,
};
use eebus_spine::model::{
    Cmd, CmdClassifier, CmdData, Datagram, DeviceAddress, DeviceType, EntityType, Envelope,
    FeatureAddress, FeatureType, Function, Header, MsgCounter, NetworkFeatureSet, Payload, Role,
    SPECIFICATION_VERSION,
};
use eebus_spine::{DeviceConfig, DeviceLocal, DeviceRemote, Operations, SpineDataSink, SpineError};

const REMOTE_SKI: &str = "df429cd1a3";
const REMOTE_DEVICE_ADDRESS: &str = "d:_i:Vendor_EVSE-4711";

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
    fn datagrams(&self) -> Vec<Datagram> {
        self.sent
            .lock()
            .iter()
            .map(|bytes| serde_json::from_slice::<Envelope>(bytes).unwrap().datagram)
            .collect()
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

fn connect_remote(device: &Arc<DeviceLocal>) -> (Arc<DeviceRemote>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let remote = device.add_remote_device(REMOTE_SKI, sink.clone());
    (remote, sink)
}

fn remote_nm_address() -> FeatureAddress {
    FeatureAddress::new(Some(DeviceAddress::new(REMOTE_DEVICE_ADDRESS)), vec![0], 0)
}

fn read_supported(function: Function) -> FunctionProperty {
    FunctionProperty {
        function: Some(function),
        possible_operations: Some(PossibleOperations {
            read: Some(PossibleOperationsRead::default()),
            write: None,
        }),
    }
}

/// Discovery record: one EVSE entity `[1]` carrying a DeviceClassification
/// and a Measurement feature.
fn evse_discovery_data(max_response_delay: Option<&str>) -> NodeManagementDetailedDiscoveryData {
    let device_address = DeviceAddress::new(REMOTE_DEVICE_ADDRESS);
    let feature = |index: u32,
                   feature_type: FeatureType,
                   supported: Vec<FunctionProperty>|
     -> NodeManagementDetailedDiscoveryFeatureInformation {
        NodeManagementDetailedDiscoveryFeatureInformation {
            description: Some(NetworkManagementFeatureDescriptionData {
                feature_address: Some(FeatureAddress::new(
                    Some(device_address.clone()),
                    vec![1],
                    index,
                )),
                feature_type: Some(feature_type),
                role: Some(Role::Client),
                supported_function: supported,
                description: None,
                max_response_delay: max_response_delay.map(str::to_string),
            }),
        }
    };

    NodeManagementDetailedDiscoveryData {
        specification_version_list: None,
        device_information: Some(NodeManagementDetailedDiscoveryDeviceInformation {
            description: Some(NetworkManagementDeviceDescriptionData {
                device_address: Some(DeviceAddressEnvelope {
                    device: Some(device_address.clone()),
                }),
                device_type: Some(DeviceType::ChargingStation),
                network_feature_set: Some(NetworkFeatureSet::Smart),
                description: None,
            }),
        }),
        entity_information: vec![NodeManagementDetailedDiscoveryEntityInformation {
            description: Some(NetworkManagementEntityDescriptionData {
                entity_address: Some(EntityAddressEnvelope {
                    device: Some(device_address.clone()),
                    entity: vec![1],
                }),
                entity_type: Some(EntityType::Evse),
                last_state_change: None,
                description: None,
            }),
        }],
        feature_information: vec![
            feature(
                0,
                FeatureType::DeviceClassification,
                vec![read_supported(Function::DeviceClassificationManufacturerData)],
            ),
            feature(
                1,
                FeatureType::Measurement,
                vec![read_supported(Function::MeasurementListData)],
            ),
        ],
    }
}

fn envelope(header: Header, cmd: Cmd) -> Vec<u8> {
    serde_json::to_vec(&Envelope {
        datagram: Datagram {
            header,
            payload: Payload { cmd: vec![cmd] },
        },
    })
    .unwrap()
}

fn reply_header(
    reference: MsgCounter,
    source: FeatureAddress,
    destination: FeatureAddress,
) -> Header {
    Header {
        specification_version: Some(SPECIFICATION_VERSION.to_string()),
        address_source: Some(source),
        address_destination: Some(destination),
        msg_counter: Some(MsgCounter::new(100)),
        msg_counter_reference: Some(reference),
        cmd_classifier: Some(CmdClassifier::Reply),
        ack_request: None,
    }
}

fn deliver_discovery_reply(device: &Arc<DeviceLocal>, remote: &Arc<DeviceRemote>, sink: &RecordingSink) {
    // The discovery request issued on connect is msgCounter 1.
    let request = &sink.datagrams()[0];
    assert_eq!(request.header.msg_counter, Some(MsgCounter::new(1)));
    assert_eq!(request.header.cmd_classifier, Some(CmdClassifier::Read));

    let message = envelope(
        reply_header(
            MsgCounter::new(1),
            remote_nm_address(),
            device.node_management().address().clone(),
        ),
        CmdData::NodeManagementDetailedDiscoveryData(evse_discovery_data(None)).into(),
    );
    device.process_spine_message(&message, remote).unwrap();
}

#[tokio::test]
async fn detailed_discovery_materializes_remote_tree() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);

    deliver_discovery_reply(&device, &remote, &sink);

    assert_eq!(
        remote.address(),
        Some(DeviceAddress::new(REMOTE_DEVICE_ADDRESS))
    );
    assert_eq!(remote.device_type(), Some(DeviceType::ChargingStation));

    let entity = remote.entity(&vec![1]).expect("entity [1] discovered");
    assert_eq!(entity.entity_type(), EntityType::Evse);
    assert_eq!(entity.features().len(), 2);

    let classification = entity
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .expect("classification feature discovered");

    // Nothing received yet for the function.
    assert_eq!(
        classification
            .data(Function::DeviceClassificationManufacturerData)
            .unwrap_err(),
        SpineError::DataNotAvailable {
            function: Function::DeviceClassificationManufacturerData
        }
    );
}

#[tokio::test]
async fn read_reply_populates_function_data() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);
    deliver_discovery_reply(&device, &remote, &sink);

    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::DeviceClassification, Role::Client);

    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .unwrap();

    let (counter, reply) = client
        .request_data(
            Function::DeviceClassificationManufacturerData,
            None,
            None,
            &remote_feature,
        )
        .unwrap();
    // Counter 1 went to detailed discovery.
    assert_eq!(counter, MsgCounter::new(2));
    assert!(device.has_pending_requests(REMOTE_SKI));

    let manufacturer = DeviceClassificationManufacturerData {
        device_name: Some("Wallbox".into()),
        brand_name: Some("Vendor".into()),
        ..Default::default()
    };
    let message = envelope(
        reply_header(
            counter,
            remote_feature.address().clone(),
            client.address().clone(),
        ),
        CmdData::DeviceClassificationManufacturerData(manufacturer.clone()).into(),
    );
    device.process_spine_message(&message, &remote).unwrap();

    let received = reply.await.unwrap();
    assert_eq!(received.header.msg_counter_reference, Some(counter));
    assert!(!device.has_pending_requests(REMOTE_SKI));

    assert_eq!(
        remote_feature
            .data(Function::DeviceClassificationManufacturerData)
            .unwrap(),
        CmdData::DeviceClassificationManufacturerData(manufacturer)
    );
}

#[tokio::test]
async fn unsolicited_reply_is_tolerated_and_table_undisturbed() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);
    deliver_discovery_reply(&device, &remote, &sink);

    // The discovery entry is gone, so only the new request is pending.
    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::DeviceClassification, Role::Client);
    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .unwrap();
    let (_counter, _reply) = client
        .request_data(
            Function::DeviceClassificationManufacturerData,
            None,
            None,
            &remote_feature,
        )
        .unwrap();

    // A reply referencing a counter we never emitted: logged, not fatal,
    // and the outstanding entry stays.
    let message = envelope(
        reply_header(
            MsgCounter::new(999),
            remote_feature.address().clone(),
            client.address().clone(),
        ),
        CmdData::DeviceClassificationManufacturerData(Default::default()).into(),
    );
    device.process_spine_message(&message, &remote).unwrap();
    assert!(device.has_pending_requests(REMOTE_SKI));
}

#[tokio::test]
async fn requesting_unsupported_operation_fails_before_sending() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);
    deliver_discovery_reply(&device, &remote, &sink);

    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::Measurement, Role::Client);
    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::Measurement, Role::Client)
        .unwrap();

    let sent_before = sink.datagrams().len();
    let err = client
        .request_data(
            Function::DeviceConfigurationKeyValueListData,
            None,
            None,
            &remote_feature,
        )
        .map(|_| ())
        .unwrap_err();

    assert!(matches!(err, SpineError::OperationNotSupported { .. }));
    assert_eq!(sink.datagrams().len(), sent_before);
}

#[tokio::test(start_paused = true)]
async fn missing_reply_times_out_and_clears_the_table() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);

    // Advertise a 100 ms response window.
    let request = &sink.datagrams()[0];
    assert_eq!(request.header.msg_counter, Some(MsgCounter::new(1)));
    let message = envelope(
        reply_header(
            MsgCounter::new(1),
            remote_nm_address(),
            device.node_management().address().clone(),
        ),
        CmdData::NodeManagementDetailedDiscoveryData(evse_discovery_data(Some("PT0.1S"))).into(),
    );
    device.process_spine_message(&message, &remote).unwrap();

    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::DeviceClassification, Role::Client);
    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .unwrap();

    let started = tokio::time::Instant::now();
    let (counter, reply) = client
        .request_data(
            Function::DeviceClassificationManufacturerData,
            None,
            None,
            &remote_feature,
        )
        .unwrap();

    let result = reply.await;
    assert_eq!(result.unwrap_err(), SpineError::ResponseTimeout { counter });
    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert!(!device.has_pending_requests(REMOTE_SKI));
}

#[tokio::test]
async fn connection_close_drains_waiters() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);
    deliver_discovery_reply(&device, &remote, &sink);

    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::DeviceClassification, Role::Client);
    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .unwrap();
    let (_counter, reply) = client
        .request_data(
            Function::DeviceClassificationManufacturerData,
            None,
            None,
            &remote_feature,
        )
        .unwrap();

    device.remove_remote_device(REMOTE_SKI);

    assert_eq!(reply.await.unwrap_err(), SpineError::ConnectionClosed);
    assert!(!device.has_pending_requests(REMOTE_SKI));
    assert!(device.remote_device(REMOTE_SKI).is_none());
}

#[tokio::test]
async fn outbound_counters_strictly_increase_across_operations() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);
    deliver_discovery_reply(&device, &remote, &sink);

    let entity = device.add_entity(EntityType::Cem);
    let client = entity.add_feature(FeatureType::DeviceClassification, Role::Client);
    let remote_feature = remote
        .entity(&vec![1])
        .unwrap()
        .feature_of_type(FeatureType::DeviceClassification, Role::Client)
        .unwrap();

    for _ in 0..3 {
        let (_, _reply) = client
            .request_data(
                Function::DeviceClassificationManufacturerData,
                None,
                None,
                &remote_feature,
            )
            .unwrap();
    }

    let counters: Vec<u64> = sink
        .datagrams()
        .iter()
        .map(|d| d.header.msg_counter.unwrap().raw())
        .collect();
    assert_eq!(counters, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn read_request_is_served_from_local_feature_data() {
    let device = local_device();
    let (remote, sink) = connect_remote(&device);

    let entity = device.add_entity(EntityType::Cem);
    let server = entity.add_feature(FeatureType::DeviceClassification, Role::Server);
    server.add_function(
        Function::DeviceClassificationManufacturerData,
        Operations::read_only(),
    );
    let manufacturer = DeviceClassificationManufacturerData {
        device_name: Some("HEMS".into()),
        ..Default::default()
    };
    server.set_data(CmdData::DeviceClassificationManufacturerData(
        manufacturer.clone(),
    ));

    let read = envelope(
        Header {
            specification_version: Some(SPECIFICATION_VERSION.to_string()),
            address_source: Some(FeatureAddress::new(None, vec![1], 0)),
            address_destination: Some(server.address().clone()),
            msg_counter: Some(MsgCounter::new(7)),
            msg_counter_reference: None,
            cmd_classifier: Some(CmdClassifier::Read),
            ack_request: None,
        },
        Cmd::read(Function::DeviceClassificationManufacturerData),
    );
    device.process_spine_message(&read, &remote).unwrap();

    let sent = sink.datagrams();
    let reply = sent.last().unwrap();
    assert_eq!(reply.header.cmd_classifier, Some(CmdClassifier::Reply));
    assert_eq!(reply.header.msg_counter_reference, Some(MsgCounter::new(7)));
    assert_eq!(
        reply.payload.cmd[0].device_classification_manufacturer_data,
        Some(manufacturer)
    );
}
