//! Integration tests: broker message → invocation decoding → handler →
//! response publish, in both invocation encodings.

use meo_device::feature::registry::MAX_FEATURE_METHODS;
use meo_device::feature::{FeatureCall, FeatureResponder, ParamMap};
use meo_device::fsm::StateId;
use meo_device::DeviceConfig;
use serde_json::Value;

use crate::mock_hw::*;

const RESPONSE_TOPIC: &str = "meo/AABBCCDDEEFF/event/feature_response";

fn turn_on_led(call: &FeatureCall, r: &mut FeatureResponder<'_>) {
    let first = call.param_i64("first").unwrap_or(0);
    let second = call.param_i64("second").unwrap_or(0);
    r.respond(call, true, Some(&format!("LED on, sum={}", first + second)));
}

fn report_reading(call: &FeatureCall, r: &mut FeatureResponder<'_>) {
    let mut values = ParamMap::new();
    values.insert("temperature".into(), "21.5".into());
    r.publish_event("humid_temp_update", &values);
    r.respond(call, true, None);
}

fn online_with_features(config: DeviceConfig) -> (TestDevice, RecordingSink) {
    let store = MockStore::provisioned("Lab", "password1", "key-123", "");
    let mut device = make_device(config, store);
    assert!(device.add_feature_method("turn_on_led", turn_on_led));
    assert!(device.add_feature_method("report_reading", report_reading));
    assert!(device.add_feature_event("humid_temp_update"));

    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::DeclaredOnline);
    device.transport_mut().client_mut().clear_published();
    (device, sink)
}

fn deliver(device: &mut TestDevice, sink: &mut RecordingSink, topic: &str, payload: &[u8]) {
    device.transport_mut().client_mut().inject(topic, payload);
    device.tick(sink);
}

fn responses(device: &TestDevice) -> Vec<Value> {
    device
        .transport()
        .client()
        .published_on(RESPONSE_TOPIC)
        .map(|p| serde_json::from_slice(&p.payload).unwrap())
        .collect()
}

#[test]
fn declaration_lists_registered_features() {
    let store = MockStore::provisioned("Lab", "password1", "key-123", "");
    let mut device = make_device(DeviceConfig::default(), store);
    device.add_feature_method("turn_on_led", turn_on_led);
    device.add_feature_event("humid_temp_update");
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);
    device.tick(&mut sink);

    let declared = device
        .transport()
        .client()
        .published_on("meo/AABBCCDDEEFF/declare")
        .next()
        .unwrap();
    let v: Value = serde_json::from_slice(&declared.payload).unwrap();
    assert_eq!(v["device_info"]["model"], "MEO Module");
    assert_eq!(v["device_info"]["manufacturer"], "ThingAI Lab");
    assert_eq!(v["device_info"]["connection"], "LAN");
    assert_eq!(v["events"], serde_json::json!(["humid_temp_update"]));
    assert_eq!(v["methods"], serde_json::json!(["turn_on_led"]));
}

#[test]
fn path_invocation_runs_handler() {
    let (mut device, mut sink) = online_with_features(DeviceConfig::default());
    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature/turn_on_led/invoke",
        br#"{"params":{"first":"2","second":"3"}}"#,
    );

    let out = responses(&device);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["feature_name"], "turn_on_led");
    assert_eq!(out[0]["device_id"], TEST_DEVICE_ID);
    assert_eq!(out[0]["success"], true);
    assert_eq!(out[0]["message"], "LED on, sum=5");
}

#[test]
fn path_invocation_without_params() {
    let (mut device, mut sink) = online_with_features(DeviceConfig::default());
    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature/turn_on_led/invoke",
        b"",
    );
    assert_eq!(responses(&device)[0]["message"], "LED on, sum=0");
}

#[test]
fn path_invocation_with_user_named_feature() {
    let (mut device, mut sink) = online_device_with(DeviceConfig::default(), "feature");
    assert!(device.add_feature_method("turn_on_led", turn_on_led));
    device.transport_mut().client_mut().clear_published();

    deliver(
        &mut device,
        &mut sink,
        "meo/feature/AABBCCDDEEFF/feature/turn_on_led/invoke",
        br#"{"params":{"first":"1","second":"1"}}"#,
    );

    let out: Vec<Value> = device
        .transport()
        .client()
        .published_on("meo/feature/AABBCCDDEEFF/event/feature_response")
        .map(|p| serde_json::from_slice(&p.payload).unwrap())
        .collect();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["feature_name"], "turn_on_led");
    assert_eq!(out[0]["success"], true);
    assert_eq!(out[0]["message"], "LED on, sum=2");
}

#[test]
fn unknown_feature_gets_single_failure() {
    let (mut device, mut sink) = online_with_features(DeviceConfig::default());
    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature/TURN_ON_LED/invoke",
        b"{}",
    );

    let out = responses(&device);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["success"], false);
    assert_eq!(out[0]["message"], "No handler registered");
    assert_eq!(out[0]["feature_name"], "TURN_ON_LED");
}

#[test]
fn cloud_invocation_runs_handler() {
    let config = DeviceConfig {
        product_id: "P-100".into(),
        ..DeviceConfig::default()
    };
    let (mut device, mut sink) = online_with_features(config);
    assert_eq!(
        device.transport().client().subscriptions(),
        ["meo/AABBCCDDEEFF/feature".to_owned()]
    );
    assert_eq!(device.provisioning().radio().value(
        meo_device::provisioning::DataPoint::ProductId
    ), "P-100");

    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature",
        br#"{"feature":"turn_on_led","first":"4","second":"5"}"#,
    );
    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature",
        br#"{"feature_name":"turn_on_led","params":{"first":"1"}}"#,
    );

    let out = responses(&device);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0]["message"], "LED on, sum=9");
    assert_eq!(out[1]["message"], "LED on, sum=1");
}

#[test]
fn cloud_message_without_name_is_dropped() {
    let config = DeviceConfig {
        product_id: "P-100".into(),
        ..DeviceConfig::default()
    };
    let (mut device, mut sink) = online_with_features(config);
    deliver(&mut device, &mut sink, "meo/AABBCCDDEEFF/feature", br#"{"first":"4"}"#);
    deliver(&mut device, &mut sink, "meo/AABBCCDDEEFF/feature", b"not json");
    assert!(device.transport().client().published().is_empty());
}

#[test]
fn handler_can_publish_events() {
    let (mut device, mut sink) = online_with_features(DeviceConfig::default());
    deliver(
        &mut device,
        &mut sink,
        "meo/AABBCCDDEEFF/feature/report_reading/invoke",
        b"{}",
    );

    let broker = device.transport().client();
    let event = broker
        .published_on("meo/AABBCCDDEEFF/event/humid_temp_update")
        .next()
        .unwrap();
    let v: Value = serde_json::from_slice(&event.payload).unwrap();
    assert_eq!(v["temperature"], "21.5");
    assert!(responses(&device)[0].get("message").is_none());
}

#[test]
fn application_event_publish() {
    let (mut device, _) = online_with_features(DeviceConfig::default());
    let mut values = ParamMap::new();
    values.insert("temperature".into(), "25".into());
    values.insert("humidity".into(), "48".into());
    assert!(device.publish_event("humid_temp_update", &values));

    let last = device.transport().client().published().last().unwrap();
    assert_eq!(last.topic, "meo/AABBCCDDEEFF/event/humid_temp_update");
    assert!(!last.retained);
    let v: Value = serde_json::from_slice(&last.payload).unwrap();
    assert_eq!(v["humidity"], "48");

    assert!(device.publish_event("", &values));
    assert_eq!(
        device.transport().client().published().last().unwrap().topic,
        "meo/AABBCCDDEEFF/event"
    );
}

#[test]
fn application_response_publish() {
    let (mut device, _) = online_with_features(DeviceConfig::default());
    let call = FeatureCall::new(TEST_DEVICE_ID, "turn_on_led");
    assert!(device.send_feature_response(&call, false, Some("busy")));
    let out = responses(&device);
    assert_eq!(out[0]["success"], false);
    assert_eq!(out[0]["message"], "busy");
}

#[test]
fn offline_publishes_report_false() {
    let (mut device, mut sink) = online_with_features(DeviceConfig::default());
    set_links(&mut device, false);
    device.tick(&mut sink);
    assert!(!device.publish_event("humid_temp_update", &ParamMap::new()));
}

#[test]
fn registration_limits_are_enforced() {
    let mut device = make_device(DeviceConfig::default(), MockStore::new());
    assert!(device.add_feature_method("turn_on_led", turn_on_led));
    assert!(!device.add_feature_method("turn_on_led", report_reading));
    assert!(!device.add_feature_method("", turn_on_led));

    for i in 1..MAX_FEATURE_METHODS {
        assert!(device.add_feature_method(&format!("m{}", i), turn_on_led));
    }
    assert!(!device.add_feature_method("one_too_many", turn_on_led));
}
