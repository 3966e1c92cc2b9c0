//! Integration tests: MeoDevice start/tick → lifecycle FSM → ports.

use meo_device::Error;
use meo_device::app::events::DeviceEvent;
use meo_device::app::identity::{KEY_TX_KEY, KEY_WIFI_SSID};
use meo_device::app::ports::{StorageError, SystemPort};
use meo_device::config::{BrokerUsername, WifiCredentials};
use meo_device::fsm::StateId;
use meo_device::provisioning::DataPoint;
use meo_device::DeviceConfig;

use crate::mock_hw::*;

// ── Bootstrapping ─────────────────────────────────────────────

#[test]
fn fresh_device_waits_for_provisioning() {
    let mut device = make_device(DeviceConfig::default(), MockStore::new());
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    assert_eq!(device.state(), StateId::Bootstrapping);
    assert!(device.provisioning().is_advertising());
    assert!(device.network_mut().begins.is_empty());

    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::ProvisioningWait);
    assert_eq!(
        sink.transitions(),
        vec![(StateId::Bootstrapping, StateId::ProvisioningWait)]
    );

    // Nothing to associate with: stays put.
    for _ in 0..5 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::ProvisioningWait);
    assert_eq!(device.transport().client().connect_attempts(), 0);
}

#[test]
fn ssid_without_password_is_not_provisioned() {
    let mut store = MockStore::new();
    store.data.insert(KEY_WIFI_SSID.to_owned(), b"Lab".to_vec());
    store.data.insert(KEY_TX_KEY.to_owned(), b"key-123".to_vec());
    let mut device = make_device(DeviceConfig::default(), store);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    for _ in 0..4 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::ProvisioningWait);
    assert!(device.provisioning().is_advertising());
    assert!(device.network_mut().begins.is_empty());
    assert_eq!(device.transport().client().connect_attempts(), 0);
}

#[test]
fn stored_empty_password_joins_open_network() {
    let store = MockStore::provisioned("OpenCafe", "", "key-123", "");
    let mut device = make_device(DeviceConfig::default(), store);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    assert_eq!(
        device.network_mut().begins,
        vec![("OpenCafe".to_owned(), String::new())]
    );
}

#[test]
fn started_event_carries_device_id() {
    let mut device = make_device(DeviceConfig::default(), MockStore::new());
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    assert_eq!(device.identity().device_id.as_str(), TEST_DEVICE_ID);
    assert!(matches!(
        &sink.events[0],
        DeviceEvent::Started { device_id } if device_id.as_str() == TEST_DEVICE_ID
    ));
}

#[test]
fn start_twice_is_rejected() {
    let mut device = make_device(DeviceConfig::default(), MockStore::new());
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    assert_eq!(device.start(&mut sink), Err(Error::Init("already started")));
}

#[test]
fn store_failure_is_fatal() {
    let mut store = MockStore::new();
    store.fail_init = true;
    let mut device = make_device(DeviceConfig::default(), store);
    let mut sink = RecordingSink::new();

    assert_eq!(
        device.start(&mut sink),
        Err(Error::Storage(StorageError::IoError))
    );
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::Bootstrapping);
    assert!(sink.events.is_empty());
}

#[test]
fn invalid_config_is_fatal() {
    let config = DeviceConfig {
        gateway_port: 0,
        ..DeviceConfig::default()
    };
    let mut device = make_device(config, MockStore::new());
    let mut sink = RecordingSink::new();
    assert!(matches!(device.start(&mut sink), Err(Error::Config(_))));
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn provisioned_device_declares_online() {
    let (device, sink) = online_device();

    assert_eq!(
        sink.transitions(),
        vec![
            (StateId::Bootstrapping, StateId::Connecting),
            (StateId::Connecting, StateId::DeclaredOnline),
        ]
    );

    let broker = device.transport().client();
    assert_eq!(broker.connect_attempts(), 1);
    assert_eq!(
        broker.subscriptions(),
        ["meo/AABBCCDDEEFF/feature/+/invoke".to_owned()]
    );

    let declared: Vec<_> = broker.published_on("meo/AABBCCDDEEFF/declare").collect();
    assert_eq!(declared.len(), 1);
    assert!(!declared[0].retained);

    let status: Vec<_> = broker.published_on("meo/AABBCCDDEEFF/status").collect();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].payload_str(), "online");
    assert!(status[0].retained);

    assert_eq!(
        sink.count(|e| matches!(e, DeviceEvent::Declared { .. })),
        1
    );
}

#[test]
fn boot_association_uses_stored_credentials() {
    let (mut device, sink) = online_device();
    assert_eq!(
        device.network_mut().begins,
        vec![("Lab".to_owned(), "password1".to_owned())]
    );
    assert!(sink.events.contains(&DeviceEvent::Association {
        ssid: "Lab".into(),
        connected: true,
    }));
}

#[test]
fn connect_presents_identity_and_will() {
    let (device, _) = online_device();
    let opts = device.transport().client().last_options().unwrap();
    assert_eq!(opts.client_id, "meo-AABBCCDDEEFF");
    assert_eq!(opts.username.as_deref(), Some(TEST_DEVICE_ID));
    assert_eq!(opts.password.as_deref(), Some("key-123"));
    let will = opts.will.as_ref().unwrap();
    assert_eq!(will.topic, "meo/AABBCCDDEEFF/status");
    assert_eq!(will.payload, b"offline");
    assert!(will.retained);
}

#[test]
fn fixed_username_policy_applies() {
    let config = DeviceConfig {
        broker_username: BrokerUsername::Fixed("meo".into()),
        will_retained: false,
        ..DeviceConfig::default()
    };
    let (device, _) = online_device_with(config, "");
    let opts = device.transport().client().last_options().unwrap();
    assert_eq!(opts.username.as_deref(), Some("meo"));
    assert!(!opts.will.as_ref().unwrap().retained);
}

#[test]
fn user_id_scopes_topics() {
    let (device, _) = online_device_with(DeviceConfig::default(), "u1");
    let broker = device.transport().client();
    assert_eq!(broker.published_on("meo/u1/AABBCCDDEEFF/declare").count(), 1);
    assert_eq!(
        broker.subscriptions(),
        ["meo/u1/AABBCCDDEEFF/feature/+/invoke".to_owned()]
    );
}

#[test]
fn connectivity_summary_reaches_status_point() {
    let (device, sink) = online_device();
    let expected = "wifi: connected, mqtt: connected";
    assert_eq!(device.provisioning().status_text(), expected);
    assert_eq!(device.provisioning().radio().value(DataPoint::Status), expected);
    assert_eq!(device.connectivity().unwrap().to_string(), expected);
    assert!(sink.count(|e| matches!(e, DeviceEvent::ConnectivityChanged(_))) >= 1);
}

#[test]
fn advertising_can_stop_when_online() {
    let config = DeviceConfig {
        keep_advertising_online: false,
        ..DeviceConfig::default()
    };
    let (mut device, mut sink) = online_device_with(config, "");
    assert!(!device.provisioning().is_advertising());

    set_links(&mut device, false);
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::ProvisioningWait);
    assert!(device.provisioning().is_advertising());
}

// ── Missing transmit key ──────────────────────────────────────

#[test]
fn connecting_waits_for_transmit_key() {
    let store = MockStore::provisioned("Lab", "password1", "", "");
    let mut device = make_device(DeviceConfig::default(), store);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    for _ in 0..4 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::Connecting);
    assert_eq!(device.transport().client().connect_attempts(), 0);

    let now = device.system().uptime_ms();
    device
        .provisioning_mut()
        .radio_mut()
        .inject_write(DataPoint::TransmitKey, b"key-9");
    device.tick(&mut sink);
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::DeclaredOnline);
    assert_eq!(
        device.transport().client().last_options().unwrap().password.as_deref(),
        Some("key-9")
    );
    // Only the transmit key was written: no reboot is scheduled.
    assert!(!device.provisioning().reboot_schedule().is_scheduled());
    assert_eq!(device.system().uptime_ms(), now);
}

// ── Link loss and recovery ────────────────────────────────────

#[test]
fn broker_loss_returns_to_connecting() {
    let (mut device, mut sink) = online_device();
    device.transport_mut().client_mut().drop_session();

    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::Connecting);

    // Next tick reconnects and declares again.
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::DeclaredOnline);
    let broker = device.transport().client();
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(broker.published_on("meo/AABBCCDDEEFF/declare").count(), 2);
}

#[test]
fn refused_broker_keeps_retrying() {
    let store = MockStore::provisioned("Lab", "password1", "wrong", "");
    let mut device = make_device(DeviceConfig::default(), store);
    device.transport_mut().client_mut().refuse_connections(true);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    for _ in 0..5 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::Connecting);
    assert!(device.transport().client().connect_attempts() >= 3);
    assert!(device.transport().client().published().is_empty());
}

#[test]
fn wifi_loss_falls_back_and_retries_after_interval() {
    let (mut device, mut sink) = online_device();
    set_links(&mut device, false);

    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::ProvisioningWait);
    assert_eq!(
        device.provisioning().status_text(),
        "wifi: disconnected, mqtt: disconnected"
    );

    // Same credentials: no retry before the interval elapses.
    device.network_mut().reachable = true;
    device.tick(&mut sink);
    assert_eq!(device.network_mut().begins.len(), 1);

    device.system_mut().advance(60_000);
    device.transport_mut().client_mut().set_link(true);
    device.tick(&mut sink);
    assert_eq!(device.network_mut().begins.len(), 2);

    for _ in 0..3 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::DeclaredOnline);
}

#[test]
fn unreachable_network_spends_association_budget_at_boot() {
    let mut device = make_device(
        DeviceConfig::default(),
        MockStore::provisioned("Lab", "password1", "key-123", ""),
    );
    device.network_mut().reachable = false;
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    assert_eq!(device.system().uptime_ms(), 15_000);
    assert!(sink.events.contains(&DeviceEvent::Association {
        ssid: "Lab".into(),
        connected: false,
    }));

    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::ProvisioningWait);
}

// ── Preset credentials ────────────────────────────────────────

#[test]
fn preset_wifi_overrides_store_at_boot() {
    let config = DeviceConfig {
        preset_wifi: Some(WifiCredentials {
            ssid: "Preset".into(),
            password: "presetpass".into(),
        }),
        ..DeviceConfig::default()
    };
    let store = MockStore::provisioned("Lab", "password1", "key-123", "");
    let mut device = make_device(config, store);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();

    assert_eq!(
        device.network_mut().begins,
        vec![("Preset".to_owned(), "presetpass".to_owned())]
    );
    // Preset values are not written back to the store.
    assert_eq!(device.store().get("wifi_ssid"), Some("Lab"));
}

// ── Application publishing ────────────────────────────────────

#[test]
fn publish_status_requires_session() {
    let mut device = make_device(DeviceConfig::default(), MockStore::new());
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    assert!(!device.publish_status(true));

    let (mut online, _) = online_device();
    assert!(online.publish_status(false));
    let last = online.transport().client().published().last().unwrap();
    assert_eq!(last.payload_str(), "offline");
    assert!(last.retained);
}

#[test]
fn gateway_can_be_retargeted_before_connect() {
    let store = MockStore::provisioned("Lab", "password1", "key-123", "");
    let mut device = make_device(DeviceConfig::default(), store);
    device.set_gateway("10.0.0.5", 1884);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);
    device.tick(&mut sink);

    let opts = device.transport().client().last_options().unwrap();
    assert_eq!(opts.host, "10.0.0.5");
    assert_eq!(opts.port, 1884);
}
