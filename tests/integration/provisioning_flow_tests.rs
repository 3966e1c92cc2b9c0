//! Integration tests for the BLE provisioning → WiFi → broker flow.
//!
//! Writes are injected through the simulated radio exactly as a central
//! would send them; the device drains them on its next tick.

use meo_device::app::events::DeviceEvent;
use meo_device::app::identity::{KEY_TX_KEY, KEY_USER_ID, KEY_WIFI_PASS, KEY_WIFI_SSID};
use meo_device::fsm::StateId;
use meo_device::provisioning::{DataPoint, MAX_WRITE_LEN};
use meo_device::DeviceConfig;

use crate::mock_hw::*;

fn waiting_device(config: DeviceConfig) -> (TestDevice, RecordingSink) {
    let mut device = make_device(config, MockStore::new());
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::ProvisioningWait);
    (device, sink)
}

fn write(device: &mut TestDevice, point: DataPoint, value: &[u8]) {
    device.provisioning_mut().radio_mut().inject_write(point, value);
}

#[test]
fn static_values_are_exposed_at_start() {
    let (device, _) = waiting_device(DeviceConfig::default());
    let radio = device.provisioning().radio();
    assert_eq!(radio.value(DataPoint::Model), "MEO Module");
    assert_eq!(radio.value(DataPoint::Manufacturer), "ThingAI Lab");
    assert_eq!(radio.value(DataPoint::HardwareAddress), "AA:BB:CC:DD:EE:FF");
    assert_eq!(radio.value(DataPoint::NetworkList), "");
    assert_eq!(radio.value(DataPoint::ProductId), "");
}

#[test]
fn full_provisioning_flow_ends_in_reboot() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());

    write(&mut device, DataPoint::WifiSsid, b"  Lab \n");
    write(&mut device, DataPoint::WifiPassword, b"password1");
    write(&mut device, DataPoint::UserId, b"u1");
    write(&mut device, DataPoint::TransmitKey, b"key-123");
    device.tick(&mut sink);

    // Persisted trimmed, mirrored on the readable points only.
    assert_eq!(device.store().get(KEY_WIFI_SSID), Some("Lab"));
    assert_eq!(device.store().get(KEY_WIFI_PASS), Some("password1"));
    assert_eq!(device.store().get(KEY_USER_ID), Some("u1"));
    assert_eq!(device.store().get(KEY_TX_KEY), Some("key-123"));
    let radio = device.provisioning().radio();
    assert_eq!(radio.value(DataPoint::WifiSsid), "Lab");
    assert_eq!(radio.value(DataPoint::UserId), "u1");
    assert_eq!(radio.value(DataPoint::WifiPassword), "");
    assert_eq!(radio.value(DataPoint::TransmitKey), "");
    assert_eq!(
        sink.count(|e| matches!(e, DeviceEvent::ProvisioningWrite(_))),
        4
    );

    // New credentials trigger an association right away.
    assert_eq!(
        device.network_mut().begins,
        vec![("Lab".to_owned(), "password1".to_owned())]
    );
    assert_eq!(device.provisioning().reboot_schedule().fire_at_ms(), Some(300));

    device.tick(&mut sink);
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::DeclaredOnline);
    assert_eq!(
        device
            .transport()
            .client()
            .published_on("meo/u1/AABBCCDDEEFF/declare")
            .count(),
        1
    );

    device.system_mut().advance(300);
    device.tick(&mut sink);
    assert_eq!(device.state(), StateId::Rebooting);
    assert_eq!(device.system().restarts, 1);
    assert!(sink.events.contains(&DeviceEvent::Rebooting));
    assert!(
        sink.transitions()
            .contains(&(StateId::DeclaredOnline, StateId::Rebooting))
    );

    // Terminal: further ticks do nothing.
    device.tick(&mut sink);
    assert_eq!(device.system().restarts, 1);
}

#[test]
fn password_before_ssid_also_arms_reboot() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    write(&mut device, DataPoint::WifiPassword, b"password1");
    device.tick(&mut sink);
    assert!(!device.provisioning().reboot_schedule().is_scheduled());

    device.system_mut().advance(50);
    write(&mut device, DataPoint::WifiSsid, b"Lab");
    device.tick(&mut sink);
    assert_eq!(device.provisioning().reboot_schedule().fire_at_ms(), Some(350));
}

#[test]
fn rewriting_does_not_rearm_reboot() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    write(&mut device, DataPoint::WifiSsid, b"Lab");
    write(&mut device, DataPoint::WifiPassword, b"password1");
    device.tick(&mut sink);

    device.system_mut().advance(200);
    write(&mut device, DataPoint::WifiSsid, b"Lab2");
    device.tick(&mut sink);
    assert_eq!(device.provisioning().reboot_schedule().fire_at_ms(), Some(300));
}

#[test]
fn auto_reboot_can_be_disabled() {
    let config = DeviceConfig {
        auto_reboot_on_provision: false,
        ..DeviceConfig::default()
    };
    let (mut device, mut sink) = waiting_device(config);
    write(&mut device, DataPoint::WifiSsid, b"Lab");
    write(&mut device, DataPoint::WifiPassword, b"password1");
    write(&mut device, DataPoint::TransmitKey, b"key-123");
    device.tick(&mut sink);

    device.system_mut().advance(10_000);
    for _ in 0..3 {
        device.tick(&mut sink);
    }
    assert_eq!(device.state(), StateId::DeclaredOnline);
    assert_eq!(device.system().restarts, 0);
}

#[test]
fn provisioned_values_replace_preset_after_boot() {
    let config = DeviceConfig {
        preset_wifi: Some(meo_device::config::WifiCredentials {
            ssid: "Preset".into(),
            password: "presetpass".into(),
        }),
        auto_reboot_on_provision: false,
        ..DeviceConfig::default()
    };
    let mut device = make_device(config, MockStore::new());
    device.network_mut().reachable = false;
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);

    device.network_mut().reachable = true;
    write(&mut device, DataPoint::WifiSsid, b"Lab");
    write(&mut device, DataPoint::WifiPassword, b"password1");
    device.tick(&mut sink);
    assert_eq!(device.record().wifi_ssid, "Lab");
    assert_eq!(
        device.network_mut().begins.last(),
        Some(&("Lab".to_owned(), "password1".to_owned()))
    );
}

#[test]
fn preset_survives_identity_writes() {
    let config = DeviceConfig {
        preset_wifi: Some(meo_device::config::WifiCredentials {
            ssid: "Preset".into(),
            password: "presetpass".into(),
        }),
        ..DeviceConfig::default()
    };
    let mut device = make_device(config, MockStore::new());
    device.network_mut().reachable = false;
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    device.tick(&mut sink);

    write(&mut device, DataPoint::UserId, b"u1");
    device.tick(&mut sink);
    assert_eq!(device.record().wifi_ssid, "Preset");
    assert_eq!(device.record().user_id, "u1");
}

#[test]
fn invalid_writes_are_rejected() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    let writes_before = device.store().writes;

    write(&mut device, DataPoint::WifiSsid, &[b'x'; MAX_WRITE_LEN + 10]);
    write(&mut device, DataPoint::UserId, &[0xC3, 0x28]);
    write(&mut device, DataPoint::Model, b"Hacked");
    device.tick(&mut sink);

    assert_eq!(device.store().writes, writes_before);
    assert!(device.store().get(KEY_WIFI_SSID).is_none());
    assert_eq!(device.provisioning().radio().value(DataPoint::Model), "MEO Module");
    assert_eq!(
        sink.count(|e| matches!(e, DeviceEvent::ProvisioningWrite(_))),
        0
    );
}

#[test]
fn maximal_write_is_accepted() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    let value = "k".repeat(MAX_WRITE_LEN);
    write(&mut device, DataPoint::TransmitKey, value.as_bytes());
    device.tick(&mut sink);
    assert_eq!(device.store().get(KEY_TX_KEY), Some(value.as_str()));
}

#[test]
fn unchanged_value_skips_flash_write() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    write(&mut device, DataPoint::UserId, b"u1");
    device.tick(&mut sink);
    let writes = device.store().writes;

    write(&mut device, DataPoint::UserId, b"u1");
    device.tick(&mut sink);
    assert_eq!(device.store().writes, writes);
}

#[test]
fn status_heartbeat_follows_interval() {
    let (mut device, mut sink) = waiting_device(DeviceConfig::default());
    device.provisioning_mut().radio_mut().set_central_connected(true);
    device.tick(&mut sink);
    let baseline = device.provisioning().radio().notify_count();

    device.system_mut().advance(1_999);
    device.tick(&mut sink);
    assert_eq!(device.provisioning().radio().notify_count(), baseline);

    device.system_mut().advance(1);
    device.tick(&mut sink);
    assert_eq!(device.provisioning().radio().notify_count(), baseline + 1);
    assert_eq!(
        device.provisioning().radio().value(DataPoint::Status),
        "wifi: disconnected, mqtt: disconnected"
    );
}
