//! Mock ports for integration tests.
//!
//! The store, station link and clock are mocks that record what the device
//! asked of them; the radio and broker are the crate's own host
//! simulations.

use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use meo_device::adapters::ble::BleAdapter;
use meo_device::adapters::mqtt::SimBroker;
use meo_device::app::events::DeviceEvent;
use meo_device::app::identity::{KEY_TX_KEY, KEY_USER_ID, KEY_WIFI_PASS, KEY_WIFI_SSID};
use meo_device::app::ports::{
    EventSink, NetworkError, NetworkPort, StorageError, StoragePort, SystemPort,
};
use meo_device::fsm::StateId;
use meo_device::{DeviceConfig, MeoDevice};

pub const TEST_MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
pub const TEST_DEVICE_ID: &str = "AABBCCDDEEFF";

pub type TestDevice = MeoDevice<MockStore, MockNetwork, BleAdapter, SimBroker, MockClock>;

// ── MockStore ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockStore {
    pub data: HashMap<String, Vec<u8>>,
    pub writes: usize,
    pub fail_init: bool,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding a complete provisioning record.
    pub fn provisioned(ssid: &str, pass: &str, tx_key: &str, user_id: &str) -> Self {
        let mut store = Self::new();
        for (key, value) in [
            (KEY_WIFI_SSID, ssid),
            (KEY_WIFI_PASS, pass),
            (KEY_TX_KEY, tx_key),
            (KEY_USER_ID, user_id),
        ] {
            store.data.insert(key.to_owned(), value.as_bytes().to_vec());
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|v| core::str::from_utf8(v).ok())
    }
}

impl StoragePort for MockStore {
    fn init(&mut self) -> Result<(), StorageError> {
        if self.fail_init {
            return Err(StorageError::IoError);
        }
        Ok(())
    }

    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.data.get(key).ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::InvalidData);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.writes += 1;
        self.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn clear_all(&mut self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }
}

// ── MockNetwork ───────────────────────────────────────────────

pub struct MockNetwork {
    pub link: bool,
    /// Whether `begin` brings the link up.
    pub reachable: bool,
    pub begins: Vec<(String, String)>,
}

#[allow(dead_code)]
impl MockNetwork {
    pub fn new() -> Self {
        Self {
            link: false,
            reachable: true,
            begins: Vec::new(),
        }
    }
}

impl NetworkPort for MockNetwork {
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        if ssid.is_empty() {
            return Err(NetworkError::InvalidSsid);
        }
        self.begins.push((ssid.to_owned(), password.to_owned()));
        self.link = self.reachable;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link
    }

    fn mac_address(&self) -> [u8; 6] {
        TEST_MAC
    }
}

// ── MockClock ─────────────────────────────────────────────────

/// Time only moves when a test advances it or the device delays.
#[derive(Default)]
pub struct MockClock {
    now_ns: u64,
    pub restarts: u32,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ns += ms * 1_000_000;
    }
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns += u64::from(ns);
    }
}

impl SystemPort for MockClock {
    fn uptime_ms(&self) -> u64 {
        self.now_ns / 1_000_000
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<DeviceEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(from, to)` transition in emission order.
    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.events.push(event.clone());
    }
}

// ── Builders ──────────────────────────────────────────────────

#[allow(dead_code)]
pub fn make_device(config: DeviceConfig, store: MockStore) -> TestDevice {
    MeoDevice::new(
        config,
        store,
        MockNetwork::new(),
        BleAdapter::new("meo-test"),
        SimBroker::new(),
        MockClock::new(),
    )
}

/// Started and ticked until declared online, with the given config.
#[allow(dead_code)]
pub fn online_device_with(config: DeviceConfig, user_id: &str) -> (TestDevice, RecordingSink) {
    let store = MockStore::provisioned("Lab", "password1", "key-123", user_id);
    let mut device = make_device(config, store);
    let mut sink = RecordingSink::new();
    device.start(&mut sink).unwrap();
    for _ in 0..4 {
        device.tick(&mut sink);
        if device.state() == StateId::DeclaredOnline {
            break;
        }
    }
    assert_eq!(device.state(), StateId::DeclaredOnline);
    (device, sink)
}

#[allow(dead_code)]
pub fn online_device() -> (TestDevice, RecordingSink) {
    online_device_with(DeviceConfig::default(), "")
}

/// Bring both the station link and the broker link up or down.
#[allow(dead_code)]
pub fn set_links(device: &mut TestDevice, up: bool) {
    device.network_mut().link = up;
    device.transport_mut().client_mut().set_link(up);
}
