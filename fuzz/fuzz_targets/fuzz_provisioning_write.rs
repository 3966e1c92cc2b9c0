//! Fuzz target: `ProvisioningService::handle_write`
//!
//! The first byte picks the data point, the rest is the raw write.  The
//! service must never panic, and whatever it persists is valid UTF-8,
//! already trimmed and within the write limit.
//!
//! cargo fuzz run fuzz_provisioning_write

#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use meo_device::adapters::ble::BleAdapter;
use meo_device::app::ports::{StorageError, StoragePort};
use meo_device::provisioning::{DataPoint, MAX_WRITE_LEN, ProvisioningService};
use meo_device::DeviceConfig;

#[derive(Default)]
struct MemStore(HashMap<String, Vec<u8>>);

impl StoragePort for MemStore {
    fn init(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let d = self.0.get(key).ok_or(StorageError::NotFound)?;
        if d.len() > buf.len() {
            return Err(StorageError::InvalidData);
        }
        buf[..d.len()].copy_from_slice(d);
        Ok(d.len())
    }
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.0.remove(key);
        Ok(())
    }
    fn exists(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
    fn clear_all(&mut self) -> Result<(), StorageError> {
        self.0.clear();
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, raw)) = data.split_first() else {
        return;
    };
    let point = DataPoint::ALL[usize::from(selector) % DataPoint::COUNT];

    let mut svc = ProvisioningService::new(BleAdapter::new("meo-fuzz"), &DeviceConfig::default());
    let mut store = MemStore::default();
    let accepted = svc.handle_write(&mut store, point, raw, 0).is_ok();

    if !point.access().writable() {
        assert!(!accepted);
    }
    for value in store.0.values() {
        let s = core::str::from_utf8(value).expect("stored value is UTF-8");
        assert_eq!(s, s.trim());
        assert!(value.len() <= MAX_WRITE_LEN);
    }
});
