//! Device identity and the persisted provisioning record.
//!
//! The device id is derived from the station MAC and never stored.  The
//! rest of the identity (transmit key, user id) and the WiFi credentials
//! are written by the provisioning service and read back from here.

use core::fmt::Write;

use log::{debug, warn};

use super::ports::{StorageError, StoragePort};

// ── Persisted keys ────────────────────────────────────────────

pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASS: &str = "wifi_pass";
pub const KEY_USER_ID: &str = "user_id";
pub const KEY_TX_KEY: &str = "tx_key";

/// 12 uppercase hex characters.
pub type DeviceId = heapless::String<12>;

/// Derive the device id from the full 6-byte hardware address.
/// Format: `AABBCCDDEEFF`.
pub fn device_id_from_mac(mac: &[u8; 6]) -> DeviceId {
    let mut id = DeviceId::new();
    for b in mac {
        let _ = write!(id, "{:02X}", b);
    }
    id
}

/// Colon-separated form exposed on the hardware-address data point.
pub fn format_mac(mac: &[u8; 6]) -> heapless::String<17> {
    let mut s = heapless::String::<17>::new();
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{:02X}", b);
    }
    s
}

// ── Store helpers ─────────────────────────────────────────────

/// Read a string, mapping "missing" to an empty string.
pub fn load_or_empty(store: &impl StoragePort, key: &str) -> Result<String, StorageError> {
    match store.read_string(key) {
        Ok(v) => Ok(v),
        Err(StorageError::NotFound) => Ok(String::new()),
        Err(e) => Err(e),
    }
}

/// Write a string unless the stored value is already identical.
/// Returns `true` when flash was actually written.
pub fn save_if_changed(
    store: &mut impl StoragePort,
    key: &str,
    value: &str,
) -> Result<bool, StorageError> {
    if let Ok(current) = store.read_string(key) {
        if current == value {
            debug!("store: '{}' unchanged, skipping write", key);
            return Ok(false);
        }
    }
    store.write_string(key, value)?;
    Ok(true)
}

// ── ProvisioningRecord ────────────────────────────────────────

/// Everything the companion app provisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningRecord {
    pub wifi_ssid: String,
    /// `None` until a password has been written.  An open network stores
    /// an explicit empty password.
    pub wifi_pass: Option<String>,
    pub user_id: String,
    pub tx_key: String,
}

impl ProvisioningRecord {
    /// Load all four fields.  Missing keys read as empty (the password as
    /// `None`); an unreadable key is logged and treated as missing.
    pub fn load(store: &impl StoragePort) -> Self {
        let field = |key: &str| {
            load_or_empty(store, key).unwrap_or_else(|e| {
                warn!("store: failed to read '{}': {}", key, e);
                String::new()
            })
        };
        let wifi_pass = match store.read_string(KEY_WIFI_PASS) {
            Ok(pass) => Some(pass),
            Err(StorageError::NotFound) => None,
            Err(e) => {
                warn!("store: failed to read '{}': {}", KEY_WIFI_PASS, e);
                None
            }
        };
        Self {
            wifi_ssid: field(KEY_WIFI_SSID),
            wifi_pass,
            user_id: field(KEY_USER_ID),
            tx_key: field(KEY_TX_KEY),
        }
    }

    /// Both an SSID and a password (possibly empty) have been provisioned.
    pub fn has_wifi(&self) -> bool {
        !self.wifi_ssid.is_empty() && self.wifi_pass.is_some()
    }

    /// Password to associate with; empty for an open network.
    pub fn wifi_password(&self) -> &str {
        self.wifi_pass.as_deref().unwrap_or("")
    }
}

// ── DeviceIdentity ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub transmit_key: String,
    pub user_id: String,
    pub cloud_compatible: bool,
}

impl DeviceIdentity {
    pub fn new(mac: &[u8; 6], cloud_compatible: bool) -> Self {
        Self {
            device_id: device_id_from_mac(mac),
            transmit_key: String::new(),
            user_id: String::new(),
            cloud_compatible,
        }
    }

    /// Take the externally provisioned fields from `record`.
    pub fn apply(&mut self, record: &ProvisioningRecord) {
        self.transmit_key.clone_from(&record.tx_key);
        self.user_id.clone_from(&record.user_id);
    }

    /// Both device id and transmit key are non-empty.
    pub fn has_credentials(&self) -> bool {
        !self.device_id.is_empty() && !self.transmit_key.is_empty()
    }
}
