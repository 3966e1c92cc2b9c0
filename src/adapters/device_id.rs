//! Factory MAC address and the names derived from it.
//!
//! The MAC is burned into eFuse, so everything derived here is stable
//! across reboots and re-provisioning:
//! - the advertised BLE local name (`MEO-XXYYZZ`)
//! - the station hostname (`meo-xxyyzz`)

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// BLE local name: `MEO-XXYYZZ` from the last 3 MAC bytes.
pub fn ble_name(mac: &MacAddress) -> heapless::String<16> {
    let mut name = heapless::String::new();
    let _ = write!(name, "MEO-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    name
}

/// Station hostname: `meo-xxyyzz` (lowercase).
pub fn hostname(mac: &MacAddress) -> heapless::String<16> {
    let mut name = heapless::String::new();
    let _ = write!(name, "meo-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
