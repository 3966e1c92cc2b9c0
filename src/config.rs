//! Device configuration.
//!
//! Everything the application decides at build/boot time: device info shown
//! to the gateway, gateway address, broker policy and lifecycle timing.
//! Credentials are *not* here; they live in the credential store.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What the transport presents as the broker username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerUsername {
    /// Use the device id (the password is always the transmit key).
    DeviceId,
    /// Use a fixed literal for every device.
    Fixed(String),
}

/// Network credentials supplied by the application instead of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// Core device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Device info ---
    /// BLE advertising name
    pub label: String,
    /// Model string, declared to the gateway and exposed over BLE
    pub model: String,
    /// Manufacturer string, declared to the gateway and exposed over BLE
    pub manufacturer: String,
    /// Product identifier; non-empty selects payload-encoded ("cloud") invocation
    pub product_id: String,
    /// Build/version string exposed over BLE
    pub firmware_version: String,

    // --- Gateway / broker ---
    pub gateway_host: String,
    pub gateway_port: u16,
    pub broker_username: BrokerUsername,
    /// Retain flag of the `offline` last-will
    pub will_retained: bool,
    pub keep_alive_secs: u16,
    /// Upper bound of one connect handshake (milliseconds)
    pub handshake_timeout_ms: u32,

    // --- Station network ---
    /// Association budget (milliseconds)
    pub wifi_connect_timeout_ms: u32,
    /// Association poll granularity (milliseconds)
    pub wifi_poll_interval_ms: u32,
    /// Re-attempt association with unchanged credentials after this long
    pub wifi_retry_interval_ms: u32,
    pub preset_wifi: Option<WifiCredentials>,

    // --- Provisioning ---
    /// Status data point heartbeat (milliseconds)
    pub status_interval_ms: u32,
    pub auto_reboot_on_provision: bool,
    /// Delay between SSID+password written and restart (milliseconds)
    pub reboot_delay_ms: u32,
    /// Pause before the actual restart call (milliseconds)
    pub reboot_settle_ms: u32,
    pub keep_advertising_online: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            label: "MEO Device".into(),
            model: "MEO Module".into(),
            manufacturer: "ThingAI Lab".into(),
            product_id: String::new(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),

            gateway_host: "meo-open-service.local".into(),
            gateway_port: 1883,
            broker_username: BrokerUsername::DeviceId,
            will_retained: true,
            keep_alive_secs: 15,
            handshake_timeout_ms: 15_000,

            wifi_connect_timeout_ms: 15_000,
            wifi_poll_interval_ms: 100,
            wifi_retry_interval_ms: 60_000,
            preset_wifi: None,

            status_interval_ms: 2_000,
            auto_reboot_on_provision: true,
            reboot_delay_ms: 300,
            reboot_settle_ms: 100,
            keep_advertising_online: true,
        }
    }
}

impl DeviceConfig {
    /// True when a product identifier is configured.
    pub fn cloud_compatible(&self) -> bool {
        !self.product_id.trim().is_empty()
    }

    /// Reject values that would wedge the lifecycle.
    pub fn validate(&self) -> Result<(), Error> {
        if self.gateway_host.trim().is_empty() {
            return Err(Error::Config("gateway_host must not be empty"));
        }
        if self.gateway_port == 0 {
            return Err(Error::Config("gateway_port must be non-zero"));
        }
        if self.label.is_empty() || self.label.len() > 29 {
            return Err(Error::Config("label must be 1-29 bytes"));
        }
        if self.wifi_poll_interval_ms == 0 {
            return Err(Error::Config("wifi_poll_interval_ms must be non-zero"));
        }
        if self.wifi_poll_interval_ms > self.wifi_connect_timeout_ms {
            return Err(Error::Config(
                "wifi_poll_interval_ms must not exceed wifi_connect_timeout_ms",
            ));
        }
        if self.status_interval_ms == 0 {
            return Err(Error::Config("status_interval_ms must be non-zero"));
        }
        if let BrokerUsername::Fixed(name) = &self.broker_username {
            if name.is_empty() {
                return Err(Error::Config("fixed broker username must not be empty"));
            }
        }
        Ok(())
    }
}
