//! WiFi station-mode adapter.
//!
//! Implements [`NetworkPort`] — the hexagonal boundary for the station
//! link the broker session runs over.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi`.  `begin`
//!   only starts association; readiness is polled through
//!   [`NetworkPort::is_connected`].
//! - **all other targets**: a link flag the host tests flip directly.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{NetworkError, NetworkPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

pub fn validate_ssid(ssid: &str) -> Result<(), NetworkError> {
    // 1-32 bytes, space through tilde only.
    if ssid.is_empty() || ssid.len() > 32 || !ssid.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        return Err(NetworkError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), NetworkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(NetworkError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    associations: u32,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim_link: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_reachable: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            ssid: heapless::String::new(),
            associations: 0,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            associations: 0,
            sim_link: false,
            sim_reachable: true,
        }
    }

    /// SSID of the last association attempt.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Association attempts started so far.
    pub fn associations(&self) -> u32 {
        self.associations
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_begin(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| NetworkError::InvalidSsid)?,
            password: password
                .try_into()
                .map_err(|_| NetworkError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        // Drop any association in progress before switching networks.
        let _ = self.wifi.disconnect();
        self.wifi.set_configuration(&config).map_err(|e| {
            warn!("WiFi(espidf): set_configuration failed: {:?}", e);
            NetworkError::DriverFailure
        })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| {
                warn!("WiFi(espidf): start failed: {:?}", e);
                NetworkError::DriverFailure
            })?;
        }
        self.wifi.connect().map_err(|e| {
            warn!("WiFi(espidf): connect failed: {:?}", e);
            NetworkError::DriverFailure
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_begin(&mut self, _ssid: &str, _password: &str) -> Result<(), NetworkError> {
        self.sim_link = self.sim_reachable;
        Ok(())
    }

    // ── Simulation hooks ──────────────────────────────────────

    /// Force the link state, e.g. to simulate the access point vanishing.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_link(&mut self, up: bool) {
        self.sim_link = up;
    }

    /// Whether later associations succeed.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkPort
// ───────────────────────────────────────────────────────────────

impl NetworkPort for WifiAdapter {
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| NetworkError::InvalidSsid)?;
        self.associations = self.associations.wrapping_add(1);

        info!("WiFi: associating with '{}' (attempt {})", self.ssid, self.associations);
        self.platform_begin(ssid, password)
    }

    #[cfg(target_os = "espidf")]
    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_connected(&self) -> bool {
        self.sim_link
    }

    #[cfg(target_os = "espidf")]
    fn mac_address(&self) -> [u8; 6] {
        self.wifi
            .sta_netif()
            .get_mac()
            .unwrap_or_else(|_| super::device_id::read_mac())
    }

    #[cfg(not(target_os = "espidf"))]
    fn mac_address(&self) -> [u8; 6] {
        super::device_id::read_mac()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
