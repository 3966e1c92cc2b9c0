//! Connectivity snapshot shown on the provisioning status data point.

use core::fmt;

/// State of one link as shown to the companion app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl LinkState {
    pub fn from_bool(up: bool) -> Self {
        if up { Self::Connected } else { Self::Disconnected }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Derived every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub wifi: LinkState,
    pub mqtt: LinkState,
}

impl ConnectivityStatus {
    pub fn new(wifi_up: bool, mqtt_up: bool) -> Self {
        Self {
            wifi: LinkState::from_bool(wifi_up),
            mqtt: LinkState::from_bool(mqtt_up),
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wifi: {}, mqtt: {}", self.wifi.as_str(), self.mqtt.as_str())
    }
}

/// Status text before the first snapshot has been taken.
pub const UNKNOWN_STATUS: &str = "wifi: unknown, mqtt: unknown";
