//! BLE provisioning service.
//!
//! ## GATT Service Layout
//!
//! Service `9f27f7f0-0000-1000-8000-00805f9b34fb`; every data point shares
//! the service UUID with the low byte of the first group replaced.
//!
//! | Data point        | UUID        | Access      | Store key   |
//! |-------------------|-------------|-------------|-------------|
//! | WiFi SSID         | `9f27f7f1-…` | Read+Write  | `wifi_ssid` |
//! | WiFi Password     | `9f27f7f2-…` | Write       | `wifi_pass` |
//! | Model             | `9f27f7f3-…` | Read        |             |
//! | Manufacturer      | `9f27f7f4-…` | Read        |             |
//! | Status            | `9f27f7f5-…` | Read+Notify |             |
//! | User id           | `9f27f7f6-…` | Read+Write  | `user_id`   |
//! | Transmit key      | `9f27f7f7-…` | Write       | `tx_key`    |
//! | Network list      | `9f27f7f8-…` | Read        |             |
//! | Product id        | `9f27f7f9-…` | Read        |             |
//! | Version           | `9f27f7fa-…` | Read        |             |
//! | Hardware address  | `9f27f7fb-…` | Read        |             |

pub mod reboot;
pub mod service;

pub use reboot::RebootSchedule;
pub use service::{ProvisioningError, ProvisioningReport, ProvisioningService, StaticInfo};

use crate::app::identity::{KEY_TX_KEY, KEY_USER_ID, KEY_WIFI_PASS, KEY_WIFI_SSID};

pub const SERVICE_UUID: u128 = 0x9f27f7f0_0000_1000_8000_00805f9b34fb;

/// Longest value accepted from a single write.
pub const MAX_WRITE_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// One characteristic of the provisioning service.
/// Must stay in sync with [`DataPoint::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataPoint {
    WifiSsid = 0,
    WifiPassword = 1,
    Model = 2,
    Manufacturer = 3,
    Status = 4,
    UserId = 5,
    TransmitKey = 6,
    NetworkList = 7,
    ProductId = 8,
    Version = 9,
    HardwareAddress = 10,
}

impl DataPoint {
    pub const COUNT: usize = 11;

    /// Registration order on the GATT server.
    pub const ALL: [Self; Self::COUNT] = [
        Self::WifiSsid,
        Self::WifiPassword,
        Self::Model,
        Self::Manufacturer,
        Self::Status,
        Self::UserId,
        Self::TransmitKey,
        Self::NetworkList,
        Self::ProductId,
        Self::Version,
        Self::HardwareAddress,
    ];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Characteristic UUID: `9f27f7XX-0000-1000-8000-00805f9b34fb`.
    pub fn uuid(self) -> u128 {
        const TAIL: u128 = 0x0000_1000_8000_00805f9b34fb;
        let group = 0x9f27_f7f1_u128 + self as u128;
        (group << 96) | TAIL
    }

    pub fn access(self) -> Access {
        match self {
            Self::WifiSsid | Self::UserId => Access::ReadWrite,
            Self::WifiPassword | Self::TransmitKey => Access::WriteOnly,
            Self::Model
            | Self::Manufacturer
            | Self::Status
            | Self::NetworkList
            | Self::ProductId
            | Self::Version
            | Self::HardwareAddress => Access::ReadOnly,
        }
    }

    pub fn notifies(self) -> bool {
        self == Self::Status
    }

    /// Credential-store key a write to this point is persisted under.
    pub fn store_key(self) -> Option<&'static str> {
        match self {
            Self::WifiSsid => Some(KEY_WIFI_SSID),
            Self::WifiPassword => Some(KEY_WIFI_PASS),
            Self::UserId => Some(KEY_USER_ID),
            Self::TransmitKey => Some(KEY_TX_KEY),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WifiSsid => "wifi_ssid",
            Self::WifiPassword => "wifi_pass",
            Self::Model => "model",
            Self::Manufacturer => "manufacturer",
            Self::Status => "status",
            Self::UserId => "user_id",
            Self::TransmitKey => "tx_key",
            Self::NetworkList => "network_list",
            Self::ProductId => "product_id",
            Self::Version => "version",
            Self::HardwareAddress => "hw_address",
        }
    }
}
