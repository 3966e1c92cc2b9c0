//! Port traits — the hexagonal boundary between the device core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ MeoDevice (domain)
//! ```
//!
//! Driven adapters (NVS, WiFi, BLE, MQTT client, system services) implement
//! these traits.  [`MeoDevice`](super::device::MeoDevice) consumes them via
//! generics, so the lifecycle and protocol code never touches ESP-IDF.
//!
//! Callbacks flow the other way through two narrow capability traits,
//! [`MessageHandler`] and [`WriteHandler`].  Drivers receive the handler
//! by `&mut` when they are pumped, so nothing stores a pointer back into
//! the device.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::provisioning::DataPoint;

/// Largest value the credential helpers read back in one go.
pub const MAX_STORED_VALUE: usize = 256;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The device emits structured [`DeviceEvent`](super::events::DeviceEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::DeviceEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage in a single namespace.
///
/// Keys are at most 15 bytes (NVS limit).  Writes MUST be atomic; the
/// ESP-IDF NVS API guarantees this per `nvs_commit()`.
pub trait StoragePort {
    /// Open the backing store.  Idempotent.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, key: &str) -> bool;

    /// Erase every key in the namespace.
    fn clear_all(&mut self) -> Result<(), StorageError>;

    /// Read a UTF-8 string value.
    fn read_string(&self, key: &str) -> Result<String, StorageError> {
        let mut buf = [0u8; MAX_STORED_VALUE];
        let len = self.read(key, &mut buf)?;
        core::str::from_utf8(&buf[..len])
            .map(str::to_owned)
            .map_err(|_| StorageError::InvalidData)
    }

    /// Write a UTF-8 string value.
    fn write_string(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(key, value.as_bytes())
    }

    /// Read a little-endian `i16`.
    fn read_i16(&self, key: &str) -> Result<i16, StorageError> {
        let mut buf = [0u8; 2];
        match self.read(key, &mut buf)? {
            2 => Ok(i16::from_le_bytes(buf)),
            _ => Err(StorageError::InvalidData),
        }
    }

    /// Write a little-endian `i16`.
    fn write_i16(&mut self, key: &str, value: i16) -> Result<(), StorageError> {
        self.write(key, &value.to_le_bytes())
    }
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: domain → WiFi station)
// ───────────────────────────────────────────────────────────────

/// Station-mode network link.
pub trait NetworkPort {
    /// Start associating with `ssid`.  Non-blocking: readiness is observed
    /// through [`is_connected`](Self::is_connected).
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), NetworkError>;

    /// Whether the station link is associated and has an address.
    fn is_connected(&self) -> bool;

    /// Hardware address of the station interface.
    fn mac_address(&self) -> [u8; 6];
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain ↔ BLE GATT server)
// ───────────────────────────────────────────────────────────────

/// Receives data-point writes from the radio driver.
pub trait WriteHandler {
    fn on_write(&mut self, point: DataPoint, value: &[u8]);
}

/// The short-range peripheral hosting the provisioning service.
pub trait RadioPort {
    fn start_advertising(&mut self);
    fn stop_advertising(&mut self);
    fn is_advertising(&self) -> bool;

    /// Set the value a central reads from `point`.
    fn set_value(&mut self, point: DataPoint, value: &str);

    /// Push the current value of `point` to a subscribed central.
    /// Returns `false` when nothing was sent (no central, no support).
    fn notify(&mut self, point: DataPoint) -> bool;

    /// Deliver every write queued since the last call.
    fn dispatch_writes(&mut self, handler: &mut dyn WriteHandler);
}

// ───────────────────────────────────────────────────────────────
// Broker client port (driven adapter: transport ↔ MQTT driver)
// ───────────────────────────────────────────────────────────────

/// Last-will message registered at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

/// Everything a driver needs for one connect handshake.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub will: Option<&'a LastWill>,
    pub keep_alive_secs: u16,
    pub timeout_ms: u32,
}

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Receives broker messages while the transport is pumped.
pub trait MessageHandler {
    fn on_message(&mut self, topic: &str, payload: &[u8]);
}

/// Low-level MQTT client.  All QoS is best-effort (0).
pub trait BrokerClient {
    /// Whether the network link underneath can carry traffic (address
    /// acquired).
    fn link_up(&self) -> bool;

    /// Perform a bounded connect handshake.
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), BrokerError>;

    fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError>;

    /// Next message received since the last call, if any.
    fn poll(&mut self) -> Option<InboundMessage>;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → clock / reset)
// ───────────────────────────────────────────────────────────────

/// Monotonic clock, blocking delay and reset.
pub trait SystemPort: DelayNs {
    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Restart the chip.  Does not return on hardware.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// Stored bytes do not decode as the requested type.
    InvalidData,
}

/// Errors from [`NetworkPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    InvalidSsid,
    InvalidPassword,
    DriverFailure,
}

/// Errors from [`BrokerClient`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The network link is down.
    LinkDown,
    /// Not connected to the broker.
    NotConnected,
    /// The handshake did not complete within the timeout.
    Timeout,
    /// The broker refused the connection (bad credentials, ...).
    Refused,
    /// Driver-level failure.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidData => write!(f, "stored value has unexpected format"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::DriverFailure => write!(f, "WiFi driver failure"),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkDown => write!(f, "network link down"),
            Self::NotConnected => write!(f, "not connected to broker"),
            Self::Timeout => write!(f, "broker handshake timed out"),
            Self::Refused => write!(f, "broker refused connection"),
            Self::Io => write!(f, "broker I/O error"),
        }
    }
}
