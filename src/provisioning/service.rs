//! Provisioning write protocol, status heartbeat and reboot schedule.
//!
//! ```text
//!  central write ──▶ RadioPort queue ──▶ poll() ──▶ WriteSession::on_write
//!                                                     │ trim
//!                                                     │ persist (StoragePort)
//!                                                     │ arm reboot (SSID+password)
//!                                                     ▼
//!                                             ProvisioningReport
//! ```

use core::fmt;

use log::{info, warn};

use crate::app::identity::save_if_changed;
use crate::app::ports::{RadioPort, StorageError, StoragePort, WriteHandler};
use crate::app::status::{ConnectivityStatus, UNKNOWN_STATUS};
use crate::config::DeviceConfig;

use super::reboot::RebootSchedule;
use super::{DataPoint, MAX_WRITE_LEN};

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    NotWritable,
    DataTooLong,
    InvalidUtf8,
    Storage(StorageError),
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotWritable => write!(f, "data point is read-only"),
            Self::DataTooLong => write!(f, "write exceeds {} bytes", MAX_WRITE_LEN),
            Self::InvalidUtf8 => write!(f, "write contains invalid UTF-8"),
            Self::Storage(e) => write!(f, "persist failed: {}", e),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Report
// ───────────────────────────────────────────────────────────────

/// What happened during one [`ProvisioningService::poll`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    /// Points written and persisted, in arrival order.
    pub written: heapless::Vec<DataPoint, 8>,
    /// The reboot deadline passed on this poll.
    pub reboot_due: bool,
}

impl ProvisioningReport {
    pub fn credentials_changed(&self) -> bool {
        !self.written.is_empty()
    }
}

/// Read-only values exposed at startup.
#[derive(Debug, Clone, Copy)]
pub struct StaticInfo<'a> {
    pub model: &'a str,
    pub manufacturer: &'a str,
    pub product_id: &'a str,
    pub version: &'a str,
    pub hw_address: &'a str,
    pub wifi_ssid: &'a str,
    pub user_id: &'a str,
}

// ───────────────────────────────────────────────────────────────
// Session state (one boot)
// ───────────────────────────────────────────────────────────────

struct Session {
    ssid_written: bool,
    pass_written: bool,
    auto_reboot: bool,
    reboot_delay_ms: u32,
    reboot: RebootSchedule,
    /// Readable points whose value must be mirrored back to the radio.
    reflect: heapless::Vec<(DataPoint, String), 4>,
    report: ProvisioningReport,
}

impl Session {
    fn apply_write(
        &mut self,
        store: &mut impl StoragePort,
        point: DataPoint,
        raw: &[u8],
        now_ms: u64,
    ) -> Result<(), ProvisioningError> {
        let key = match point.store_key() {
            Some(key) if point.access().writable() => key,
            _ => return Err(ProvisioningError::NotWritable),
        };
        if raw.len() > MAX_WRITE_LEN {
            return Err(ProvisioningError::DataTooLong);
        }
        let value = core::str::from_utf8(raw)
            .map_err(|_| ProvisioningError::InvalidUtf8)?
            .trim();

        save_if_changed(store, key, value).map_err(ProvisioningError::Storage)?;
        info!("PROV: {} written (len={})", point.name(), value.len());

        match point {
            DataPoint::WifiSsid => self.ssid_written = true,
            DataPoint::WifiPassword => self.pass_written = true,
            _ => {}
        }
        if point.access().readable() {
            self.reflect.retain(|(p, _)| *p != point);
            if self.reflect.push((point, value.to_owned())).is_err() {
                warn!("PROV: reflect queue full, {} not mirrored", point.name());
            }
        }
        if self.report.written.push(point).is_err() {
            warn!("PROV: write report full");
        }

        if self.auto_reboot
            && self.ssid_written
            && self.pass_written
            && self.reboot.arm(now_ms, self.reboot_delay_ms)
        {
            info!(
                "PROV: WiFi credentials complete, reboot in {} ms",
                self.reboot_delay_ms
            );
        }
        Ok(())
    }
}

/// Short-lived [`WriteHandler`] binding the session to the store for one poll.
struct WriteSession<'a, S: StoragePort> {
    session: &'a mut Session,
    store: &'a mut S,
    now_ms: u64,
}

impl<S: StoragePort> WriteHandler for WriteSession<'_, S> {
    fn on_write(&mut self, point: DataPoint, value: &[u8]) {
        if let Err(e) = self.session.apply_write(self.store, point, value, self.now_ms) {
            warn!("PROV: write to {} rejected: {}", point.name(), e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Service
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningService<R: RadioPort> {
    radio: R,
    session: Session,
    status_text: heapless::String<64>,
    status_interval_ms: u32,
    last_status_ms: Option<u64>,
}

impl<R: RadioPort> ProvisioningService<R> {
    pub fn new(radio: R, config: &DeviceConfig) -> Self {
        let mut status_text = heapless::String::new();
        let _ = status_text.push_str(UNKNOWN_STATUS);
        Self {
            radio,
            session: Session {
                ssid_written: false,
                pass_written: false,
                auto_reboot: config.auto_reboot_on_provision,
                reboot_delay_ms: config.reboot_delay_ms,
                reboot: RebootSchedule::new(),
                reflect: heapless::Vec::new(),
                report: ProvisioningReport::default(),
            },
            status_text,
            status_interval_ms: config.status_interval_ms,
            last_status_ms: None,
        }
    }

    /// Publish the static values and start advertising.
    pub fn begin(&mut self, info: &StaticInfo<'_>) {
        self.radio.set_value(DataPoint::Model, info.model);
        self.radio.set_value(DataPoint::Manufacturer, info.manufacturer);
        self.radio.set_value(DataPoint::ProductId, info.product_id);
        self.radio.set_value(DataPoint::Version, info.version);
        self.radio.set_value(DataPoint::HardwareAddress, info.hw_address);
        self.radio.set_value(DataPoint::NetworkList, "");
        self.radio.set_value(DataPoint::WifiSsid, info.wifi_ssid);
        self.radio.set_value(DataPoint::UserId, info.user_id);
        self.radio.set_value(DataPoint::Status, &self.status_text);
        self.radio.start_advertising();
        info!("PROV: service up (model='{}', hw={})", info.model, info.hw_address);
    }

    pub fn start_advertising(&mut self) {
        if !self.radio.is_advertising() {
            self.radio.start_advertising();
        }
    }

    pub fn stop_advertising(&mut self) {
        if self.radio.is_advertising() {
            self.radio.stop_advertising();
        }
    }

    pub fn is_advertising(&self) -> bool {
        self.radio.is_advertising()
    }

    /// Replace the status summary and push it immediately.
    pub fn set_runtime_status(&mut self, status: ConnectivityStatus, now_ms: u64) {
        use core::fmt::Write;
        self.status_text.clear();
        let _ = write!(self.status_text, "{}", status);
        self.push_status(now_ms);
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn reboot_schedule(&self) -> &RebootSchedule {
        &self.session.reboot
    }

    /// Apply one write directly (the radio path ends up here too).
    pub fn handle_write(
        &mut self,
        store: &mut impl StoragePort,
        point: DataPoint,
        raw: &[u8],
        now_ms: u64,
    ) -> Result<(), ProvisioningError> {
        self.session.apply_write(store, point, raw, now_ms)?;
        self.flush_reflections();
        Ok(())
    }

    /// Drain radio writes, run the status heartbeat and check the reboot
    /// deadline.  Call once per tick.
    pub fn poll(&mut self, store: &mut impl StoragePort, now_ms: u64) -> ProvisioningReport {
        {
            let mut writes = WriteSession {
                session: &mut self.session,
                store,
                now_ms,
            };
            self.radio.dispatch_writes(&mut writes);
        }
        self.flush_reflections();

        let heartbeat_due = self.last_status_ms.is_none_or(|last| {
            now_ms.saturating_sub(last) >= u64::from(self.status_interval_ms)
        });
        if heartbeat_due {
            self.push_status(now_ms);
        }

        let mut report = core::mem::take(&mut self.session.report);
        report.reboot_due = self.session.reboot.poll(now_ms);
        if report.reboot_due {
            info!("PROV: reboot deadline reached");
        }
        report
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    fn flush_reflections(&mut self) {
        for (point, value) in self.session.reflect.iter() {
            self.radio.set_value(*point, value);
        }
        self.session.reflect.clear();
    }

    fn push_status(&mut self, now_ms: u64) {
        self.radio.set_value(DataPoint::Status, &self.status_text);
        self.radio.notify(DataPoint::Status);
        self.last_status_ms = Some(now_ms);
    }
}
