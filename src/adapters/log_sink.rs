//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured device events to the
//! ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::DeviceEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`DeviceEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Started { device_id } => {
                info!("START | device_id={}", device_id);
            }
            DeviceEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from.name(), to.name());
            }
            DeviceEvent::ConnectivityChanged(status) => {
                info!("NET   | {}", status);
            }
            DeviceEvent::ProvisioningWrite(point) => {
                info!("PROV  | write to {}", point.name());
            }
            DeviceEvent::Association { ssid, connected: true } => {
                info!("NET   | associated with '{}'", ssid);
            }
            DeviceEvent::Association { ssid, connected: false } => {
                warn!("NET   | association with '{}' pending or failed", ssid);
            }
            DeviceEvent::Declared { events, methods } => {
                info!("CLOUD | declared {} events, {} methods", events, methods);
            }
            DeviceEvent::Rebooting => {
                warn!("SYS   | rebooting");
            }
        }
    }
}
