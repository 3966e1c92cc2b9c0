//! Outbound device events.
//!
//! [`MeoDevice`](super::device::MeoDevice) emits these through the
//! [`EventSink`](super::ports::EventSink) port.

use crate::fsm::StateId;
use crate::provisioning::DataPoint;

use super::status::ConnectivityStatus;

/// Structured events emitted by the device core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Bootstrapping finished; carries the derived device id.
    Started { device_id: heapless::String<12> },

    /// The lifecycle FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// The connectivity snapshot changed.
    ConnectivityChanged(ConnectivityStatus),

    /// A central wrote a provisioning data point.
    ProvisioningWrite(DataPoint),

    /// Station association finished (successfully or not).
    Association { ssid: String, connected: bool },

    /// The capability declaration was published.
    Declared { events: usize, methods: usize },

    /// The device is about to restart.
    Rebooting,
}
