//! Shared mutable context threaded through every FSM handler.
//!
//! `LifecycleContext` is the blackboard between the controller and the
//! state handlers.  The controller refreshes [`LinkInputs`] before each
//! tick; handlers write [`LifecycleCommands`], which the controller applies
//! through its ports right after the tick.

// ---------------------------------------------------------------------------
// Inputs (written by the controller, read by handlers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkInputs {
    /// A WiFi SSID is known (stored or preset).
    pub wifi_credentials: bool,
    /// Station is associated and has an address.
    pub wifi_connected: bool,
    /// Device id and transmit key are both present.
    pub has_credentials: bool,
    /// Broker session is up.
    pub mqtt_connected: bool,
    /// Another association attempt is allowed now.
    pub association_due: bool,
}

// ---------------------------------------------------------------------------
// Commands (written by handlers, consumed by the controller)
// ---------------------------------------------------------------------------

/// `advertise` is a level; everything else is a one-shot request cleared
/// by the matching `take_*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleCommands {
    pub advertise: bool,
    associate: bool,
    connect: bool,
    declare: bool,
    restart: bool,
}

impl LifecycleCommands {
    pub fn request_associate(&mut self) {
        self.associate = true;
    }

    pub fn request_connect(&mut self) {
        self.connect = true;
    }

    pub fn request_declare(&mut self) {
        self.declare = true;
    }

    pub fn request_restart(&mut self) {
        self.restart = true;
    }

    pub fn take_associate(&mut self) -> bool {
        core::mem::take(&mut self.associate)
    }

    pub fn take_connect(&mut self) -> bool {
        core::mem::take(&mut self.connect)
    }

    pub fn take_declare(&mut self) -> bool {
        core::mem::take(&mut self.declare)
    }

    pub fn take_restart(&mut self) -> bool {
        core::mem::take(&mut self.restart)
    }
}

// ---------------------------------------------------------------------------
// LifecycleContext
// ---------------------------------------------------------------------------

pub struct LifecycleContext {
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    pub inputs: LinkInputs,
    pub commands: LifecycleCommands,
    /// Keep the provisioning radio visible while online.
    pub keep_advertising_online: bool,
}

impl LifecycleContext {
    pub fn new(keep_advertising_online: bool) -> Self {
        Self {
            ticks_in_state: 0,
            inputs: LinkInputs::default(),
            commands: LifecycleCommands::default(),
            keep_advertising_online,
        }
    }

    pub fn network_ready(&self) -> bool {
        self.inputs.wifi_credentials && self.inputs.wifi_connected
    }
}
