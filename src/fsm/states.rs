//! Concrete state handler functions and table builder.
//!
//! ```text
//!  BOOTSTRAPPING ──[wifi up]──────────────────────────▶ CONNECTING
//!        │                                               ▲   │
//!   [wifi down]                              [transport lost] │ [transport up]
//!        ▼                                               │   ▼
//!  PROVISIONING_WAIT ──[creds + wifi up]──▶ CONNECTING   DECLARED_ONLINE
//!        ▲                                      │             │
//!        └────────────[wifi lost]───────────────┴─────────────┘
//!
//!  Any state ──[reboot deadline]──▶ REBOOTING (terminal)
//! ```

use super::context::LifecycleContext;
use super::{StateDescriptor, StateId};
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Bootstrapping,
            on_enter: Some(bootstrapping_enter),
            on_exit: None,
            on_update: bootstrapping_update,
        },
        StateDescriptor {
            id: StateId::ProvisioningWait,
            on_enter: Some(provisioning_enter),
            on_exit: None,
            on_update: provisioning_update,
        },
        StateDescriptor {
            id: StateId::Connecting,
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        StateDescriptor {
            id: StateId::DeclaredOnline,
            on_enter: Some(online_enter),
            on_exit: Some(online_exit),
            on_update: online_update,
        },
        StateDescriptor {
            id: StateId::Rebooting,
            on_enter: Some(rebooting_enter),
            on_exit: None,
            on_update: rebooting_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  BOOTSTRAPPING — store, identity and first association done by start()
// ═══════════════════════════════════════════════════════════════════════════

fn bootstrapping_enter(ctx: &mut LifecycleContext) {
    ctx.commands.advertise = true;
}

fn bootstrapping_update(ctx: &mut LifecycleContext) -> Option<StateId> {
    if ctx.network_ready() {
        Some(StateId::Connecting)
    } else {
        Some(StateId::ProvisioningWait)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROVISIONING_WAIT — radio advertising, waiting for a usable network
// ═══════════════════════════════════════════════════════════════════════════

fn provisioning_enter(ctx: &mut LifecycleContext) {
    ctx.commands.advertise = true;
    info!("PROVISIONING: advertising, waiting for WiFi");
}

fn provisioning_update(ctx: &mut LifecycleContext) -> Option<StateId> {
    if ctx.network_ready() {
        return Some(StateId::Connecting);
    }
    if ctx.inputs.wifi_credentials && ctx.inputs.association_due {
        ctx.commands.request_associate();
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING — network up, opening the broker session
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut LifecycleContext) {
    if !ctx.inputs.has_credentials {
        warn!("CONNECTING: no transmit key provisioned, waiting");
    }
}

fn connecting_update(ctx: &mut LifecycleContext) -> Option<StateId> {
    if !ctx.inputs.wifi_connected {
        return Some(StateId::ProvisioningWait);
    }
    if ctx.inputs.mqtt_connected {
        return Some(StateId::DeclaredOnline);
    }
    if ctx.inputs.has_credentials {
        ctx.commands.request_connect();
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DECLARED_ONLINE — declared, dispatching invocations
// ═══════════════════════════════════════════════════════════════════════════

fn online_enter(ctx: &mut LifecycleContext) {
    ctx.commands.request_declare();
    ctx.commands.advertise = ctx.keep_advertising_online;
}

fn online_exit(ctx: &mut LifecycleContext) {
    debug!("ONLINE: leaving, declaration will be repeated on reconnect");
    ctx.commands.advertise = true;
}

fn online_update(ctx: &mut LifecycleContext) -> Option<StateId> {
    if !ctx.inputs.wifi_connected {
        warn!("ONLINE: WiFi lost");
        return Some(StateId::ProvisioningWait);
    }
    if !ctx.inputs.mqtt_connected {
        warn!("ONLINE: broker connection lost");
        return Some(StateId::Connecting);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  REBOOTING — terminal
// ═══════════════════════════════════════════════════════════════════════════

fn rebooting_enter(ctx: &mut LifecycleContext) {
    ctx.commands.request_restart();
    info!("REBOOTING: restart requested");
}

fn rebooting_update(_ctx: &mut LifecycleContext) -> Option<StateId> {
    None
}
