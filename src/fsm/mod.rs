//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌──────────────────┬───────────┬──────────┬───────────────┐ │
//! │  │ StateId          │ on_enter  │ on_exit  │ on_update     │ │
//! │  ├──────────────────┼───────────┼──────────┼───────────────┤ │
//! │  │ Bootstrapping    │ fn(ctx)   │          │ fn(ctx)->Opt  │ │
//! │  │ ProvisioningWait │ fn(ctx)   │          │ fn(ctx)->Opt  │ │
//! │  │ Connecting       │ fn(ctx)   │          │ fn(ctx)->Opt  │ │
//! │  │ DeclaredOnline   │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Opt  │ │
//! │  │ Rebooting        │ fn(ctx)   │          │ fn(ctx)->Opt  │ │
//! │  └──────────────────┴───────────┴──────────┴───────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut LifecycleContext`, which
//! holds the connectivity inputs and the commands for the controller.

pub mod context;
pub mod states;

use context::LifecycleContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Connectivity lifecycle states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Bootstrapping = 0,
    ProvisioningWait = 1,
    Connecting = 2,
    DeclaredOnline = 3,
    Rebooting = 4,
}

impl StateId {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `ProvisioningWait` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Bootstrapping,
            1 => Self::ProvisioningWait,
            2 => Self::Connecting,
            3 => Self::DeclaredOnline,
            4 => Self::Rebooting,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::ProvisioningWait
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bootstrapping => "Bootstrapping",
            Self::ProvisioningWait => "ProvisioningWait",
            Self::Connecting => "Connecting",
            Self::DeclaredOnline => "DeclaredOnline",
            Self::Rebooting => "Rebooting",
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut LifecycleContext);

/// Per-tick update handler.  `Some(next)` triggers a transition.
pub type StateUpdateFn = fn(&mut LifecycleContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut LifecycleContext) {
        info!("FSM starting in state: {}", self.current_state().name());
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.  Returns the `(from, to)` pair when the update
    /// handler requested a transition.
    pub fn tick(&mut self, ctx: &mut LifecycleContext) -> Option<(StateId, StateId)> {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;

        let from = self.current_state();
        let next = (self.table[self.current].on_update)(ctx)?;
        if next == from {
            return None;
        }
        self.transition(next, ctx);
        Some((from, next))
    }

    /// Jump straight to `next` regardless of what `on_update` would say
    /// (the reboot deadline uses this).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut LifecycleContext) -> bool {
        if next as usize == self.current {
            return false;
        }
        self.transition(next, ctx);
        true
    }

    pub fn current_state(&self) -> StateId {
        self.table[self.current].id
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut LifecycleContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.current_state().name(),
            next_id.name()
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
