//! One-shot reboot schedule armed by a completed WiFi provisioning.

/// Armed at most once per boot.  Once armed it is never re-armed, and
/// once fired it stays fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebootSchedule {
    scheduled: bool,
    fire_at_ms: u64,
    fired: bool,
}

impl RebootSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for `now_ms + delay_ms`.  Returns `false` if already armed.
    pub fn arm(&mut self, now_ms: u64, delay_ms: u32) -> bool {
        if self.scheduled {
            return false;
        }
        self.scheduled = true;
        self.fire_at_ms = now_ms.saturating_add(u64::from(delay_ms));
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn fire_at_ms(&self) -> Option<u64> {
        self.scheduled.then_some(self.fire_at_ms)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// `true` exactly once, on the first poll at or after the deadline.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.scheduled || self.fired || now_ms < self.fire_at_ms {
            return false;
        }
        self.fired = true;
        true
    }
}
