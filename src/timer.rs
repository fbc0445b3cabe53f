use crate::Ticks;

/// One-shot countdown on a wrapping tick counter.
///
/// Only elapsed time is ever compared, so the timer keeps working across a
/// wrap of the underlying counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NegotiationTimer {
    armed: Option<Armed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Armed {
    start: Ticks,
    duration: Ticks,
}

impl NegotiationTimer {
    pub const fn new() -> Self {
        Self { armed: None }
    }

    pub fn arm(&mut self, now: Ticks, duration: Ticks) {
        self.armed = Some(Armed {
            start: now,
            duration,
        });
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// A disarmed timer never expires.
    pub fn expired(&self, now: Ticks) -> bool {
        self.armed
            .is_some_and(|a| now.wrapping_sub(a.start) >= a.duration)
    }

    /// Ticks left until expiry, `None` while disarmed.
    pub fn remaining(&self, now: Ticks) -> Option<Ticks> {
        self.armed
            .map(|a| a.duration.saturating_sub(now.wrapping_sub(a.start)))
    }
}
