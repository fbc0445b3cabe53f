use crate::Ticks;

/// Deadlines shorter than this are serviced right away instead of sleeping.
pub const MIN_SLEEP_TICKS: Ticks = 100;

/// What the scheduler loop should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wake {
    /// Run the next cycle without sleeping
    Immediately,
    /// Sleep until the alarm or an interrupt, whichever comes first
    After(Ticks),
    /// No deadline, sleep until an interrupt
    OnEvent,
}

/// Merge the deadlines reported by everything the loop drives into one decision.
pub fn plan_wake<I>(deadlines: I) -> Wake
where
    I: IntoIterator<Item = Option<Ticks>>,
{
    match deadlines.into_iter().flatten().min() {
        None => Wake::OnEvent,
        Some(ticks) if ticks < MIN_SLEEP_TICKS => Wake::Immediately,
        Some(ticks) => Wake::After(ticks),
    }
}
