use embassy_time::Instant;
use pd_charger::collaborators::TickSource;
use pd_charger::Ticks;

/// Millisecond ticks from the embassy time driver, wrapping at `u32::MAX`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl TickSource for EmbassyClock {
    fn now(&self) -> Ticks {
        Instant::now().as_millis() as Ticks
    }
}
