//! KX2 power sense, active high.

use core::sync::atomic::{AtomicBool, Ordering};

use esp_hal::gpio::Input;
use pd_charger::collaborators::RigPowerSensor;
use pd_charger::events::PendingEvents;

use crate::controller::raise_event;

static RIG_POWERED: AtomicBool = AtomicBool::new(false);

/// Last level seen by [`rig_task`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RigSense;

impl RigPowerSensor for RigSense {
    fn is_powered(&self) -> bool {
        RIG_POWERED.load(Ordering::Acquire)
    }
}

/// Latches the level at boot so the first cycle already sees it.
pub fn initialize_rig_sense(sense: Input<'static>) -> Input<'static> {
    RIG_POWERED.store(sense.is_high(), Ordering::Release);
    sense
}

#[embassy_executor::task]
pub async fn rig_task(mut sense: Input<'static>) {
    loop {
        sense.wait_for_any_edge().await;
        RIG_POWERED.store(sense.is_high(), Ordering::Release);
        raise_event(PendingEvents::RIG);
    }
}
