//! Main loop
//!
//! Tasks never touch the state machine. They raise a bit in [`EVENTS`] (or post
//! into [`SOURCE_REQUESTS`]) and signal [`WAKE`]; the controller turns that into
//! advisory calls and a fresh `run()`, then sleeps until the earliest deadline.

use embassy_futures::select::select;
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};
use embedded_hal_bus::util::AtomicCell;
use esp_hal::rtc_cntl::Rtc;
use log::{error, info, warn};
use pd_charger::collaborators::RigPowerSensor;
use pd_charger::events::{EventLatch, PendingEvents, SourceRequestChannel};
use pd_charger::scheduler::{plan_wake, Wake};
use pd_charger::{ChargerStateMachine, Ticks};

use crate::clock::EmbassyClock;
use crate::config::{STATUS_LOG_INTERVAL_MS, WATCHDOG_FEED_INTERVAL_MS};
use crate::hardware::{port_responds, Charger, I2cBus, LedIndicator, RigSense, TypeCPort};

pub static EVENTS: EventLatch = EventLatch::new();

pub static SOURCE_REQUESTS: SourceRequestChannel = Channel::new();

static WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Flag `events` and wake the main loop. Safe from any task.
pub fn raise_event(events: PendingEvents) {
    EVENTS.raise(events);
    WAKE.signal(());
}

pub type StateMachine =
    ChargerStateMachine<Charger, TypeCPort, RigSense, LedIndicator, EmbassyClock>;

pub struct Controller {
    sm: StateMachine,
    rtc: Rtc<'static>,
    i2c_ref_cell: &'static AtomicCell<I2cBus>,
    /// Rig level the state machine was last told about
    rig_on: bool,
    last_status: Instant,
}

impl Controller {
    /// Takes over a configured state machine and an armed watchdog.
    pub fn new(sm: StateMachine, rtc: Rtc<'static>, i2c_ref_cell: &'static AtomicCell<I2cBus>) -> Self {
        Self {
            sm,
            rtc,
            i2c_ref_cell,
            rig_on: RigSense.is_powered(),
            last_status: Instant::now(),
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let deadline = self.cycle();
            match plan_wake([
                deadline,
                Some(self.status_deadline()),
                Some(WATCHDOG_FEED_INTERVAL_MS),
            ]) {
                Wake::Immediately => yield_now().await,
                Wake::After(ticks) => {
                    select(WAKE.wait(), Timer::after_millis(ticks as u64)).await;
                }
                Wake::OnEvent => WAKE.wait().await,
            }
        }
    }

    fn cycle(&mut self) -> Option<Ticks> {
        if let Err(e) = self.sm.drain_source_requests(&SOURCE_REQUESTS) {
            error!("Source request failed: {}", e);
        }

        self.dispatch(EVENTS.take());

        let deadline = match self.sm.run() {
            Ok(deadline) => deadline,
            Err(e) => {
                // not retried, a dead charger stops the watchdog feed below
                error!("Charger cycle failed: {}", e);
                None
            }
        };

        if self.status_deadline() == 0 {
            self.log_status();
        }
        self.feed_watchdog();
        deadline
    }

    fn dispatch(&mut self, events: PendingEvents) {
        if events.contains(PendingEvents::POWER_DELIVERY) {
            self.sm.on_pd_state_change();
        }
        if events.contains(PendingEvents::CHARGER) {
            match self.sm.charger_mut().take_interrupt() {
                Ok(true) => self.sm.on_bq_interrupt(),
                Ok(false) => {}
                Err(e) => warn!("Charger interrupt flags unreadable: {}", e),
            }
        }
        if events.contains(PendingEvents::RIG) {
            let on = RigSense.is_powered();
            if on != self.rig_on {
                self.rig_on = on;
                self.sm.on_kx2_state_change(on);
            }
        }
    }

    fn status_deadline(&self) -> Ticks {
        let elapsed = self.last_status.elapsed().as_millis() as Ticks;
        STATUS_LOG_INTERVAL_MS.saturating_sub(elapsed)
    }

    fn log_status(&mut self) {
        self.last_status = Instant::now();
        match self.sm.status() {
            Ok(report) => {
                info!("{}", report);
                if let Some(efficiency) = report.power.efficiency_percent() {
                    info!("Efficiency: {}%", efficiency);
                }
            }
            Err(e) => warn!("Status read failed: {}", e),
        }
        if let Err(e) = self.sm.charger_mut().log_temperatures() {
            warn!("Temperature read failed: {}", e);
        }
    }

    /// Feeds only while both the charger and the port controller answer.
    fn feed_watchdog(&mut self) {
        let charger_ok = self.sm.charger_mut().test_connection();
        let port_ok = port_responds(self.i2c_ref_cell);
        if charger_ok && port_ok {
            self.rtc.rwdt.feed();
        } else {
            error!(
                "Skipping watchdog feed, charger {} port {}",
                if charger_ok { "ok" } else { "silent" },
                if port_ok { "ok" } else { "silent" }
            );
        }
    }
}
