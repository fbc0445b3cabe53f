//! Status LED hardware module
//!
//! The LP5815 is driven from two places on the shared bus. The state machine
//! owns a [`LedIndicator`] and writes the first frame of every new command
//! itself, so a dead LED driver shows up as an error in the main loop. Blink
//! and breathe frames after that come from [`led_task`].

use drivers::lp5815::{LedError, LP5815};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};
use embedded_hal_bus::i2c::AtomicDevice;
use embedded_hal_bus::util::AtomicCell;
use log::{info, warn};
use pd_charger::collaborators::StatusIndicator;
use pd_charger::indicator::{Color, LedCommand};

use super::I2cBus;
use crate::config::LED_FRAME_MS;

/// Type alias for the LP5815 driver instance
pub type Led = LP5815<AtomicDevice<'static, I2cBus>>;

static LED_COMMAND: Signal<CriticalSectionRawMutex, LedCommand> = Signal::new();

/// Initializes one handle to the LED driver, dark.
///
/// # Panics
///
/// Panics if the LP5815 does not answer.
pub fn initialize_led(i2c_ref_cell: &'static AtomicCell<I2cBus>) -> Led {
    let mut led = LP5815::new(AtomicDevice::new(i2c_ref_cell));
    led.init().expect("LP5815 initialization failed");
    info!("LP5815 initialized");
    led
}

fn write_color(led: &mut Led, color: Color) -> Result<(), LedError> {
    led.set_rgb(color.r, color.g, color.b)
}

pub struct LedIndicator {
    led: Led,
}

impl LedIndicator {
    pub fn new(led: Led) -> Self {
        Self { led }
    }
}

impl StatusIndicator for LedIndicator {
    type Error = LedError;

    fn show(&mut self, command: LedCommand) -> Result<(), LedError> {
        write_color(&mut self.led, command.frame(0))?;
        LED_COMMAND.signal(command);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), LedError> {
        // stop the animation before the chip goes to standby
        LED_COMMAND.signal(LedCommand::Off);
        self.led.shutdown()
    }

    fn wake(&mut self) -> Result<(), LedError> {
        self.led.wake()
    }
}

/// Plays the current command frame by frame.
///
/// Only colour changes go out on the bus, so a solid colour costs nothing
/// after its first frame.
#[embassy_executor::task]
pub async fn led_task(mut led: Led) {
    let mut command = LedCommand::Off;
    let mut started = Instant::now();
    let mut last = command.frame(0);

    loop {
        match select(LED_COMMAND.wait(), Timer::after_millis(LED_FRAME_MS)).await {
            Either::First(next) => {
                command = next;
                started = Instant::now();
                // the main loop already wrote frame 0
                last = command.frame(0);
                continue;
            }
            Either::Second(()) => {}
        }

        if matches!(command, LedCommand::Off | LedCommand::Solid(_)) {
            continue;
        }

        let elapsed = started.elapsed().as_millis() as u32;
        let color = command.frame(elapsed);
        if color != last {
            match write_color(&mut led, color) {
                Ok(()) => last = color,
                Err(e) => warn!("LED frame failed: {}", e),
            }
        }
    }
}
