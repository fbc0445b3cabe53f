//! Hardware initialization modules
//!
//! This module provides organized initialization functions for all hardware
//! components on the KX2 power board. Every chip hangs off one I2C bus, shared
//! through an [`AtomicCell`](embedded_hal_bus::util::AtomicCell):
//!
//! - **PMU**: BQ25798 buck-boost charger, input path switch and OTG source
//! - **Type-C**: FUSB302 port controller for attach detection
//! - **LED**: LP5815 RGB status LED
//! - **Rig**: KX2 power sense GPIO

pub mod led;
pub mod pmu;
pub mod rig;
pub mod typec;

use esp_hal::i2c::master::I2c;
use esp_hal::Blocking;

/// The one I2C bus shared by every chip on the board
pub type I2cBus = I2c<'static, Blocking>;

// Re-export commonly used types and functions for convenience
pub use led::{initialize_led, led_task, LedIndicator};
pub use pmu::{charger_irq_task, PmuImpl};
pub use rig::{initialize_rig_sense, rig_task, RigSense};
pub use typec::{initialize_port, port_responds, port_task, TypeCPort};

/// Charger driver as wired on this board
pub type Charger = PmuImpl<'static, I2cBus>;
