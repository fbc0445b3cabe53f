//! Board configuration, fixed at build time.

use pd_charger::config::{PdMode, Role};
use pd_charger::{ChargerConfig, Ticks};

/// Charger policy for a 3S Li-ion pack.
pub const CHARGER_CONFIG: ChargerConfig = ChargerConfig {
    role: Role::DualRole,
    pd_mode: PdMode::Off,
    charging_current_limit_ma: 3000,
    charging_voltage_limit_mv: 12600,
    dc_input_current_limit_ma: 3000,
    otg_current_limit_ma: 3000,
    // 3.3 V per cell
    discharging_voltage_limit_mv: 9900,
    otg_voltage_headroom_mv: 200,
    charge_when_rig_is_on: false,
    enable_thermistor: true,
};

/// Port controller poll period while nothing raises its interrupt line
pub const PORT_POLL_INTERVAL_MS: u64 = 50;

/// LED animation frame period
pub const LED_FRAME_MS: u64 = 20;

/// How often the power path is sampled and logged
pub const STATUS_LOG_INTERVAL_MS: Ticks = 10_000;

/// Hardware watchdog timeout
pub const WATCHDOG_TIMEOUT_SECS: u64 = 8;

/// The main loop never sleeps longer than this, so the watchdog gets fed
pub const WATCHDOG_FEED_INTERVAL_MS: Ticks = 2_000;

/// Source voltage requested when a sink attaches without PD
pub const TYPE_C_SOURCE_MV: u16 = 5000;
