use core::fmt::{self, Display, Formatter};

/// Type-C port role the port controller is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Source,
    Sink,
    DualRole,
    TrySource,
    TrySink,
}

/// USB-PD revision offered to the partner, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdMode {
    Off,
    Pd20,
    Pd30,
}

/// Device configuration consumed read-only by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChargerConfig {
    pub role: Role,
    pub pd_mode: PdMode,
    /// Fast charge current (ICHG)
    pub charging_current_limit_ma: u16,
    /// Charge termination voltage (VREG)
    pub charging_voltage_limit_mv: u16,
    /// Input current limit while charging from the DC jack
    pub dc_input_current_limit_ma: u16,
    /// Ceiling for any source-mode current request
    pub otg_current_limit_ma: u16,
    /// Source mode is withdrawn below this battery voltage
    pub discharging_voltage_limit_mv: u16,
    /// Added to the requested source voltage to compensate for cable drop
    pub otg_voltage_headroom_mv: u16,
    pub charge_when_rig_is_on: bool,
    pub enable_thermistor: bool,
}

pub const CHARGING_CURRENT_MIN_MA: u16 = 50;
pub const CHARGING_CURRENT_MAX_MA: u16 = 5000;
pub const CHARGING_VOLTAGE_MIN_MV: u16 = 10000;
pub const CHARGING_VOLTAGE_MAX_MV: u16 = 18800;
pub const DC_INPUT_CURRENT_MIN_MA: u16 = 100;
pub const DC_INPUT_CURRENT_MAX_MA: u16 = 3300;
pub const OTG_CURRENT_MIN_MA: u16 = 120;
pub const OTG_CURRENT_MAX_MA: u16 = 3320;
pub const DISCHARGING_VOLTAGE_MIN_MV: u16 = 3000;

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            role: Role::DualRole,
            pd_mode: PdMode::Pd20,
            charging_current_limit_ma: 3000,
            // 3S Li-ion, 4.2 V per cell
            charging_voltage_limit_mv: 12600,
            dc_input_current_limit_ma: 3000,
            otg_current_limit_ma: 3000,
            // 3.3 V per cell
            discharging_voltage_limit_mv: 9900,
            otg_voltage_headroom_mv: 200,
            charge_when_rig_is_on: false,
            enable_thermistor: false,
        }
    }
}

impl ChargerConfig {
    /// Check every field against the range the charger IC accepts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(CHARGING_CURRENT_MIN_MA..=CHARGING_CURRENT_MAX_MA)
            .contains(&self.charging_current_limit_ma)
        {
            return Err(ConfigError::ChargingCurrent(self.charging_current_limit_ma));
        }
        if !(CHARGING_VOLTAGE_MIN_MV..=CHARGING_VOLTAGE_MAX_MV)
            .contains(&self.charging_voltage_limit_mv)
        {
            return Err(ConfigError::ChargingVoltage(self.charging_voltage_limit_mv));
        }
        if !(DC_INPUT_CURRENT_MIN_MA..=DC_INPUT_CURRENT_MAX_MA)
            .contains(&self.dc_input_current_limit_ma)
        {
            return Err(ConfigError::DcInputCurrent(self.dc_input_current_limit_ma));
        }
        if !(OTG_CURRENT_MIN_MA..=OTG_CURRENT_MAX_MA).contains(&self.otg_current_limit_ma) {
            return Err(ConfigError::OtgCurrent(self.otg_current_limit_ma));
        }
        if self.discharging_voltage_limit_mv < DISCHARGING_VOLTAGE_MIN_MV
            || self.discharging_voltage_limit_mv >= self.charging_voltage_limit_mv
        {
            return Err(ConfigError::DischargingVoltage(
                self.discharging_voltage_limit_mv,
            ));
        }
        Ok(())
    }
}

/// A configuration field outside its accepted range. Carries the offending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ChargingCurrent(u16),
    ChargingVoltage(u16),
    DcInputCurrent(u16),
    OtgCurrent(u16),
    DischargingVoltage(u16),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ConfigError::ChargingCurrent(v) => write!(
                f,
                "charging current {v} mA outside {CHARGING_CURRENT_MIN_MA}..={CHARGING_CURRENT_MAX_MA}"
            ),
            ConfigError::ChargingVoltage(v) => write!(
                f,
                "charging voltage {v} mV outside {CHARGING_VOLTAGE_MIN_MV}..={CHARGING_VOLTAGE_MAX_MV}"
            ),
            ConfigError::DcInputCurrent(v) => write!(
                f,
                "DC input current {v} mA outside {DC_INPUT_CURRENT_MIN_MA}..={DC_INPUT_CURRENT_MAX_MA}"
            ),
            ConfigError::OtgCurrent(v) => write!(
                f,
                "OTG current {v} mA outside {OTG_CURRENT_MIN_MA}..={OTG_CURRENT_MAX_MA}"
            ),
            ConfigError::DischargingVoltage(v) => write!(
                f,
                "discharge floor {v} mV must be at least {DISCHARGING_VOLTAGE_MIN_MV} and below the charge voltage"
            ),
        }
    }
}
