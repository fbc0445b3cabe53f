use core::fmt::{self, Debug, Display, Formatter};

use bitflags::bitflags;

use crate::indicator::LedCommand;
use crate::Ticks;

/// Physical input the charger draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputPath {
    /// USB connector (VAC1)
    Usb,
    /// DC jack (VAC2)
    DcJack,
}

/// Input presence as reported by the charger IC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputPresence {
    /// VAC1, the USB connector
    pub usb: bool,
    /// VAC2, the DC jack
    pub dc_jack: bool,
}

impl InputPresence {
    pub fn none(&self) -> bool {
        !self.usb && !self.dc_jack
    }
}

bitflags! {
    /// Battery thermistor (TS) window as reported by the charger IC.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TemperatureStatus: u8 {
        /// Above the hot threshold, (dis)charging suspended
        const HOT  = 1 << 0;
        /// In the warm window, charge voltage reduced
        const WARM = 1 << 1;
        /// In the cool window, charge current reduced
        const COOL = 1 << 2;
        /// Below the cold threshold, (dis)charging suspended
        const COLD = 1 << 3;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TemperatureStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "TemperatureStatus({=u8:#x})", self.bits());
    }
}

impl TemperatureStatus {
    /// Hardware has suspended charging or discharging.
    pub fn is_suspended(&self) -> bool {
        self.intersects(TemperatureStatus::HOT | TemperatureStatus::COLD)
    }
}

/// Charge cycle phase reported by the charger IC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeStatus {
    #[default]
    NotCharging,
    Trickle,
    PreCharge,
    FastCharge,
    TaperCharge,
    TopOff,
    Done,
}

impl Display for ChargeStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ChargeStatus::NotCharging => write!(f, "Not charging"),
            ChargeStatus::Trickle => write!(f, "Trickle charge"),
            ChargeStatus::PreCharge => write!(f, "Pre-charge"),
            ChargeStatus::FastCharge => write!(f, "Fast charge (CC)"),
            ChargeStatus::TaperCharge => write!(f, "Taper charge (CV)"),
            ChargeStatus::TopOff => write!(f, "Top-off"),
            ChargeStatus::Done => write!(f, "Charge done"),
        }
    }
}

/// ADC readings from the charger IC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    pub vbus_mv: u16,
    /// Positive into the charger
    pub ibus_ma: i16,
    pub vbat_mv: u16,
    /// Positive while charging, negative while discharging
    pub ibat_ma: i16,
}

/// Type-C connection state reported by the port controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Attached with us consuming power
    AttachedSink,
    /// Attached with us providing power
    AttachedSource,
    /// Audio or debug accessory, no power role
    Accessory,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::AttachedSink => write!(f, "Attached as sink"),
            ConnectionState::AttachedSource => write!(f, "Attached as source"),
            ConnectionState::Accessory => write!(f, "Accessory"),
        }
    }
}

/// The charger IC.
///
/// Every call is expected to finish within one polling cycle. Errors are not
/// retried by the state machine; they are propagated to the caller.
pub trait ChargerDriver {
    type Error: Debug;

    fn input_presence(&mut self) -> Result<InputPresence, Self::Error>;

    /// Raw fault register; any non-zero value is a fault.
    fn fault_status(&mut self) -> Result<u16, Self::Error>;

    fn temperature_status(&mut self) -> Result<TemperatureStatus, Self::Error>;

    fn charge_status(&mut self) -> Result<ChargeStatus, Self::Error>;

    fn measure(&mut self) -> Result<Measurements, Self::Error>;

    /// Connect exactly one input path.
    fn select_input(&mut self, path: InputPath) -> Result<(), Self::Error>;

    fn set_input_current_limit(&mut self, milliampere: u16) -> Result<(), Self::Error>;

    fn set_charging(&mut self, enable: bool) -> Result<(), Self::Error>;

    /// BC1.2 D+/D- detection, letting the IC pick its own input current.
    fn set_auto_detection(&mut self, enable: bool) -> Result<(), Self::Error>;

    /// Enter source (OTG) mode regulating VBUS at `millivolt`.
    fn enable_source(&mut self, millivolt: u16) -> Result<(), Self::Error>;

    fn disable_source(&mut self) -> Result<(), Self::Error>;

    fn set_source_current_limit(&mut self, milliampere: u16) -> Result<(), Self::Error>;

    fn set_charge_voltage_limit(&mut self, millivolt: u16) -> Result<(), Self::Error>;

    fn set_charge_current_limit(&mut self, milliampere: u16) -> Result<(), Self::Error>;

    fn set_thermistor(&mut self, enable: bool) -> Result<(), Self::Error>;
}

/// Read-only view of the USB-PD / Type-C engine.
pub trait PowerDeliveryController {
    fn connection_state(&self) -> ConnectionState;

    fn has_contract(&self) -> bool;

    /// Current the partner advertises, in mA. 500 mA until something better is known.
    fn advertised_current_ma(&self) -> u16;
}

/// Host radio power sense.
pub trait RigPowerSensor {
    fn is_powered(&self) -> bool;
}

/// Status LED.
pub trait StatusIndicator {
    type Error: Debug;

    fn show(&mut self, command: LedCommand) -> Result<(), Self::Error>;

    /// Put the LED driver into its lowest power state.
    fn power_down(&mut self) -> Result<(), Self::Error>;

    /// Undo [`StatusIndicator::power_down`].
    fn wake(&mut self) -> Result<(), Self::Error>;
}

/// Wrapping millisecond counter.
pub trait TickSource {
    fn now(&self) -> Ticks;
}
