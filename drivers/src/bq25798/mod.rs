//! <https://www.ti.com/lit/ds/symlink/bq25798.pdf>
//!
//! BQ25798 I2C controlled 1-4 cell buck-boost charger with dual input
//! selector and USB OTG (reverse) mode.

use core::fmt::{self, Display, Formatter};

use bitflags::bitflags;
use embedded_hal::i2c::Error;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod blocking;

pub use blocking::BQ25798;

pub const BQ25798_ADDRESS: u8 = 0x6B;

// registers
pub(crate) const REG_MIN_SYS_VOLTAGE: u8 = 0x00;
pub(crate) const REG_CHARGE_VOLTAGE_LIMIT: u8 = 0x01;
pub(crate) const REG_CHARGE_CURRENT_LIMIT: u8 = 0x03;
pub(crate) const REG_INPUT_VOLTAGE_LIMIT: u8 = 0x05;
pub(crate) const REG_INPUT_CURRENT_LIMIT: u8 = 0x06;
pub(crate) const REG_VOTG: u8 = 0x0B;
pub(crate) const REG_IOTG: u8 = 0x0D;
pub(crate) const REG_CHARGER_CONTROL_0: u8 = 0x0F;
pub(crate) const REG_CHARGER_CONTROL_1: u8 = 0x10;
pub(crate) const REG_CHARGER_CONTROL_2: u8 = 0x11;
pub(crate) const REG_CHARGER_CONTROL_3: u8 = 0x12;
pub(crate) const REG_CHARGER_CONTROL_4: u8 = 0x13;
pub(crate) const REG_CHARGER_CONTROL_5: u8 = 0x14;
pub(crate) const REG_TIMER_CONTROL: u8 = 0x08;
pub(crate) const REG_TERMINATION_CONTROL: u8 = 0x09;
pub(crate) const REG_CHARGER_CONTROL_7: u8 = 0x16;
pub(crate) const REG_NTC_CONTROL_1: u8 = 0x18;
pub(crate) const REG_STATUS_0: u8 = 0x1B;
pub(crate) const REG_STATUS_1: u8 = 0x1C;
pub(crate) const REG_STATUS_2: u8 = 0x1D;
pub(crate) const REG_STATUS_4: u8 = 0x1F;
pub(crate) const REG_FAULT_STATUS_0: u8 = 0x20;
pub(crate) const REG_FLAG_0: u8 = 0x22;
pub(crate) const REG_FLAG_3: u8 = 0x25;
pub(crate) const REG_MASK_0: u8 = 0x28;
pub(crate) const REG_MASK_1: u8 = 0x29;
pub(crate) const REG_MASK_2: u8 = 0x2A;
pub(crate) const REG_MASK_3: u8 = 0x2B;
pub(crate) const REG_ADC_CONTROL: u8 = 0x2E;
pub(crate) const REG_IBUS_ADC: u8 = 0x31;
pub(crate) const REG_IBAT_ADC: u8 = 0x33;
pub(crate) const REG_VBUS_ADC: u8 = 0x35;
pub(crate) const REG_VBAT_ADC: u8 = 0x3B;
pub(crate) const REG_TS_ADC: u8 = 0x3F;
pub(crate) const REG_TDIE_ADC: u8 = 0x41;
pub(crate) const REG_DPDM_DRIVER: u8 = 0x47;
pub(crate) const REG_PART_INFORMATION: u8 = 0x48;

/// REG09: REG_RST plus the default termination current
pub(crate) const RESET_COMMAND: u8 = 0x45;
pub(crate) const RESET_SETTLE_MS: u32 = 250;

/// Part number field of REG48 for the BQ25798
pub(crate) const PART_NUMBER: u8 = 0x03;

pub(crate) const EN_CHG: u8 = 0x20;
pub(crate) const EN_OTG: u8 = 0x40;
pub(crate) const AUTO_INDET_EN: u8 = 0x40;
pub(crate) const FORCE_INDET: u8 = 0x80;
pub(crate) const EN_ACDRV1: u8 = 0x40;
pub(crate) const EN_ACDRV2: u8 = 0x80;
/// Both VBUS pull down enables in REG16
pub(crate) const VBUS_PULL_DOWN: u8 = 0x0C;
pub(crate) const TS_IGNORE: u8 = 0x01;
/// D+ shorted to D- in OTG mode, a DCP to the sink
pub(crate) const DPDM_OTG: u8 = 0xE0;

pub(crate) const VOTG_BASE: u16 = 2800;
pub(crate) const VOTG_STEP: u16 = 10;
pub(crate) const VOTG_MIN: u16 = 2800;
pub(crate) const VOTG_MAX: u16 = 22000;

pub(crate) const IOTG_STEP: u16 = 40;
pub(crate) const IOTG_MIN: u16 = 120;
pub(crate) const IOTG_MAX: u16 = 3320;

pub(crate) const IINDPM_STEP: u16 = 10;
pub(crate) const IINDPM_MIN: u16 = 100;
pub(crate) const IINDPM_MAX: u16 = 3300;

pub(crate) const VREG_STEP: u16 = 10;
pub(crate) const VREG_MIN: u16 = 3000;
pub(crate) const VREG_MAX: u16 = 18800;

pub(crate) const ICHG_STEP: u16 = 10;
pub(crate) const ICHG_MIN: u16 = 50;
pub(crate) const ICHG_MAX: u16 = 5000;

pub(crate) const VINDPM_STEP: u16 = 100;

/// Register writes applied after a reset, in order. 16 bit values are split MSB first.
pub(crate) const INIT_SEQUENCE: &[&[u8]] = &[
    // VSYSMIN 9 V
    &[REG_MIN_SYS_VOLTAGE, 0x1A],
    // VREG 12.6 V
    &[REG_CHARGE_VOLTAGE_LIMIT, 0x04, 0xEC],
    // ICHG 3 A
    &[REG_CHARGE_CURRENT_LIMIT, 0x01, 0x2C],
    // VBAT_LOWV 66.7 %, precharge 200 mA
    &[REG_TIMER_CONTROL, 0x85],
    // IOTG 3 A
    &[REG_IOTG, 0x4B],
    // charging off until an input is chosen, ICO and termination on
    &[REG_CHARGER_CONTROL_0, 0x92],
    // I2C watchdog off, VAC OVP 26 V
    &[REG_CHARGER_CONTROL_1, 0x00],
    // input type detection and HVDCP on
    &[REG_CHARGER_CONTROL_2, 0xF8],
    // PFM off in both directions
    &[REG_CHARGER_CONTROL_3, 0x34],
    // ACDRVs off, STAT pin off, IBUS OCP on
    &[REG_CHARGER_CONTROL_4, 0x11],
    // IINDPM regulation on
    &[REG_CHARGER_CONTROL_5, 0x14],
    // only AC1/AC2 presence and TS window changes raise INT
    &[REG_MASK_0, 0xF9],
    &[REG_MASK_1, 0x7F],
    &[REG_MASK_2, 0x7F],
    &[REG_MASK_3, 0x10],
    // ADC continuous, 15 bit
    &[REG_ADC_CONTROL, 0x80],
];

/// Errors that can occur when interacting with the BQ25798
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerError {
    /// Part information does not identify a BQ25798
    Init,
    /// OTG voltage outside 2800 to 22000 mV
    OtgVoltageInvalid,
    /// OTG current outside 120 to 3320 mA
    OtgCurrentInvalid,
    /// Input current outside 100 to 3300 mA
    InputCurrentInvalid,
    /// Charge voltage outside 3000 to 18800 mV
    ChargeVoltageInvalid,
    /// Charge current outside 50 to 5000 mA
    ChargeCurrentInvalid,
    I2CError,
}

impl<E> From<E> for ChargerError
where
    E: Error,
{
    fn from(_: E) -> Self {
        ChargerError::I2CError
    }
}

impl Display for ChargerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ChargerError::Init => write!(f, "Not a BQ25798"),
            ChargerError::OtgVoltageInvalid => write!(f, "OTG voltage out of range"),
            ChargerError::OtgCurrentInvalid => write!(f, "OTG current out of range"),
            ChargerError::InputCurrentInvalid => write!(f, "Input current out of range"),
            ChargerError::ChargeVoltageInvalid => write!(f, "Charge voltage out of range"),
            ChargerError::ChargeCurrentInvalid => write!(f, "Charge current out of range"),
            ChargerError::I2CError => write!(f, "I2C error"),
        }
    }
}

/// CHG_STAT field of REG1C
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChargeStatus {
    NotCharging = 0x0,
    Trickle = 0x1,
    PreCharge = 0x2,
    FastCharge = 0x3,
    TaperCharge = 0x4,
    TopOff = 0x6,
    Done = 0x7,
}

impl Display for ChargeStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ChargeStatus::NotCharging => write!(f, "Not charging"),
            ChargeStatus::Trickle => write!(f, "Trickle charge"),
            ChargeStatus::PreCharge => write!(f, "Pre-charge"),
            ChargeStatus::FastCharge => write!(f, "Fast charge (CC)"),
            ChargeStatus::TaperCharge => write!(f, "Taper charge (CV)"),
            ChargeStatus::TopOff => write!(f, "Top-off timer"),
            ChargeStatus::Done => write!(f, "Charge done"),
        }
    }
}

/// VBUS_STAT field of REG1C
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum VbusStatus {
    NoInput = 0x0,
    UsbSdp = 0x1,
    UsbCdp = 0x2,
    UsbDcp = 0x3,
    Hvdcp = 0x4,
    Unknown = 0x5,
    NonStandard = 0x6,
    Otg = 0x7,
    NotQualified = 0x8,
    VbusDirect = 0xB,
}

impl Display for VbusStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            VbusStatus::NoInput => write!(f, "No input"),
            VbusStatus::UsbSdp => write!(f, "USB SDP (500 mA)"),
            VbusStatus::UsbCdp => write!(f, "USB CDP (1.5 A)"),
            VbusStatus::UsbDcp => write!(f, "USB DCP (3.25 A)"),
            VbusStatus::Hvdcp => write!(f, "HVDCP (1.5 A)"),
            VbusStatus::Unknown => write!(f, "Unknown adapter (3 A)"),
            VbusStatus::NonStandard => write!(f, "Non-standard adapter"),
            VbusStatus::Otg => write!(f, "OTG"),
            VbusStatus::NotQualified => write!(f, "Not qualified adapter"),
            VbusStatus::VbusDirect => write!(f, "Powered from VBUS"),
        }
    }
}

bitflags! {
    /// REG1B presence bits
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Presence: u8 {
        const VBUS = 0x01;
        /// VAC1, the USB connector
        const AC1  = 0x02;
        /// VAC2, the DC jack
        const AC2  = 0x04;
    }
}

bitflags! {
    /// Low nibble of REG1F, the JEITA window of the battery thermistor
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TsStatus: u8 {
        const HOT  = 0x01;
        const WARM = 0x02;
        const COOL = 0x04;
        const COLD = 0x08;
    }
}

/// One sample of the ADC channels the power path uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcReadings {
    pub vbus_mv: u16,
    pub ibus_ma: i16,
    pub vbat_mv: u16,
    pub ibat_ma: i16,
}

/// Converts the TS reading, in percent of REGN, to degrees Celsius.
///
/// Assumes a 10k beta 3950 NTC against a 10k pull-up, rounded to 0.5 °C.
pub(crate) fn ts_percent_to_celsius(percent: f64) -> Option<f64> {
    const BETA: f64 = 3950.0;
    const T0: f64 = 298.15;
    const R0: f64 = 10000.0;
    const R_PULL_UP: f64 = 10000.0;

    if percent <= 0.0 || percent >= 100.0 {
        return None;
    }
    let r_ntc = R_PULL_UP * percent / (100.0 - percent);
    let kelvin = 1.0 / (1.0 / T0 + libm::log(r_ntc / R0) / BETA);
    Some(libm::round((kelvin - 273.15) * 2.0) / 2.0)
}
