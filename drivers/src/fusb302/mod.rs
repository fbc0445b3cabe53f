//! <https://www.onsemi.com/pdf/datasheet/fusb302b-d.pdf>
//!
//! FUSB302 Type-C port controller, used here for attach detection only.
//! The hardware toggle runs until a partner shows up, then the port settles
//! as sink or source depending on which termination it sees. Detection is
//! polled, the INT line is not used.

use core::fmt::{self, Display, Formatter};

use embedded_hal::i2c::Error;

pub mod blocking;

pub use blocking::FUSB302;

pub const FUSB302_ADDRESS: u8 = 0x22;

pub(crate) const REG_DEVICE_ID: u8 = 0x01;
pub(crate) const REG_SWITCHES0: u8 = 0x02;
pub(crate) const REG_MEASURE: u8 = 0x04;
pub(crate) const REG_CONTROL0: u8 = 0x06;
pub(crate) const REG_CONTROL2: u8 = 0x08;
pub(crate) const REG_POWER: u8 = 0x0B;
pub(crate) const REG_RESET: u8 = 0x0C;
pub(crate) const REG_STATUS1A: u8 = 0x3D;
pub(crate) const REG_STATUS0: u8 = 0x40;

// Switches0
pub(crate) const PU_EN2: u8 = 0x80;
pub(crate) const PU_EN1: u8 = 0x40;
pub(crate) const MEAS_CC2: u8 = 0x08;
pub(crate) const MEAS_CC1: u8 = 0x04;
pub(crate) const PDWN2: u8 = 0x02;
pub(crate) const PDWN1: u8 = 0x01;

// Control0, HOST_CUR in bits 3:2
pub(crate) const HOST_CUR_MASK: u8 = 0x0C;
pub(crate) const HOST_CUR_1500MA: u8 = 0x08;

// Control2, MODE in bits 2:1
pub(crate) const MODE_DRP: u8 = 0x02;
pub(crate) const MODE_SNK: u8 = 0x04;
pub(crate) const MODE_SRC: u8 = 0x06;
pub(crate) const TOGGLE: u8 = 0x01;

pub(crate) const SW_RES: u8 = 0x01;
pub(crate) const POWER_ALL: u8 = 0x0F;

/// MDAC threshold of 1.6 V, above it the sink's Rd is gone
pub(crate) const MDAC_DETACH: u8 = 0x26;

// Status0
pub(crate) const VBUSOK: u8 = 0x80;
pub(crate) const COMP: u8 = 0x20;
pub(crate) const BC_LVL_MASK: u8 = 0x03;

/// Current a Type-C sink may draw before anything else is known
pub const DEFAULT_CURRENT_MA: u16 = 500;

/// Errors that can occur when interacting with the FUSB302
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortError {
    /// Device ID does not look like an FUSB302
    Init,
    I2CError,
}

impl<E> From<E> for PortError
where
    E: Error,
{
    fn from(_: E) -> Self {
        PortError::I2CError
    }
}

impl Display for PortError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PortError::Init => write!(f, "Not an FUSB302"),
            PortError::I2CError => write!(f, "I2C error"),
        }
    }
}

/// Which terminations the hardware toggle presents while unattached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortRole {
    Sink,
    Source,
    #[default]
    DualRole,
}

impl PortRole {
    pub(crate) fn mode(self) -> u8 {
        match self {
            PortRole::Sink => MODE_SNK,
            PortRole::Source => MODE_SRC,
            PortRole::DualRole => MODE_DRP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcPin {
    Cc1,
    Cc2,
}

/// Power role the port settled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attachment {
    #[default]
    Detached,
    /// The partner presents Rp and VBUS, we draw power
    Sink(CcPin),
    /// The partner presents Rd, we provide power
    Source(CcPin),
}

impl Display for Attachment {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Attachment::Detached => write!(f, "Detached"),
            Attachment::Sink(cc) => write!(f, "Sink on {:?}", cc),
            Attachment::Source(cc) => write!(f, "Source on {:?}", cc),
        }
    }
}

/// Connection as last seen by [`FUSB302::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatus {
    pub attachment: Attachment,
    /// Current advertised by the partner's Rp, only meaningful as sink
    pub current_ma: u16,
}

/// Maps BC_LVL of Status0 to the advertised Type-C current.
///
/// Level 0 means no Rp at all, which is treated like default USB power.
pub(crate) fn bc_lvl_current_ma(status0: u8) -> u16 {
    match status0 & BC_LVL_MASK {
        2 => 1500,
        3 => 3000,
        _ => DEFAULT_CURRENT_MA,
    }
}
