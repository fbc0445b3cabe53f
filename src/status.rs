use core::fmt::{self, Display, Formatter};

use crate::charger_sm::ChargerState;
use crate::collaborators::{ChargeStatus, Measurements};

/// Power through the charger, both figures positive in the direction energy flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerFlow {
    pub input_mw: i32,
    pub output_mw: i32,
}

impl PowerFlow {
    /// While sourcing, the battery is the input and VBUS the output.
    pub fn from_measurements(m: &Measurements, sourcing: bool) -> Self {
        let bus_mw = m.vbus_mv as i32 * m.ibus_ma as i32 / 1000;
        let battery_mw = m.vbat_mv as i32 * m.ibat_ma as i32 / 1000;
        if sourcing {
            Self {
                input_mw: -battery_mw,
                output_mw: -bus_mw,
            }
        } else {
            Self {
                input_mw: bus_mw,
                output_mw: battery_mw,
            }
        }
    }

    /// Conversion efficiency in percent, `None` without input power.
    pub fn efficiency_percent(&self) -> Option<u8> {
        if self.input_mw <= 0 || self.output_mw < 0 {
            return None;
        }
        Some((self.output_mw as i64 * 100 / self.input_mw as i64).min(100) as u8)
    }
}

/// One diagnostics sample of the whole power path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub state: ChargerState,
    pub charge_status: ChargeStatus,
    pub measurements: Measurements,
    pub power: PowerFlow,
}

impl Display for StatusReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let m = &self.measurements;
        write!(
            f,
            "{} ({}): Vbus {} mV, Ibus {} mA, Vbat {} mV, Ibat {} mA, Pin {} mW, Pout {} mW",
            self.state,
            self.charge_status,
            m.vbus_mv,
            m.ibus_ma,
            m.vbat_mv,
            m.ibat_ma,
            self.power.input_mw,
            self.power.output_mw
        )
    }
}
