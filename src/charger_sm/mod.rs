//! The power-path state machine.
//!
//! Exactly one [`ChargerState`] is active at a time. Every state owns an entry
//! action, an exit action and a poll handler, looked up through an exhaustive
//! match in [`ChargerStateMachine::handlers`]. Only [`ChargerStateMachine::transition`]
//! runs entry and exit actions; poll handlers only ever request transitions.
//!
//! A cycle of [`ChargerStateMachine::run`] is always: fault check, poll of the
//! (possibly just changed) state, indicator refresh.

use core::fmt::{self, Debug, Display, Formatter};

use log::{debug, info, warn};

use crate::collaborators::{
    ChargerDriver, PowerDeliveryController, RigPowerSensor, StatusIndicator, TickSource,
};
use crate::config::ChargerConfig;
use crate::indicator::{command_for, IndicatorInputs, LedCommand};
use crate::status::{PowerFlow, StatusReport};
use crate::timer::NegotiationTimer;
use crate::Ticks;

mod source;
mod states;

#[cfg(test)]
mod tests;

/// How long a USB sink waits for a PD contract before settling for Type-C current.
pub const NEGOTIATION_TIMEOUT_TICKS: Ticks = 3000;

/// Current a Type-C source advertises before anything better is known.
pub const TYPE_C_DEFAULT_CURRENT_MA: u16 = 500;

/// Source voltage headroom is only added when configured at or below this.
pub const OTG_HEADROOM_CEILING_MV: u16 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerState {
    /// No usable input and not sourcing
    #[default]
    Disconnected,
    DcCharging,
    /// USB sink attached, waiting for a PD contract
    UsbNegotiating,
    UsbTypeCCharging,
    UsbPdCharging,
    /// Charging inhibited while the rig is powered
    RigOn,
    /// Sourcing power out of the USB port
    Discharging,
    /// Source mode withdrawn on low battery, partner still attached
    DischargingBlocked,
    Fault,
}

impl ChargerState {
    pub fn is_charging(&self) -> bool {
        matches!(
            self,
            ChargerState::DcCharging | ChargerState::UsbTypeCCharging | ChargerState::UsbPdCharging
        )
    }

    /// States whose indicator depends on live temperature and current readings.
    pub fn shows_power_flow(&self) -> bool {
        self.is_charging() || *self == ChargerState::Discharging
    }
}

impl Display for ChargerState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ChargerState::Disconnected => write!(f, "Disconnected"),
            ChargerState::DcCharging => write!(f, "DC charging"),
            ChargerState::UsbNegotiating => write!(f, "USB negotiating"),
            ChargerState::UsbTypeCCharging => write!(f, "USB Type-C charging"),
            ChargerState::UsbPdCharging => write!(f, "USB PD charging"),
            ChargerState::RigOn => write!(f, "Rig on"),
            ChargerState::Discharging => write!(f, "Discharging"),
            ChargerState::DischargingBlocked => write!(f, "Discharging blocked"),
            ChargerState::Fault => write!(f, "Fault"),
        }
    }
}

/// A collaborator call failed. Nothing is retried; the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<C, L> {
    Charger(C),
    Indicator(L),
}

impl<C: Debug, L: Debug> Display for Error<C, L> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Charger(e) => write!(f, "charger: {e:?}"),
            Error::Indicator(e) => write!(f, "indicator: {e:?}"),
        }
    }
}

pub type SmError<C, L> = Error<<C as ChargerDriver>::Error, <L as StatusIndicator>::Error>;

/// Outcome of a source voltage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceResponse {
    Applied,
    /// Same voltage as already applied, nothing sent to the charger
    Unchanged,
    /// Recorded while in `Fault`, applied once the fault clears
    Deferred,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RejectReason {
    /// Battery ran low while sourcing; a charge cycle is needed first
    LowBattery,
    /// The charger IC refuses to start source mode with the DC jack asserted
    DcInputPresent,
}

type Action<M, E> = fn(&mut M) -> Result<(), E>;
type Poll<M, E> = fn(&mut M) -> Result<Option<Ticks>, E>;

struct Handlers<M, E> {
    enter: Action<M, E>,
    exit: Action<M, E>,
    poll: Poll<M, E>,
}

pub struct ChargerStateMachine<C, P, R, L, T> {
    charger: C,
    pd: P,
    rig: R,
    indicator: L,
    clock: T,
    config: ChargerConfig,

    current_state: ChargerState,
    pre_fault_state: ChargerState,
    otg_voltage_mv: u16,
    otg_current_ma: u16,
    discharging_low_battery: bool,
    negotiation_timer: NegotiationTimer,
    /// Last command sent to the indicator
    shown: Option<LedCommand>,
    /// Last USB input limit written, `None` while BC1.2 detection owns it
    usb_input_limit_ma: Option<u16>,
}

impl<C, P, R, L, T> ChargerStateMachine<C, P, R, L, T>
where
    C: ChargerDriver,
    P: PowerDeliveryController,
    R: RigPowerSensor,
    L: StatusIndicator,
    T: TickSource,
{
    pub fn new(charger: C, pd: P, rig: R, indicator: L, clock: T, config: ChargerConfig) -> Self {
        let mut sm = Self {
            charger,
            pd,
            rig,
            indicator,
            clock,
            config,
            current_state: ChargerState::Disconnected,
            pre_fault_state: ChargerState::Disconnected,
            otg_voltage_mv: 0,
            otg_current_ma: 0,
            discharging_low_battery: false,
            negotiation_timer: NegotiationTimer::new(),
            shown: None,
            usb_input_limit_ma: None,
        };
        sm.init();
        sm
    }

    /// Back to `Disconnected` with every target and latch cleared. Touches no hardware.
    pub fn init(&mut self) {
        self.current_state = ChargerState::Disconnected;
        self.pre_fault_state = ChargerState::Disconnected;
        self.otg_voltage_mv = 0;
        self.otg_current_ma = 0;
        self.discharging_low_battery = false;
        self.negotiation_timer.disarm();
        self.shown = None;
        self.usb_input_limit_ma = None;
    }

    /// Write the charge limits and thermistor setting from the configuration.
    pub fn apply_static_config(&mut self) -> Result<(), SmError<C, L>> {
        let config = self.config;
        info!(
            "charge limits {} mV / {} mA, thermistor {}",
            config.charging_voltage_limit_mv,
            config.charging_current_limit_ma,
            if config.enable_thermistor { "on" } else { "off" }
        );
        self.charger
            .set_charge_voltage_limit(config.charging_voltage_limit_mv)
            .map_err(Error::Charger)?;
        self.charger
            .set_charge_current_limit(config.charging_current_limit_ma)
            .map_err(Error::Charger)?;
        self.charger
            .set_thermistor(config.enable_thermistor)
            .map_err(Error::Charger)
    }

    /// One scheduling cycle. Returns the ticks until the next call is needed,
    /// `None` when only an external event can make progress.
    pub fn run(&mut self) -> Result<Option<Ticks>, SmError<C, L>> {
        self.check_faults()?;
        let poll = Self::handlers(self.current_state).poll;
        let deadline = poll(self)?;
        self.refresh_indicator()?;
        // a transition this cycle may have armed the negotiation timer
        let timer = self.negotiation_timer.remaining(self.clock.now());
        Ok(deadline.into_iter().chain(timer).min())
    }

    pub fn on_pd_state_change(&self) {
        debug!(
            "pd: {}, contract {}",
            self.pd.connection_state(),
            self.pd.has_contract()
        );
    }

    pub fn on_kx2_state_change(&self, on: bool) {
        debug!("rig power {}", if on { "on" } else { "off" });
    }

    pub fn on_bq_interrupt(&self) {
        debug!("charger interrupt in {}", self.current_state);
    }

    /// Sample the charger for diagnostics.
    pub fn status(&mut self) -> Result<StatusReport, SmError<C, L>> {
        let measurements = self.charger.measure().map_err(Error::Charger)?;
        let charge_status = self.charger.charge_status().map_err(Error::Charger)?;
        let sourcing = self.current_state == ChargerState::Discharging;
        Ok(StatusReport {
            state: self.current_state,
            charge_status,
            measurements,
            power: PowerFlow::from_measurements(&measurements, sourcing),
        })
    }

    pub fn state(&self) -> ChargerState {
        self.current_state
    }

    pub fn pre_fault_state(&self) -> ChargerState {
        self.pre_fault_state
    }

    pub fn otg_voltage_mv(&self) -> u16 {
        self.otg_voltage_mv
    }

    pub fn otg_current_ma(&self) -> u16 {
        self.otg_current_ma
    }

    pub fn is_low_battery_latched(&self) -> bool {
        self.discharging_low_battery
    }

    pub fn config(&self) -> &ChargerConfig {
        &self.config
    }

    /// Direct access for liveness probes. Mode-affecting commands must go
    /// through the state machine.
    pub fn charger_mut(&mut self) -> &mut C {
        &mut self.charger
    }

    fn handlers(state: ChargerState) -> Handlers<Self, SmError<C, L>> {
        match state {
            ChargerState::Disconnected => Handlers {
                enter: Self::enter_disconnected,
                exit: Self::exit_disconnected,
                poll: Self::poll_disconnected,
            },
            ChargerState::DcCharging => Handlers {
                enter: Self::enter_dc_charging,
                exit: Self::no_action,
                poll: Self::poll_dc_charging,
            },
            ChargerState::UsbNegotiating => Handlers {
                enter: Self::enter_usb_negotiating,
                exit: Self::no_action,
                poll: Self::poll_usb_negotiating,
            },
            ChargerState::UsbTypeCCharging => Handlers {
                enter: Self::enter_usb_type_c_charging,
                exit: Self::no_action,
                poll: Self::poll_usb_type_c_charging,
            },
            ChargerState::UsbPdCharging => Handlers {
                enter: Self::enter_usb_pd_charging,
                exit: Self::no_action,
                poll: Self::poll_usb_pd_charging,
            },
            ChargerState::RigOn => Handlers {
                enter: Self::enter_rig_on,
                exit: Self::no_action,
                poll: Self::poll_rig_on,
            },
            ChargerState::Discharging => Handlers {
                enter: Self::enter_discharging,
                exit: Self::no_action,
                poll: Self::poll_discharging,
            },
            ChargerState::DischargingBlocked => Handlers {
                enter: Self::no_action,
                exit: Self::no_action,
                poll: Self::poll_discharging_blocked,
            },
            ChargerState::Fault => Handlers {
                enter: Self::enter_fault,
                exit: Self::no_action,
                poll: Self::poll_fault,
            },
        }
    }

    fn no_action(&mut self) -> Result<(), SmError<C, L>> {
        Ok(())
    }

    fn transition(&mut self, next: ChargerState) -> Result<(), SmError<C, L>> {
        if next == self.current_state {
            return Ok(());
        }
        info!("charger state {} -> {}", self.current_state, next);

        self.negotiation_timer.disarm();
        (Self::handlers(self.current_state).exit)(self)?;
        self.current_state = next;
        self.usb_input_limit_ma = None;
        (Self::handlers(next).enter)(self)?;
        self.refresh_indicator()
    }

    fn check_faults(&mut self) -> Result<(), SmError<C, L>> {
        let fault = self.charger.fault_status().map_err(Error::Charger)?;
        if fault != 0 && self.current_state != ChargerState::Fault {
            warn!("charger fault {:#06x} in {}", fault, self.current_state);
            self.pre_fault_state = self.current_state;
            self.transition(ChargerState::Fault)
        } else if fault == 0 && self.current_state == ChargerState::Fault {
            info!("charger fault cleared, resuming {}", self.pre_fault_state);
            self.transition(self.pre_fault_state)
        } else {
            Ok(())
        }
    }

    /// Charging is inhibited while the rig is powered, unless configured otherwise.
    fn charging_inhibited(&self) -> bool {
        self.rig.is_powered() && !self.config.charge_when_rig_is_on
    }

    /// Moves to `RigOn` and returns `true` if charging is inhibited.
    fn rig_inhibit(&mut self) -> Result<bool, SmError<C, L>> {
        if self.charging_inhibited() {
            self.transition(ChargerState::RigOn)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn refresh_indicator(&mut self) -> Result<(), SmError<C, L>> {
        let inputs = if self.current_state.shows_power_flow() {
            IndicatorInputs {
                temperature: self.charger.temperature_status().map_err(Error::Charger)?,
                battery_current_ma: self.charger.measure().map_err(Error::Charger)?.ibat_ma,
                charge_status: self.charger.charge_status().map_err(Error::Charger)?,
            }
        } else {
            IndicatorInputs::default()
        };

        let command = command_for(self.current_state, &inputs);
        if self.shown != Some(command) {
            self.indicator.show(command).map_err(Error::Indicator)?;
            self.shown = Some(command);
        }
        Ok(())
    }
}
