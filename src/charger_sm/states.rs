use log::{info, warn};

use super::{
    ChargerState, ChargerStateMachine, Error, SmError, NEGOTIATION_TIMEOUT_TICKS,
    TYPE_C_DEFAULT_CURRENT_MA,
};
use crate::collaborators::{
    ChargerDriver, ConnectionState, InputPath, PowerDeliveryController, RigPowerSensor,
    StatusIndicator, TickSource,
};
use crate::config::PdMode;
use crate::indicator::LedCommand;
use crate::Ticks;

type Entry<C, L> = Result<(), SmError<C, L>>;
type Polled<C, L> = Result<Option<Ticks>, SmError<C, L>>;

impl<C, P, R, L, T> ChargerStateMachine<C, P, R, L, T>
where
    C: ChargerDriver,
    P: PowerDeliveryController,
    R: RigPowerSensor,
    L: StatusIndicator,
    T: TickSource,
{
    pub(super) fn enter_disconnected(&mut self) -> Entry<C, L> {
        self.charger.set_charging(false).map_err(Error::Charger)?;
        self.charger.disable_source().map_err(Error::Charger)?;
        self.otg_voltage_mv = 0;
        self.otg_current_ma = 0;
        self.indicator.power_down().map_err(Error::Indicator)?;
        // a powered down driver is dark
        self.shown = Some(LedCommand::Off);
        Ok(())
    }

    pub(super) fn exit_disconnected(&mut self) -> Entry<C, L> {
        self.indicator.wake().map_err(Error::Indicator)?;
        self.shown = None;
        Ok(())
    }

    pub(super) fn poll_disconnected(&mut self) -> Polled<C, L> {
        let presence = self.charger.input_presence().map_err(Error::Charger)?;
        if presence.dc_jack {
            self.transition(ChargerState::DcCharging)?;
        } else if presence.usb && self.pd.connection_state() == ConnectionState::AttachedSink {
            self.transition(ChargerState::UsbNegotiating)?;
        }
        Ok(None)
    }

    pub(super) fn enter_dc_charging(&mut self) -> Entry<C, L> {
        self.charger
            .select_input(InputPath::DcJack)
            .map_err(Error::Charger)?;
        self.charger
            .set_input_current_limit(self.config.dc_input_current_limit_ma)
            .map_err(Error::Charger)?;
        self.start_charging()
    }

    pub(super) fn poll_dc_charging(&mut self) -> Polled<C, L> {
        if self.rig_inhibit()? {
            return Ok(None);
        }
        let presence = self.charger.input_presence().map_err(Error::Charger)?;
        if !presence.dc_jack {
            if presence.usb {
                if self.pd.connection_state() == ConnectionState::AttachedSink {
                    self.transition(ChargerState::UsbNegotiating)?;
                }
            } else {
                self.transition(ChargerState::Disconnected)?;
            }
        }
        Ok(None)
    }

    pub(super) fn enter_usb_negotiating(&mut self) -> Entry<C, L> {
        // charging waits for a contract or the timeout
        self.charger.set_charging(false).map_err(Error::Charger)?;
        self.charger
            .select_input(InputPath::Usb)
            .map_err(Error::Charger)?;
        self.apply_usb_input_limit(self.pd.advertised_current_ma())?;
        let timeout = match self.config.pd_mode {
            // due right away, nothing will negotiate
            PdMode::Off => 0,
            _ => NEGOTIATION_TIMEOUT_TICKS,
        };
        self.negotiation_timer.arm(self.clock.now(), timeout);
        Ok(())
    }

    pub(super) fn poll_usb_negotiating(&mut self) -> Polled<C, L> {
        if self.rig_inhibit()? {
            return Ok(None);
        }
        let now = self.clock.now();
        if self.config.pd_mode == PdMode::Off {
            // nothing will negotiate, skip the wait
            self.transition(ChargerState::UsbTypeCCharging)?;
        } else if self.negotiation_timer.expired(now) {
            info!("no PD contract, falling back to Type-C current");
            self.transition(ChargerState::UsbTypeCCharging)?;
        } else if self.pd.has_contract() {
            self.transition(ChargerState::UsbPdCharging)?;
        } else if !self.charger.input_presence().map_err(Error::Charger)?.usb {
            self.transition(ChargerState::Disconnected)?;
        }
        Ok(self.negotiation_timer.remaining(now))
    }

    pub(super) fn enter_usb_type_c_charging(&mut self) -> Entry<C, L> {
        let advertised = self.pd.advertised_current_ma();
        if advertised == TYPE_C_DEFAULT_CURRENT_MA {
            // possibly a legacy port, let D+/D- detection find the current
            self.charger
                .set_auto_detection(true)
                .map_err(Error::Charger)?;
        } else {
            self.charger
                .set_auto_detection(false)
                .map_err(Error::Charger)?;
            self.apply_usb_input_limit(advertised)?;
        }
        self.start_charging()
    }

    pub(super) fn poll_usb_type_c_charging(&mut self) -> Polled<C, L> {
        if self.rig_inhibit()? {
            return Ok(None);
        }
        let advertised = self.pd.advertised_current_ma();
        if advertised != TYPE_C_DEFAULT_CURRENT_MA && self.usb_input_limit_ma != Some(advertised) {
            if self.usb_input_limit_ma.is_none() {
                self.charger
                    .set_auto_detection(false)
                    .map_err(Error::Charger)?;
            }
            self.apply_usb_input_limit(advertised)?;
        }

        if self.pd.connection_state() != ConnectionState::AttachedSink {
            self.transition(ChargerState::Disconnected)?;
        } else if self.pd.has_contract() {
            self.transition(ChargerState::UsbPdCharging)?;
        }
        Ok(None)
    }

    pub(super) fn enter_usb_pd_charging(&mut self) -> Entry<C, L> {
        self.charger
            .set_auto_detection(false)
            .map_err(Error::Charger)?;
        self.charger
            .select_input(InputPath::Usb)
            .map_err(Error::Charger)?;
        self.apply_usb_input_limit(self.pd.advertised_current_ma())?;
        self.start_charging()
    }

    pub(super) fn poll_usb_pd_charging(&mut self) -> Polled<C, L> {
        if self.rig_inhibit()? {
            return Ok(None);
        }
        self.apply_usb_input_limit(self.pd.advertised_current_ma())?;

        if self.pd.connection_state() != ConnectionState::AttachedSink {
            self.transition(ChargerState::Disconnected)?;
        } else if !self.pd.has_contract() {
            self.transition(ChargerState::UsbTypeCCharging)?;
        }
        Ok(None)
    }

    pub(super) fn enter_rig_on(&mut self) -> Entry<C, L> {
        self.charger.set_charging(false).map_err(Error::Charger)
    }

    pub(super) fn poll_rig_on(&mut self) -> Polled<C, L> {
        if !self.rig.is_powered() {
            // restart from scratch once the rig is off
            self.transition(ChargerState::Disconnected)?;
        } else if self.charger.input_presence().map_err(Error::Charger)?.none() {
            self.transition(ChargerState::Disconnected)?;
        }
        Ok(None)
    }

    /// Also reached when a deferred request resumes after a fault.
    pub(super) fn enter_discharging(&mut self) -> Entry<C, L> {
        self.charger.set_charging(false).map_err(Error::Charger)?;
        self.charger
            .select_input(InputPath::Usb)
            .map_err(Error::Charger)?;
        if self.otg_current_ma == 0 {
            self.otg_current_ma = self.config.otg_current_limit_ma;
            self.charger
                .set_source_current_limit(self.otg_current_ma)
                .map_err(Error::Charger)?;
        }
        let millivolt = self.compensated_source_voltage(self.otg_voltage_mv);
        info!("sourcing {} mV (requested {} mV)", millivolt, self.otg_voltage_mv);
        self.charger
            .enable_source(millivolt)
            .map_err(Error::Charger)
    }

    pub(super) fn poll_discharging(&mut self) -> Polled<C, L> {
        if self.pd.connection_state() != ConnectionState::AttachedSource {
            self.charger.disable_source().map_err(Error::Charger)?;
            self.transition(ChargerState::Disconnected)?;
            return Ok(None);
        }

        let vbat_mv = self.charger.measure().map_err(Error::Charger)?.vbat_mv;
        if vbat_mv < self.config.discharging_voltage_limit_mv {
            warn!(
                "battery at {} mV, below the {} mV discharge floor",
                vbat_mv, self.config.discharging_voltage_limit_mv
            );
            self.discharging_low_battery = true;
            self.charger.disable_source().map_err(Error::Charger)?;
            self.otg_voltage_mv = 0;
            self.transition(ChargerState::DischargingBlocked)?;
        }
        Ok(None)
    }

    pub(super) fn poll_discharging_blocked(&mut self) -> Polled<C, L> {
        if self.pd.connection_state() != ConnectionState::AttachedSource {
            self.transition(ChargerState::Disconnected)?;
        }
        Ok(None)
    }

    pub(super) fn enter_fault(&mut self) -> Entry<C, L> {
        // charging and source forced off so neither runs on a faulted IC;
        // source targets are kept so the request can resume after the fault
        self.charger.set_charging(false).map_err(Error::Charger)?;
        self.charger.disable_source().map_err(Error::Charger)
    }

    /// Inputs going away only restores the previous mode once the fault
    /// register reads clear. A persistent fault keeps everything off.
    pub(super) fn poll_fault(&mut self) -> Polled<C, L> {
        if self.charger.input_presence().map_err(Error::Charger)?.none()
            && self.charger.fault_status().map_err(Error::Charger)? == 0
        {
            self.transition(self.pre_fault_state)?;
        }
        Ok(None)
    }

    /// Common tail of every charging entry: clear the low-battery latch and
    /// enable charging unless the rig inhibits it.
    fn start_charging(&mut self) -> Entry<C, L> {
        self.discharging_low_battery = false;
        if self.charging_inhibited() {
            return Ok(());
        }
        self.charger.set_charging(true).map_err(Error::Charger)
    }

    fn apply_usb_input_limit(&mut self, milliampere: u16) -> Entry<C, L> {
        if self.usb_input_limit_ma != Some(milliampere) {
            self.charger
                .set_input_current_limit(milliampere)
                .map_err(Error::Charger)?;
            self.usb_input_limit_ma = Some(milliampere);
        }
        Ok(())
    }
}
