use log::{debug, info, warn};

use super::{
    ChargerState, ChargerStateMachine, Error, RejectReason, SmError, SourceResponse,
    OTG_HEADROOM_CEILING_MV,
};
use crate::collaborators::{
    ChargerDriver, PowerDeliveryController, RigPowerSensor, StatusIndicator, TickSource,
};
use crate::events::{SourceRequest, SourceRequestChannel};

impl<C, P, R, L, T> ChargerStateMachine<C, P, R, L, T>
where
    C: ChargerDriver,
    P: PowerDeliveryController,
    R: RigPowerSensor,
    L: StatusIndicator,
    T: TickSource,
{
    /// Start, retarget or stop source mode. `0` stops it.
    ///
    /// Never calls [`ChargerStateMachine::run`]; any transition it needs happens here.
    pub fn on_source_voltage_request(
        &mut self,
        millivolt: u16,
    ) -> Result<SourceResponse, SmError<C, L>> {
        if millivolt == self.otg_voltage_mv {
            return Ok(SourceResponse::Unchanged);
        }

        if millivolt == 0 {
            info!("source mode off");
            self.otg_voltage_mv = 0;
            self.charger.disable_source().map_err(Error::Charger)?;
            match self.current_state {
                ChargerState::Discharging => self.transition(ChargerState::Disconnected)?,
                ChargerState::Fault if self.pre_fault_state == ChargerState::Discharging => {
                    self.pre_fault_state = ChargerState::Disconnected;
                }
                _ => {}
            }
            return Ok(SourceResponse::Applied);
        }

        if self.discharging_low_battery {
            return Ok(SourceResponse::Rejected(RejectReason::LowBattery));
        }
        // only starting is refused, an active source may keep running
        if self.current_state != ChargerState::Discharging
            && self.charger.input_presence().map_err(Error::Charger)?.dc_jack
        {
            return Ok(SourceResponse::Rejected(RejectReason::DcInputPresent));
        }

        if self.current_state == ChargerState::Fault {
            debug!("fault active, deferring source request of {} mV", millivolt);
            self.otg_voltage_mv = millivolt;
            self.pre_fault_state = ChargerState::Discharging;
            return Ok(SourceResponse::Deferred);
        }

        self.otg_voltage_mv = millivolt;
        if self.current_state == ChargerState::Discharging {
            let compensated = self.compensated_source_voltage(millivolt);
            info!("source retargeted to {} mV", compensated);
            self.charger
                .enable_source(compensated)
                .map_err(Error::Charger)?;
            return Ok(SourceResponse::Applied);
        }

        self.transition(ChargerState::Discharging)?;
        Ok(SourceResponse::Applied)
    }

    /// Clamped to the configured ceiling and forwarded in any state.
    pub fn on_source_current_request(&mut self, milliampere: u16) -> Result<(), SmError<C, L>> {
        let milliampere = milliampere.min(self.config.otg_current_limit_ma);
        if milliampere == self.otg_current_ma {
            return Ok(());
        }
        debug!("source current limit {} mA", milliampere);
        self.otg_current_ma = milliampere;
        self.charger
            .set_source_current_limit(milliampere)
            .map_err(Error::Charger)
    }

    /// Apply one request from the PD engine. Rejections are logged, not returned.
    pub fn handle_source_request(&mut self, request: SourceRequest) -> Result<(), SmError<C, L>> {
        match request {
            SourceRequest::Voltage(millivolt) => {
                if let SourceResponse::Rejected(reason) = self.on_source_voltage_request(millivolt)? {
                    warn!("source request of {} mV rejected: {:?}", millivolt, reason);
                }
                Ok(())
            }
            SourceRequest::Current(milliampere) => self.on_source_current_request(milliampere),
        }
    }

    /// Hand every queued request to the state machine, oldest first.
    pub fn drain_source_requests(
        &mut self,
        requests: &SourceRequestChannel,
    ) -> Result<(), SmError<C, L>> {
        while let Ok(request) = requests.try_receive() {
            self.handle_source_request(request)?;
        }
        Ok(())
    }

    /// Requested voltage plus the configured cable-drop headroom.
    pub(super) fn compensated_source_voltage(&self, millivolt: u16) -> u16 {
        let headroom = self.config.otg_voltage_headroom_mv;
        if headroom <= OTG_HEADROOM_CEILING_MV {
            millivolt.saturating_add(headroom)
        } else {
            millivolt
        }
    }
}
