//! Power Management Unit (PMU) hardware module
//!
//! The BQ25798 charger on the shared I2C bus, adapted to the
//! [`ChargerDriver`] seam of the state machine.

use drivers::bq25798::{self, ChargerError, Presence, BQ25798};
use embassy_time::Delay;
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::AtomicDevice;
use embedded_hal_bus::util::AtomicCell;
use esp_hal::gpio::Input;
use log::{debug, info};
use pd_charger::collaborators::{
    ChargeStatus, ChargerDriver, InputPath, InputPresence, Measurements, TemperatureStatus,
};
use pd_charger::events::PendingEvents;

use crate::controller::raise_event;

pub struct PmuImpl<'a, BUS>
where
    BUS: I2c,
{
    pmu: BQ25798<AtomicDevice<'a, BUS>>,
    /// VBUS pull-downs are on since source mode was switched off
    vbus_discharge: bool,
}

impl<BUS> PmuImpl<'static, BUS>
where
    BUS: I2c,
{
    /// Resets and configures the charger.
    ///
    /// # Panics
    ///
    /// Panics if the BQ25798 does not answer or any setup step fails.
    pub fn new(i2c_ref_cell: &'static AtomicCell<BUS>) -> Self {
        let mut pmu = BQ25798::new(AtomicDevice::new(i2c_ref_cell));
        pmu.init(&mut Delay).expect("BQ25798 initialization failed");

        info!(
            "Charge voltage limit: {}mV",
            pmu.charge_voltage_limit()
                .expect("charge_voltage_limit failed")
        );
        info!(
            "Charge current limit: {}mA",
            pmu.charge_current_limit()
                .expect("charge_current_limit failed")
        );
        info!(
            "Input voltage limit: {}mV",
            pmu.input_voltage_limit()
                .expect("input_voltage_limit failed")
        );
        info!(
            "Battery present: {}",
            pmu.is_battery_present()
                .expect("is_battery_present failed")
        );

        Self {
            pmu,
            vbus_discharge: false,
        }
    }
}

impl<BUS> PmuImpl<'_, BUS>
where
    BUS: I2c,
{
    /// Part information read, used to gate the watchdog.
    pub fn test_connection(&mut self) -> bool {
        self.pmu.test_connection().unwrap_or(false)
    }

    /// True if the interrupt was about input presence or the thermistor.
    pub fn take_interrupt(&mut self) -> Result<bool, ChargerError> {
        self.pmu.take_interrupt()
    }

    pub fn log_temperatures(&mut self) -> Result<(), ChargerError> {
        let die = self.pmu.die_temperature()?;
        match self.pmu.thermistor_temperature()? {
            Some(battery) => info!("Die {}°C, battery {}°C", die, battery),
            None => info!("Die {}°C, no thermistor", die),
        }
        debug!("VBUS: {}", self.pmu.vbus_status()?);
        Ok(())
    }

    fn stop_vbus_discharge(&mut self) -> Result<(), ChargerError> {
        if self.vbus_discharge {
            self.pmu.set_vbus_discharge(false)?;
            self.vbus_discharge = false;
        }
        Ok(())
    }
}

fn charge_status(status: bq25798::ChargeStatus) -> ChargeStatus {
    match status {
        bq25798::ChargeStatus::NotCharging => ChargeStatus::NotCharging,
        bq25798::ChargeStatus::Trickle => ChargeStatus::Trickle,
        bq25798::ChargeStatus::PreCharge => ChargeStatus::PreCharge,
        bq25798::ChargeStatus::FastCharge => ChargeStatus::FastCharge,
        bq25798::ChargeStatus::TaperCharge => ChargeStatus::TaperCharge,
        bq25798::ChargeStatus::TopOff => ChargeStatus::TopOff,
        bq25798::ChargeStatus::Done => ChargeStatus::Done,
    }
}

impl<BUS> ChargerDriver for PmuImpl<'_, BUS>
where
    BUS: I2c,
{
    type Error = ChargerError;

    fn input_presence(&mut self) -> Result<InputPresence, ChargerError> {
        let presence = self.pmu.presence()?;
        Ok(InputPresence {
            usb: presence.contains(Presence::AC1),
            dc_jack: presence.contains(Presence::AC2),
        })
    }

    fn fault_status(&mut self) -> Result<u16, ChargerError> {
        self.pmu.fault_status()
    }

    fn temperature_status(&mut self) -> Result<TemperatureStatus, ChargerError> {
        let ts = self.pmu.ts_status()?;
        Ok(TemperatureStatus::from_bits_truncate(ts.bits()))
    }

    fn charge_status(&mut self) -> Result<ChargeStatus, ChargerError> {
        Ok(charge_status(self.pmu.charge_status()?))
    }

    fn measure(&mut self) -> Result<Measurements, ChargerError> {
        let adc = self.pmu.read_adc()?;
        Ok(Measurements {
            vbus_mv: adc.vbus_mv,
            ibus_ma: adc.ibus_ma,
            vbat_mv: adc.vbat_mv,
            ibat_ma: adc.ibat_ma,
        })
    }

    fn select_input(&mut self, path: InputPath) -> Result<(), ChargerError> {
        self.stop_vbus_discharge()?;
        match path {
            InputPath::Usb => self.pmu.set_acdrv(true, false),
            InputPath::DcJack => self.pmu.set_acdrv(false, true),
        }
    }

    fn set_input_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        self.pmu.set_input_current_limit(milliampere)
    }

    fn set_charging(&mut self, enable: bool) -> Result<(), ChargerError> {
        self.pmu.set_charging(enable)
    }

    fn set_auto_detection(&mut self, enable: bool) -> Result<(), ChargerError> {
        self.pmu.set_bc12_detection(enable)
    }

    fn enable_source(&mut self, millivolt: u16) -> Result<(), ChargerError> {
        self.stop_vbus_discharge()?;
        self.pmu.enable_otg(millivolt)
    }

    fn disable_source(&mut self) -> Result<(), ChargerError> {
        if !self.pmu.is_otg_enabled()? {
            return Ok(());
        }
        self.pmu.disable_otg()?;
        // drain what is left on VBUS before the next attach
        self.pmu.set_vbus_discharge(true)?;
        self.vbus_discharge = true;
        Ok(())
    }

    fn set_source_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        self.pmu.set_otg_current_limit(milliampere)
    }

    fn set_charge_voltage_limit(&mut self, millivolt: u16) -> Result<(), ChargerError> {
        self.pmu.set_charge_voltage_limit(millivolt)
    }

    fn set_charge_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        self.pmu.set_charge_current_limit(milliampere)
    }

    fn set_thermistor(&mut self, enable: bool) -> Result<(), ChargerError> {
        self.pmu.set_thermistor(enable)
    }
}

/// Forwards the BQ25798 INT line, active low, to the controller loop.
#[embassy_executor::task]
pub async fn charger_irq_task(mut int: Input<'static>) {
    loop {
        int.wait_for_falling_edge().await;
        raise_event(PendingEvents::CHARGER);
    }
}
