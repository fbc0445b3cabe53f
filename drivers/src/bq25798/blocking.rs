use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::*;
use crate::BlockingRegisterDevice;

/// BQ25798 buck-boost charger.
///
/// VAC1 is wired to the USB connector and VAC2 to the DC jack, each behind
/// its own ACFET pair driven by ACDRV1 and ACDRV2.
#[derive(Debug)]
pub struct BQ25798<I2C> {
    dev: BlockingRegisterDevice<I2C>,
}

impl<I2C> BQ25798<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self {
            dev: BlockingRegisterDevice::new(i2c, BQ25798_ADDRESS),
        }
    }

    /// Resets all registers and applies the board configuration.
    ///
    /// Charging stays disabled and both ACFETs stay open until an input is selected.
    pub fn init<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), ChargerError> {
        if !self.test_connection()? {
            return Err(ChargerError::Init);
        }
        self.dev
            .write_register(&[REG_TERMINATION_CONTROL, RESET_COMMAND])?;
        delay.delay_ms(RESET_SETTLE_MS);

        for write in INIT_SEQUENCE {
            self.dev.write_register(write)?;
        }
        Ok(())
    }

    /// True if REG48 identifies a BQ25798.
    pub fn test_connection(&mut self) -> Result<bool, ChargerError> {
        let part = self.dev.read_register(REG_PART_INFORMATION)?;
        Ok((part >> 3) & 0x07 == PART_NUMBER)
    }

    /// Reads and clears the flag registers.
    ///
    /// Returns true if an input appeared or vanished or the thermistor
    /// crossed a JEITA threshold.
    pub fn take_interrupt(&mut self) -> Result<bool, ChargerError> {
        let flag_0 = self.dev.read_register(REG_FLAG_0)?;
        let flag_3 = self.dev.read_register(REG_FLAG_3)?;
        Ok(flag_0 & 0x06 != 0 || flag_3 & 0x0F != 0)
    }

    // Register 0x0F

    pub fn set_charging(&mut self, enable: bool) -> Result<(), ChargerError> {
        self.dev
            .modify_register(REG_CHARGER_CONTROL_0, EN_CHG, if enable { EN_CHG } else { 0 })?;
        Ok(())
    }

    pub fn is_charging_enabled(&mut self) -> Result<bool, ChargerError> {
        Ok(self.dev.read_register(REG_CHARGER_CONTROL_0)? & EN_CHG != 0)
    }

    // Register 0x11

    /// Enabling also forces a new D+/D- detection right away.
    pub fn set_bc12_detection(&mut self, enable: bool) -> Result<(), ChargerError> {
        if enable {
            let bits = FORCE_INDET | AUTO_INDET_EN;
            self.dev
                .modify_register(REG_CHARGER_CONTROL_2, bits, bits)?;
        } else {
            self.dev
                .modify_register(REG_CHARGER_CONTROL_2, AUTO_INDET_EN, 0)?;
        }
        Ok(())
    }

    // Registers 0x0B, 0x0D, 0x12 and 0x47

    /// Starts boosting onto VBUS at `millivolt`.
    pub fn enable_otg(&mut self, millivolt: u16) -> Result<(), ChargerError> {
        if !(VOTG_MIN..=VOTG_MAX).contains(&millivolt) {
            return Err(ChargerError::OtgVoltageInvalid);
        }
        self.dev
            .write_register16(REG_VOTG, (millivolt - VOTG_BASE) / VOTG_STEP)?;
        self.dev.write_register(&[REG_DPDM_DRIVER, DPDM_OTG])?;
        self.dev
            .modify_register(REG_CHARGER_CONTROL_3, EN_OTG, EN_OTG)?;
        Ok(())
    }

    pub fn disable_otg(&mut self) -> Result<(), ChargerError> {
        self.dev.modify_register(REG_CHARGER_CONTROL_3, EN_OTG, 0)?;
        self.dev.write_register(&[REG_DPDM_DRIVER, 0x00])?;
        Ok(())
    }

    pub fn is_otg_enabled(&mut self) -> Result<bool, ChargerError> {
        Ok(self.dev.read_register(REG_CHARGER_CONTROL_3)? & EN_OTG != 0)
    }

    pub fn set_otg_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        if !(IOTG_MIN..=IOTG_MAX).contains(&milliampere) {
            return Err(ChargerError::OtgCurrentInvalid);
        }
        self.dev
            .write_register(&[REG_IOTG, (milliampere / IOTG_STEP) as u8])?;
        Ok(())
    }

    // Register 0x13

    /// Closes the ACFETs of VAC1 (USB) and VAC2 (DC jack).
    pub fn set_acdrv(&mut self, acdrv1: bool, acdrv2: bool) -> Result<(), ChargerError> {
        let mut bits = 0;
        if acdrv1 {
            bits |= EN_ACDRV1;
        }
        if acdrv2 {
            bits |= EN_ACDRV2;
        }
        self.dev
            .modify_register(REG_CHARGER_CONTROL_4, EN_ACDRV1 | EN_ACDRV2, bits)?;
        Ok(())
    }

    /// ACDRV1 and ACDRV2 enable bits, in that order.
    pub fn acdrv(&mut self) -> Result<(bool, bool), ChargerError> {
        let val = self.dev.read_register(REG_CHARGER_CONTROL_4)?;
        Ok((val & EN_ACDRV1 != 0, val & EN_ACDRV2 != 0))
    }

    // Limits

    pub fn set_input_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        if !(IINDPM_MIN..=IINDPM_MAX).contains(&milliampere) {
            return Err(ChargerError::InputCurrentInvalid);
        }
        self.dev
            .write_register16(REG_INPUT_CURRENT_LIMIT, milliampere / IINDPM_STEP)?;
        Ok(())
    }

    pub fn input_current_limit(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_INPUT_CURRENT_LIMIT)? * IINDPM_STEP)
    }

    pub fn input_voltage_limit(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register(REG_INPUT_VOLTAGE_LIMIT)? as u16 * VINDPM_STEP)
    }

    pub fn set_charge_voltage_limit(&mut self, millivolt: u16) -> Result<(), ChargerError> {
        if !(VREG_MIN..=VREG_MAX).contains(&millivolt) {
            return Err(ChargerError::ChargeVoltageInvalid);
        }
        self.dev
            .write_register16(REG_CHARGE_VOLTAGE_LIMIT, millivolt / VREG_STEP)?;
        Ok(())
    }

    pub fn charge_voltage_limit(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_CHARGE_VOLTAGE_LIMIT)? * VREG_STEP)
    }

    pub fn set_charge_current_limit(&mut self, milliampere: u16) -> Result<(), ChargerError> {
        if !(ICHG_MIN..=ICHG_MAX).contains(&milliampere) {
            return Err(ChargerError::ChargeCurrentInvalid);
        }
        self.dev
            .write_register16(REG_CHARGE_CURRENT_LIMIT, milliampere / ICHG_STEP)?;
        Ok(())
    }

    pub fn charge_current_limit(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_CHARGE_CURRENT_LIMIT)? * ICHG_STEP)
    }

    /// Pulls VBUS and VAC1 down, draining a source that was just switched off.
    pub fn set_vbus_discharge(&mut self, discharge: bool) -> Result<(), ChargerError> {
        let bits = if discharge { VBUS_PULL_DOWN } else { 0 };
        self.dev
            .modify_register(REG_CHARGER_CONTROL_7, VBUS_PULL_DOWN, bits)?;
        Ok(())
    }

    /// With the thermistor ignored the JEITA windows never suspend charging.
    pub fn set_thermistor(&mut self, enable: bool) -> Result<(), ChargerError> {
        let bits = if enable { 0 } else { TS_IGNORE };
        self.dev
            .modify_register(REG_NTC_CONTROL_1, TS_IGNORE, bits)?;
        Ok(())
    }

    // Status

    pub fn presence(&mut self) -> Result<Presence, ChargerError> {
        let val = self.dev.read_register(REG_STATUS_0)?;
        Ok(Presence::from_bits_truncate(val))
    }

    pub fn charge_status(&mut self) -> Result<ChargeStatus, ChargerError> {
        let val = (self.dev.read_register(REG_STATUS_1)? >> 5) & 0x07;
        // 0x5 is reserved
        Ok(ChargeStatus::try_from(val).unwrap_or(ChargeStatus::NotCharging))
    }

    pub fn vbus_status(&mut self) -> Result<VbusStatus, ChargerError> {
        let val = (self.dev.read_register(REG_STATUS_1)? >> 1) & 0x0F;
        Ok(VbusStatus::try_from(val).unwrap_or(VbusStatus::Unknown))
    }

    pub fn is_battery_present(&mut self) -> Result<bool, ChargerError> {
        Ok(self.dev.get_register_bit(REG_STATUS_2, 0)?)
    }

    pub fn ts_status(&mut self) -> Result<TsStatus, ChargerError> {
        let val = self.dev.read_register(REG_STATUS_4)?;
        Ok(TsStatus::from_bits_truncate(val & 0x0F))
    }

    /// FAULT_STATUS_0 in the high byte, FAULT_STATUS_1 in the low byte.
    pub fn fault_status(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_FAULT_STATUS_0)?)
    }

    // ADC

    pub fn measure_vbus(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_VBUS_ADC)?)
    }

    /// Negative while sourcing.
    pub fn measure_ibus(&mut self) -> Result<i16, ChargerError> {
        Ok(self.dev.read_register16(REG_IBUS_ADC)? as i16)
    }

    pub fn measure_vbat(&mut self) -> Result<u16, ChargerError> {
        Ok(self.dev.read_register16(REG_VBAT_ADC)?)
    }

    /// Negative while discharging.
    pub fn measure_ibat(&mut self) -> Result<i16, ChargerError> {
        Ok(self.dev.read_register16(REG_IBAT_ADC)? as i16)
    }

    pub fn read_adc(&mut self) -> Result<AdcReadings, ChargerError> {
        Ok(AdcReadings {
            vbus_mv: self.measure_vbus()?,
            ibus_ma: self.measure_ibus()?,
            vbat_mv: self.measure_vbat()?,
            ibat_ma: self.measure_ibat()?,
        })
    }

    /// Die temperature in °C, 0.5 °C resolution.
    pub fn die_temperature(&mut self) -> Result<f32, ChargerError> {
        let raw = self.dev.read_register16(REG_TDIE_ADC)? as i16;
        Ok(raw as f32 * 0.5)
    }

    /// TS pin voltage in percent of REGN.
    pub fn thermistor_percent(&mut self) -> Result<f64, ChargerError> {
        let raw = self.dev.read_register16(REG_TS_ADC)?;
        Ok(raw as f64 * 0.0976563)
    }

    /// Battery thermistor temperature in °C, `None` if the TS pin reads open or shorted.
    pub fn thermistor_temperature(&mut self) -> Result<Option<f64>, ChargerError> {
        let percent = self.thermistor_percent()?;
        Ok(ts_percent_to_celsius(percent))
    }
}
