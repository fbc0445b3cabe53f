use embedded_hal::i2c::I2c;

use super::*;
use crate::BlockingRegisterDevice;

#[derive(Debug)]
pub struct FUSB302<I2C> {
    dev: BlockingRegisterDevice<I2C>,
    role: PortRole,
    status: PortStatus,
}

impl<I2C> FUSB302<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self {
            dev: BlockingRegisterDevice::new(i2c, FUSB302_ADDRESS),
            role: PortRole::default(),
            status: PortStatus::default(),
        }
    }

    /// Software reset, powers every block and starts toggling in `role`.
    pub fn init(&mut self, role: PortRole) -> Result<(), PortError> {
        if !self.test_connection()? {
            return Err(PortError::Init);
        }
        self.role = role;
        self.dev.write_register(&[REG_RESET, SW_RES])?;
        self.dev.write_register(&[REG_POWER, POWER_ALL])?;
        // Rp advertised once we act as source
        self.dev
            .modify_register(REG_CONTROL0, HOST_CUR_MASK, HOST_CUR_1500MA)?;
        self.detach()
    }

    pub fn device_id(&mut self) -> Result<u8, PortError> {
        Ok(self.dev.read_register(REG_DEVICE_ID)?)
    }

    /// Every FUSB302 revision reports a version ID with the top bit set.
    pub fn test_connection(&mut self) -> Result<bool, PortError> {
        Ok(self.device_id()? & 0x80 != 0)
    }

    pub fn status(&self) -> PortStatus {
        self.status
    }

    /// Advances attach detection. Returns the new status when it changed.
    pub fn poll(&mut self) -> Result<Option<PortStatus>, PortError> {
        let before = self.status;
        match self.status.attachment {
            Attachment::Detached => {
                let togss = (self.dev.read_register(REG_STATUS1A)? >> 3) & 0x07;
                match togss {
                    0b001 => self.attach_source(CcPin::Cc1)?,
                    0b010 => self.attach_source(CcPin::Cc2)?,
                    0b101 => self.attach_sink(CcPin::Cc1)?,
                    0b110 => self.attach_sink(CcPin::Cc2)?,
                    // audio accessory, no power role to take
                    0b111 => self.detach()?,
                    _ => {}
                }
            }
            Attachment::Sink(_) => {
                let status0 = self.dev.read_register(REG_STATUS0)?;
                if status0 & VBUSOK == 0 {
                    self.detach()?;
                } else {
                    self.status.current_ma = bc_lvl_current_ma(status0);
                }
            }
            Attachment::Source(_) => {
                let status0 = self.dev.read_register(REG_STATUS0)?;
                if status0 & COMP != 0 {
                    self.detach()?;
                }
            }
        }
        Ok((self.status != before).then_some(self.status))
    }

    /// Terminates with Rd on both CC pins and restarts toggling.
    pub fn detach(&mut self) -> Result<(), PortError> {
        self.dev
            .write_register(&[REG_SWITCHES0, PDWN1 | PDWN2])?;
        self.dev
            .write_register(&[REG_CONTROL2, self.role.mode() | TOGGLE])?;
        self.status = PortStatus::default();
        Ok(())
    }

    fn attach_sink(&mut self, cc: CcPin) -> Result<(), PortError> {
        let status0 = self.dev.read_register(REG_STATUS0)?;
        if status0 & VBUSOK == 0 {
            // Rp without VBUS, not a valid source yet
            return self.detach();
        }
        self.dev.modify_register(REG_CONTROL2, TOGGLE, 0)?;
        let meas = match cc {
            CcPin::Cc1 => MEAS_CC1,
            CcPin::Cc2 => MEAS_CC2,
        };
        self.dev
            .write_register(&[REG_SWITCHES0, PDWN1 | PDWN2 | meas])?;
        self.status = PortStatus {
            attachment: Attachment::Sink(cc),
            current_ma: bc_lvl_current_ma(status0),
        };
        Ok(())
    }

    fn attach_source(&mut self, cc: CcPin) -> Result<(), PortError> {
        self.dev.modify_register(REG_CONTROL2, TOGGLE, 0)?;
        let switches = match cc {
            CcPin::Cc1 => PU_EN1 | MEAS_CC1,
            CcPin::Cc2 => PU_EN2 | MEAS_CC2,
        };
        self.dev.write_register(&[REG_SWITCHES0, switches])?;
        self.dev.write_register(&[REG_MEASURE, MDAC_DETACH])?;
        self.status = PortStatus {
            attachment: Attachment::Source(cc),
            current_ma: 0,
        };
        Ok(())
    }
}
