// https://www.ti.com/lit/ds/symlink/lp5815.pdf
use core::fmt::{self, Display, Formatter};

use embedded_hal::i2c::{Error, I2c};

use crate::BlockingRegisterDevice;

pub const LP5815_ADDRESS: u8 = 0x2D;

const REG_CHIP_EN: u8 = 0x00;
const REG_DEV_CONFIG0: u8 = 0x01;
const REG_DEV_CONFIG1: u8 = 0x02;
const REG_UPDATE_CMD: u8 = 0x0F;
const REG_OUT0_DC: u8 = 0x14;
const REG_OUT0_MANUAL_PWM: u8 = 0x18;

/// CHIP_EN plus instant blinking disabled
const CHIP_ENABLE: u8 = 0x03;
const CHIP_DISABLE: u8 = 0x02;
/// Latches the DEV_CONFIG registers
const UPDATE: u8 = 0x55;
const ALL_OUTPUTS: u8 = 0x07;
/// 25.5 mA full scale
const MAX_CURRENT_25MA5: u8 = 0x00;
/// Dot current of about 10 mA per output
const DOT_CURRENT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedError {
    I2CError,
}

impl<E> From<E> for LedError
where
    E: Error,
{
    fn from(_: E) -> Self {
        LedError::I2CError
    }
}

impl Display for LedError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            LedError::I2CError => write!(f, "I2C error"),
        }
    }
}

/// LP5815 three channel LED driver, wired green on OUT0, blue on OUT1, red on OUT2.
#[derive(Debug)]
pub struct LP5815<I2C> {
    dev: BlockingRegisterDevice<I2C>,
}

impl<I2C> LP5815<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self {
            dev: BlockingRegisterDevice::new(i2c, LP5815_ADDRESS),
        }
    }

    pub fn init(&mut self) -> Result<(), LedError> {
        self.dev.write_register(&[REG_CHIP_EN, CHIP_ENABLE])?;
        self.dev
            .write_register(&[REG_DEV_CONFIG0, MAX_CURRENT_25MA5])?;
        for out in 0..3 {
            self.dev
                .write_register(&[REG_OUT0_DC + out, DOT_CURRENT])?;
        }
        self.dev.write_register(&[REG_DEV_CONFIG1, ALL_OUTPUTS])?;
        self.dev.write_register(&[REG_UPDATE_CMD, UPDATE])?;
        self.set_rgb(0, 0, 0)
    }

    /// Manual PWM duty of each color, 0 is off.
    pub fn set_rgb(&mut self, red: u8, green: u8, blue: u8) -> Result<(), LedError> {
        for (out, duty) in [green, blue, red].into_iter().enumerate() {
            self.dev
                .write_register(&[REG_OUT0_MANUAL_PWM + out as u8, duty])?;
        }
        Ok(())
    }

    /// Standby, all outputs off and register content lost.
    pub fn shutdown(&mut self) -> Result<(), LedError> {
        self.dev.write_register(&[REG_CHIP_EN, CHIP_DISABLE])?;
        Ok(())
    }

    /// Leaves standby with every output dark.
    pub fn wake(&mut self) -> Result<(), LedError> {
        self.init()
    }
}
