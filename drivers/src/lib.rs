#![cfg_attr(not(test), no_std)]
//! Drivers for the power path of the KX2 charger board
//!
//! - BQ25798 buck-boost battery charger with dual input selection
//! - FUSB302 USB Type-C port controller
//! - LP5815 three channel LED driver
//!
//! All drivers are blocking and talk to the chip over `embedded_hal::i2c::I2c`,
//! so a shared bus can be handed in through `embedded-hal-bus`.

/// BQ25798 buck-boost charger driver.
pub mod bq25798;

/// FUSB302 Type-C port controller driver.
pub mod fusb302;

/// LP5815 RGB LED driver.
pub mod lp5815;

use embedded_hal::i2c::I2c;

/// Register access shared by all drivers in this crate.
#[derive(Debug)]
pub(crate) struct BlockingRegisterDevice<I2C> {
    i2c: I2C,
    pub(crate) adr: u8,
}

impl<I2C> BlockingRegisterDevice<I2C>
where
    I2C: I2c,
{
    pub(crate) fn new(i2c: I2C, adr: u8) -> Self {
        Self { i2c, adr }
    }

    pub(crate) fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut buffer = [0u8];
        self.i2c.write_read(self.adr, &[register], &mut buffer)?;
        Ok(buffer[0])
    }

    /// 16 bit registers are transferred MSB first.
    pub(crate) fn read_register16(&mut self, register: u8) -> Result<u16, I2C::Error> {
        let mut buffer = [0u8; 2];
        self.i2c.write_read(self.adr, &[register], &mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }

    pub(crate) fn write_register(&mut self, register_and_data: &[u8]) -> Result<(), I2C::Error> {
        self.i2c.write(self.adr, register_and_data)
    }

    pub(crate) fn write_register16(&mut self, register: u8, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.adr, &[register, hi, lo])
    }

    pub(crate) fn set_register_bit(&mut self, register: u8, bit: u8) -> Result<(), I2C::Error> {
        self.modify_register(register, 1 << bit, 1 << bit)
    }

    pub(crate) fn clear_register_bit(&mut self, register: u8, bit: u8) -> Result<(), I2C::Error> {
        self.modify_register(register, 1 << bit, 0)
    }

    pub(crate) fn get_register_bit(&mut self, register: u8, bit: u8) -> Result<bool, I2C::Error> {
        let val = self.read_register(register)?;
        Ok((val & (1 << bit)) != 0)
    }

    /// Read-modify-write of the bits in `mask`.
    pub(crate) fn modify_register(
        &mut self,
        register: u8,
        mask: u8,
        bits: u8,
    ) -> Result<(), I2C::Error> {
        let val = self.read_register(register)?;
        let data = (val & !mask) | (bits & mask);
        self.write_register(&[register, data])
    }
}
