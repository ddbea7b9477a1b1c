//! Register access framing on top of the bit engine.
//!
//! Address byte layout: bit 7 is the direction (0 = write, 1 = read), bits
//! 6..0 select the register.

use cyd_rfid_hal::{InterruptLock, RegisterBus};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::engine::SoftSpi;
use super::Error;

/// Direction bit of the address byte.
pub const READ_BIT: u8 = 0x80;

/// Register transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Build the first byte of a register transaction.
#[inline]
pub const fn address_byte(address: u8, direction: Direction) -> u8 {
    match direction {
        Direction::Write => address & !READ_BIT,
        Direction::Read => address | READ_BIT,
    }
}

impl<SCK, MOSI, MISO, CS, D, L> RegisterBus for SoftSpi<SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    type Error = Error;

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Error> {
        self.frame(|spi| {
            spi.transfer_byte(address_byte(address, Direction::Write))?;
            spi.transfer_byte(value)?;
            Ok(())
        })
    }

    fn read_register(&mut self, address: u8) -> Result<u8, Error> {
        self.frame(|spi| {
            spi.transfer_byte(address_byte(address, Direction::Read))?;
            spi.transfer_byte(0x00)
        })
    }

    /// One frame: the address byte, then every value.
    fn write_registers(&mut self, address: u8, values: &[u8]) -> Result<(), Error> {
        self.frame(|spi| {
            spi.transfer_byte(address_byte(address, Direction::Write))?;
            for &value in values {
                spi.transfer_byte(value)?;
            }
            Ok(())
        })
    }

    /// One frame. The read address is re-sent while each byte but the last
    /// comes back, which keeps the chip streaming the same register.
    fn read_registers(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let read = address_byte(address, Direction::Read);
        self.frame(|spi| {
            spi.transfer_byte(read)?;
            let last = buf.len() - 1;
            for (i, slot) in buf.iter_mut().enumerate() {
                let next = if i == last { 0x00 } else { read };
                *slot = spi.transfer_byte(next)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_sets_direction_bit() {
        assert_eq!(address_byte(0x6E, Direction::Read), 0xEE);
        assert_eq!(address_byte(0x6E, Direction::Write), 0x6E);
    }

    #[test]
    fn write_clears_stray_direction_bit() {
        assert_eq!(address_byte(0x82, Direction::Write), 0x02);
    }
}
