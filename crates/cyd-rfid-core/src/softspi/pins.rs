//! The four GPIO lines of the emulated link.

use embedded_hal::digital::{InputPin, OutputPin, PinState};

use super::{Error, Line};

/// Clock, data-out, data-in and chip-select, owned by one driver.
///
/// Directions are fixed by the trait bounds; nothing else is validated. A
/// pin wired to the wrong header is a caller error that shows up as wrong
/// data, not as a fault.
pub struct SoftSpiPins<SCK, MOSI, MISO, CS> {
    sck: SCK,
    mosi: MOSI,
    miso: MISO,
    cs: CS,
}

impl<SCK, MOSI, MISO, CS> SoftSpiPins<SCK, MOSI, MISO, CS>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
{
    pub fn new(sck: SCK, mosi: MOSI, miso: MISO, cs: CS) -> Self {
        Self { sck, mosi, miso, cs }
    }

    #[inline]
    pub fn set_clock(&mut self, level: PinState) -> Result<(), Error> {
        self.sck
            .set_state(level)
            .map_err(|e| Error::pin(Line::Clock, e))
    }

    #[inline]
    pub fn set_data_out(&mut self, level: PinState) -> Result<(), Error> {
        self.mosi
            .set_state(level)
            .map_err(|e| Error::pin(Line::DataOut, e))
    }

    /// Sample the data-in line. `true` is high.
    #[inline]
    pub fn read_data_in(&mut self) -> Result<bool, Error> {
        self.miso.is_high().map_err(|e| Error::pin(Line::DataIn, e))
    }

    /// Chip-select is active low: `PinState::Low` selects the chip.
    #[inline]
    pub fn set_chip_select(&mut self, level: PinState) -> Result<(), Error> {
        self.cs
            .set_state(level)
            .map_err(|e| Error::pin(Line::ChipSelect, e))
    }

    /// Give the pins back, e.g. to hand the lines to the display driver.
    pub fn release(self) -> (SCK, MOSI, MISO, CS) {
        (self.sck, self.mosi, self.miso, self.cs)
    }
}
