//! CYD (ESP32-2432S028R) wiring for the RFID reader.
//!
//! The display owns VSPI/HSPI, so the reader sits on four spare GPIOs from
//! the CN1/P3 headers and is driven by the soft SPI engine.

use cyd_rfid_core::SoftSpiPins;
use esp_idf_hal::gpio::{Gpio22, Gpio27, Gpio3, Gpio35, Input, Output, PinDriver, Pins};
use esp_idf_hal::sys::EspError;

/// SCK: CN1 header.
pub const SCK_GPIO: u8 = 22;
/// MOSI: CN1 header.
pub const MOSI_GPIO: u8 = 27;
/// MISO: P3 header. Input-only pad, no internal pull.
pub const MISO_GPIO: u8 = 35;
/// SS: shared with UART0 RX, so the serial console is output-only.
pub const SS_GPIO: u8 = 3;

pub type ReaderPins = SoftSpiPins<
    PinDriver<'static, Gpio22, Output>,
    PinDriver<'static, Gpio27, Output>,
    PinDriver<'static, Gpio35, Input>,
    PinDriver<'static, Gpio3, Output>,
>;

/// Claim the reader's four lines.
pub fn reader_pins(pins: Pins) -> Result<ReaderPins, EspError> {
    let sck = PinDriver::output(pins.gpio22)?;
    let mosi = PinDriver::output(pins.gpio27)?;
    let miso = PinDriver::input(pins.gpio35)?;
    let ss = PinDriver::output(pins.gpio3)?;

    log::info!(
        "reader pins: SCK={SCK_GPIO} MOSI={MOSI_GPIO} MISO={MISO_GPIO} SS={SS_GPIO}"
    );
    Ok(SoftSpiPins::new(sck, mosi, miso, ss))
}
