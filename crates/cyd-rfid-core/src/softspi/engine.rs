//! Bit transfer engine: one byte out, one byte in, MSB first.

use cyd_rfid_hal::InterruptLock;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal::spi::{ErrorType, Mode, Operation, Phase, Polarity, SpiDevice, MODE_0};

use super::guard::LockGuard;
use super::pins::SoftSpiPins;
use super::Error;
use crate::config::Timing;

/// Counters kept by the link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Bytes clocked, whether or not they completed.
    pub bytes: u32,
    /// Chip-select frames opened.
    pub transactions: u32,
    /// Operations that ended with a GPIO fault.
    pub pin_faults: u32,
}

/// Software-emulated SPI master.
///
/// Owns the four lines, a busy-wait delay and the interrupt lock. All waits
/// are fixed and data-independent; nothing here yields.
pub struct SoftSpi<SCK, MOSI, MISO, CS, D, L> {
    pub(crate) pins: SoftSpiPins<SCK, MOSI, MISO, CS>,
    pub(crate) delay: D,
    lock: L,
    timing: Timing,
    mode: Mode,
    stats: LinkStats,
    in_frame: bool,
}

impl<SCK, MOSI, MISO, CS, D, L> SoftSpi<SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    /// Create a Mode 0 link (the MFRC522's mode) and park the lines idle.
    pub fn new(
        pins: SoftSpiPins<SCK, MOSI, MISO, CS>,
        delay: D,
        lock: L,
        timing: Timing,
    ) -> Result<Self, Error> {
        Self::with_mode(pins, delay, lock, timing, MODE_0)
    }

    /// Create a link in any of the four SPI modes.
    pub fn with_mode(
        pins: SoftSpiPins<SCK, MOSI, MISO, CS>,
        delay: D,
        lock: L,
        timing: Timing,
        mode: Mode,
    ) -> Result<Self, Error> {
        let mut spi = Self {
            pins,
            delay,
            lock,
            timing,
            mode,
            stats: LinkStats::default(),
            in_frame: false,
        };
        spi.pins.set_chip_select(PinState::High)?;
        spi.pins.set_clock(idle_level(mode))?;
        spi.pins.set_data_out(PinState::Low)?;
        log::debug!(
            "soft SPI ready: {:?}/{:?}, ~{} Hz",
            mode.polarity,
            mode.phase,
            timing.clock_rate().to_Hz()
        );
        Ok(spi)
    }

    /// Clock one byte out and one byte in.
    ///
    /// Always produces exactly eight clock pulses. The critical section is
    /// held for the pulses only.
    pub fn transfer_byte(&mut self, out: u8) -> Result<u8, Error> {
        let half = self.timing.clock_delay.to_micros();
        let result = {
            let _guard = LockGuard::new(&mut self.lock);
            clock_byte(&mut self.pins, &mut self.delay, half, self.mode, out)
        };
        self.stats.bytes = self.stats.bytes.wrapping_add(1);
        self.track(result)
    }

    /// Run `body` with chip-select asserted.
    ///
    /// Chip-select is deasserted afterwards whatever `body` returns, and the
    /// data-out line is parked low. The first error wins. If a pin driver
    /// panics and the panic unwinds, the lines are released during the
    /// unwind.
    pub fn frame<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let settle = self.timing.settle_delay.to_micros();
        self.stats.transactions = self.stats.transactions.wrapping_add(1);

        let mut frame = FrameGuard {
            spi: &mut *self,
            open: true,
        };
        let result = match frame.spi.pins.set_chip_select(PinState::Low) {
            Ok(()) => {
                frame.spi.delay.delay_us(settle);
                frame.spi.in_frame = true;
                body(&mut *frame.spi)
            }
            Err(e) => Err(e),
        };
        let closed = frame.close();
        drop(frame);

        let outcome = result.and_then(|value| closed.map(|()| value));
        self.track(outcome)
    }

    /// Drive data-out low.
    ///
    /// On the CYD the data-out line runs past the speaker amplifier input and
    /// a line left high between frames is audible.
    pub fn silence_data_out(&mut self) -> Result<(), Error> {
        self.pins.set_data_out(PinState::Low)
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = LinkStats::default();
    }

    /// Tear down the link and return its parts.
    pub fn release(self) -> (SoftSpiPins<SCK, MOSI, MISO, CS>, D, L) {
        (self.pins, self.delay, self.lock)
    }

    fn track<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        // A fault inside a frame is counted once, when the frame closes.
        if let (Err(e), false) = (&result, self.in_frame) {
            self.stats.pin_faults = self.stats.pin_faults.wrapping_add(1);
            log::trace!("soft SPI: {e}");
        }
        result
    }
}

/// Open chip-select frame. Closing it raises chip-select and parks
/// data-out; dropping it unclosed does the same, ignoring pin errors.
struct FrameGuard<'a, SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    spi: &'a mut SoftSpi<SCK, MOSI, MISO, CS, D, L>,
    open: bool,
}

impl<SCK, MOSI, MISO, CS, D, L> FrameGuard<'_, SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    fn close(&mut self) -> Result<(), Error> {
        self.open = false;
        self.spi.in_frame = false;
        let released = self.spi.pins.set_chip_select(PinState::High);
        self.spi
            .delay
            .delay_us(self.spi.timing.settle_delay.to_micros());
        let parked = self.spi.silence_data_out();
        released.and(parked)
    }
}

impl<SCK, MOSI, MISO, CS, D, L> Drop for FrameGuard<'_, SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    fn drop(&mut self) {
        if self.open {
            let _ = self.close();
        }
    }
}

fn idle_level(mode: Mode) -> PinState {
    match mode.polarity {
        Polarity::IdleLow => PinState::Low,
        Polarity::IdleHigh => PinState::High,
    }
}

/// Shift one byte through the lines. Caller holds the critical section.
fn clock_byte<SCK, MOSI, MISO, CS, D>(
    pins: &mut SoftSpiPins<SCK, MOSI, MISO, CS>,
    delay: &mut D,
    half_us: u32,
    mode: Mode,
    mut out: u8,
) -> Result<u8, Error>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
{
    let idle = idle_level(mode);
    let active = !idle;
    let mut inbound = 0u8;

    for _ in 0..8 {
        let bit = PinState::from(out & 0x80 != 0);
        let sampled = match mode.phase {
            Phase::CaptureOnFirstTransition => {
                pins.set_data_out(bit)?;
                delay.delay_us(half_us);
                pins.set_clock(active)?;
                delay.delay_us(half_us);
                let sampled = pins.read_data_in()?;
                pins.set_clock(idle)?;
                delay.delay_us(half_us);
                sampled
            }
            Phase::CaptureOnSecondTransition => {
                delay.delay_us(half_us);
                pins.set_clock(active)?;
                pins.set_data_out(bit)?;
                delay.delay_us(half_us);
                pins.set_clock(idle)?;
                let sampled = pins.read_data_in()?;
                delay.delay_us(half_us);
                sampled
            }
        };
        inbound = (inbound << 1) | u8::from(sampled);
        out <<= 1;
    }

    Ok(inbound)
}

impl<SCK, MOSI, MISO, CS, D, L> ErrorType for SoftSpi<SCK, MOSI, MISO, CS, D, L> {
    type Error = Error;
}

/// Lets generic `embedded-hal` drivers run over the emulated link.
impl<SCK, MOSI, MISO, CS, D, L> SpiDevice for SoftSpi<SCK, MOSI, MISO, CS, D, L>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
    L: InterruptLock,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Error> {
        self.frame(|spi| {
            for op in operations.iter_mut() {
                match op {
                    Operation::Read(buf) => {
                        for slot in buf.iter_mut() {
                            *slot = spi.transfer_byte(0x00)?;
                        }
                    }
                    Operation::Write(buf) => {
                        for &byte in buf.iter() {
                            spi.transfer_byte(byte)?;
                        }
                    }
                    Operation::Transfer(read, write) => {
                        for i in 0..read.len().max(write.len()) {
                            let byte = spi.transfer_byte(write.get(i).copied().unwrap_or(0x00))?;
                            if let Some(slot) = read.get_mut(i) {
                                *slot = byte;
                            }
                        }
                    }
                    Operation::TransferInPlace(buf) => {
                        for slot in buf.iter_mut() {
                            *slot = spi.transfer_byte(*slot)?;
                        }
                    }
                    Operation::DelayNs(ns) => spi.delay.delay_ns(*ns),
                }
            }
            Ok(())
        })
    }
}
