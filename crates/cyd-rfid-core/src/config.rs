//! Link timing constants.
//!
//! These are part of the contract with the reader chip's datasheet minimums,
//! so they are fixed per board and injected at construction. There are no
//! runtime setters.

use core::fmt;

use fugit::{HertzU32, MicrosDurationU32, MillisDurationU32};

/// Fixed delays used by the soft SPI link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Dwell between clock edges (and before the first edge of each bit).
    pub clock_delay: MicrosDurationU32,
    /// Margin after asserting and after deasserting chip-select.
    pub settle_delay: MicrosDurationU32,
    /// Wait after a soft reset before the chip answers again.
    pub reset_recovery: MillisDurationU32,
}

/// Shortest accepted clock delay.
pub const MIN_CLOCK_DELAY_US: u32 = 1;
/// Longest accepted clock delay.
pub const MAX_CLOCK_DELAY_US: u32 = 100;
/// Longest accepted settle delay.
pub const MAX_SETTLE_DELAY_US: u32 = 50;

/// Clock delays per bit: setup, high phase, low phase.
const DELAYS_PER_BIT: u32 = 3;

impl Timing {
    /// Values shipped on the CYD scanner firmware.
    pub const CYD: Self = Self::new(2, 10, 100);
    pub const FAST: Self = Self::new(2, 1, 100);
    pub const STANDARD: Self = Self::new(5, 2, 100);
    /// For long or noisy jumper wiring.
    pub const SLOW: Self = Self::new(10, 5, 100);
    pub const RFID_OPTIMIZED: Self = Self::new(3, 2, 100);

    /// Build a timing set from raw microsecond/millisecond values.
    pub const fn new(clock_delay_us: u32, settle_delay_us: u32, reset_recovery_ms: u32) -> Self {
        Self {
            clock_delay: MicrosDurationU32::from_ticks(clock_delay_us),
            settle_delay: MicrosDurationU32::from_ticks(settle_delay_us),
            reset_recovery: MillisDurationU32::from_ticks(reset_recovery_ms),
        }
    }

    /// Check the values against the ranges the link is known to work with.
    pub fn validate(&self) -> Result<(), TimingError> {
        let clock = self.clock_delay.to_micros();
        if !(MIN_CLOCK_DELAY_US..=MAX_CLOCK_DELAY_US).contains(&clock) {
            return Err(TimingError::ClockDelayOutOfRange(clock));
        }
        let settle = self.settle_delay.to_micros();
        if settle > MAX_SETTLE_DELAY_US {
            return Err(TimingError::SettleDelayTooLong(settle));
        }
        Ok(())
    }

    /// Approximate SCK rate, ignoring GPIO write latency.
    pub fn clock_rate(&self) -> HertzU32 {
        let period_us = DELAYS_PER_BIT
            .saturating_mul(self.clock_delay.to_micros())
            .max(1);
        HertzU32::from_raw(1_000_000 / period_us)
    }

    /// Upper bound of busy-wait time spent inside one byte transfer.
    ///
    /// This is how long the critical section is held per byte, excluding
    /// GPIO write latency.
    pub fn byte_hold_time(&self) -> MicrosDurationU32 {
        MicrosDurationU32::from_ticks(
            (8 * DELAYS_PER_BIT).saturating_mul(self.clock_delay.to_micros()),
        )
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::CYD
    }
}

/// Rejected timing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingError {
    /// Clock delay outside `MIN_CLOCK_DELAY_US..=MAX_CLOCK_DELAY_US`.
    ClockDelayOutOfRange(u32),
    /// Settle delay above `MAX_SETTLE_DELAY_US`.
    SettleDelayTooLong(u32),
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingError::ClockDelayOutOfRange(us) => write!(
                f,
                "clock delay {us} us outside {MIN_CLOCK_DELAY_US}..={MAX_CLOCK_DELAY_US} us"
            ),
            TimingError::SettleDelayTooLong(us) => {
                write!(f, "settle delay {us} us exceeds {MAX_SETTLE_DELAY_US} us")
            }
        }
    }
}
