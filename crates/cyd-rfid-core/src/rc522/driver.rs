//! MFRC522 driver, generic over the register bus.
//!
//! Mirrors the scanner firmware's bring-up: soft reset, configure the analog
//! front end, leave the antenna off until a scan is requested.

use cyd_rfid_hal::{DiagnosticSink, RegisterBus};
use embedded_hal::delay::DelayNs;
use fugit::MillisDurationU32;
use heapless::Vec;

use super::identify::Identification;
use super::picc::ScanStats;
use super::registers::{self, command};
use crate::config::Timing;

/// Polls of `DIV_IRQ` before the CRC coprocessor is declared stuck.
pub const CRC_POLL_LIMIT: u32 = 5000;
/// Busy wait between CRC polls.
pub const CRC_POLL_INTERVAL_US: u32 = 10;

/// Progress of reset and identification. Only those operations move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    ResetIssued,
    Identified(u8),
}

/// MFRC522 driver. Owns a bus that implements register access and a delay
/// for chip-level waits (reset recovery, coprocessor polling).
pub struct Rc522<B: RegisterBus, D> {
    pub(super) bus: B,
    pub(super) delay: D,
    reset_recovery: MillisDurationU32,
    state: LinkState,
    antenna_on: bool,
    pub(super) scans: ScanStats,
}

impl<B: RegisterBus, D: DelayNs> Rc522<B, D> {
    /// Wrap a bus. Does not touch the chip.
    pub fn new(bus: B, delay: D, timing: Timing) -> Self {
        Self {
            bus,
            delay,
            reset_recovery: timing.reset_recovery,
            state: LinkState::Uninitialized,
            antenna_on: false,
            scans: ScanStats::default(),
        }
    }

    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), B::Error> {
        self.bus.write_register(address, value)
    }

    pub fn read_register(&mut self, address: u8) -> Result<u8, B::Error> {
        self.bus.read_register(address)
    }

    /// Read-modify-write: set `mask` bits.
    pub fn set_bit_mask(&mut self, address: u8, mask: u8) -> Result<(), B::Error> {
        let current = self.read_register(address)?;
        self.write_register(address, current | mask)
    }

    /// Read-modify-write: clear `mask` bits.
    pub fn clear_bit_mask(&mut self, address: u8, mask: u8) -> Result<(), B::Error> {
        let current = self.read_register(address)?;
        self.write_register(address, current & !mask)
    }

    /// Issue `SoftReset` and wait out the chip's recovery time.
    pub fn soft_reset(&mut self) -> Result<(), B::Error> {
        self.write_register(registers::COMMAND, command::SOFT_RESET)?;
        self.state = LinkState::ResetIssued;
        self.antenna_on = false;
        log::debug!("soft reset issued, waiting {} ms", self.reset_recovery.to_millis());
        self.delay.delay_ms(self.reset_recovery.to_millis());
        Ok(())
    }

    /// Read the raw `VERSION` register.
    pub fn version(&mut self) -> Result<u8, B::Error> {
        self.read_register(registers::VERSION)
    }

    /// Reset the chip and read back its version byte.
    ///
    /// The byte goes to `sink` as `identification byte: 0xHH`. A link fault
    /// or an unrecognized revision gets a second line. Neither is an `Err`;
    /// the caller decides whether to retry.
    pub fn reset_and_identify<S: DiagnosticSink>(&mut self, sink: &mut S) -> Result<u8, B::Error> {
        self.soft_reset()?;
        let version = self.version()?;
        self.state = LinkState::Identified(version);

        sink.print_result(format_args!("identification byte: 0x{version:02X}"));
        match Identification::from_version(version) {
            Identification::LinkFault(_) => {
                sink.print_result(format_args!(
                    "link fault: reader not answering, check wiring and power"
                ));
            }
            Identification::Unrecognized(_) => {
                sink.print_result(format_args!("unrecognized reader revision, verify part"));
            }
            Identification::Known(chip) => log::debug!("reader revision {chip}"),
        }
        Ok(version)
    }

    /// Bring the chip to the scanner's operating configuration.
    ///
    /// The antenna stays off; call [`Self::antenna_on`] before scanning.
    pub fn init(&mut self) -> Result<Identification, B::Error> {
        self.soft_reset()?;

        self.write_register(registers::COMMAND, command::IDLE)?;
        // Timer off by default (TAuto=0); 0xA9 prescaler and 0x03E8 reload
        // give a 25 ms timeout when a transceive enables it.
        self.write_register(registers::T_MODE, 0x00)?;
        self.write_register(registers::T_PRESCALER, 0xA9)?;
        self.write_register(registers::T_RELOAD_H, 0x03)?;
        self.write_register(registers::T_RELOAD_L, 0xE8)?;
        // 100% ASK modulation.
        self.write_register(registers::TX_ASK, 0x40)?;
        // CRC preset 0x6363.
        self.write_register(registers::MODE, 0x3D)?;
        // NTAG tuning: 48 dB receiver gain, threshold, conductance.
        self.write_register(registers::RF_CFG, 0x70)?;
        self.write_register(registers::RX_THRESHOLD, 0x84)?;
        self.write_register(registers::MOD_GS_P, 0x3F)?;
        self.write_register(registers::BIT_FRAMING, 0x00)?;
        self.write_register(registers::COLL, registers::COLL_VALUES_AFTER_COLL)?;

        let version = self.version()?;
        self.state = LinkState::Identified(version);
        let id = Identification::from_version(version);
        log::debug!("reader configured, version 0x{version:02X} ({id:?})");
        Ok(id)
    }

    /// Enable both antenna drivers. No bus traffic if already on.
    pub fn antenna_on(&mut self) -> Result<(), B::Error> {
        if !self.antenna_on {
            self.set_bit_mask(registers::TX_CONTROL, registers::TX_CONTROL_ANTENNA)?;
            self.antenna_on = true;
            log::debug!("antenna on");
        }
        Ok(())
    }

    /// Disable both antenna drivers. No bus traffic if already off.
    pub fn antenna_off(&mut self) -> Result<(), B::Error> {
        if self.antenna_on {
            self.clear_bit_mask(registers::TX_CONTROL, registers::TX_CONTROL_ANTENNA)?;
            self.antenna_on = false;
            log::debug!("antenna off");
        }
        Ok(())
    }

    pub fn flush_fifo(&mut self) -> Result<(), B::Error> {
        self.write_register(registers::FIFO_LEVEL, registers::FIFO_FLUSH)
    }

    pub fn write_fifo(&mut self, data: &[u8]) -> Result<(), B::Error> {
        self.bus.write_registers(registers::FIFO_DATA, data)
    }

    /// Drain whatever the FIFO currently holds.
    pub fn read_fifo(&mut self) -> Result<Vec<u8, { registers::FIFO_SIZE }>, B::Error> {
        let level = (self.read_register(registers::FIFO_LEVEL)? & registers::FIFO_LEVEL_MASK) as usize;
        let mut fifo = Vec::new();
        // `level` is at most 0x7F; the FIFO holds 64.
        let _ = fifo.resize_default(level.min(registers::FIFO_SIZE));
        if !fifo.is_empty() {
            self.bus.read_registers(registers::FIFO_DATA, &mut fifo)?;
        }
        Ok(fifo)
    }

    /// Run the CRC_A coprocessor over `data`.
    ///
    /// The coprocessor reads from the 64-byte FIFO, so only the first
    /// [`registers::FIFO_SIZE`] bytes are covered; anything past that is
    /// ignored. Returns `[low, high]`, or `None` if the coprocessor never
    /// signalled completion.
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<Option<[u8; 2]>, B::Error> {
        let data = &data[..data.len().min(registers::FIFO_SIZE)];

        self.write_register(registers::COMMAND, command::IDLE)?;
        self.write_register(registers::DIV_IRQ, registers::DIV_IRQ_CRC)?;
        self.flush_fifo()?;
        self.write_fifo(data)?;
        self.write_register(registers::COMMAND, command::CALC_CRC)?;

        for _ in 0..CRC_POLL_LIMIT {
            if self.read_register(registers::DIV_IRQ)? & registers::DIV_IRQ_CRC != 0 {
                self.write_register(registers::COMMAND, command::IDLE)?;
                let low = self.read_register(registers::CRC_RESULT_L)?;
                let high = self.read_register(registers::CRC_RESULT_H)?;
                return Ok(Some([low, high]));
            }
            self.delay.delay_us(CRC_POLL_INTERVAL_US);
        }

        log::warn!("CRC coprocessor did not finish after {CRC_POLL_LIMIT} polls");
        Ok(None)
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn is_antenna_on(&self) -> bool {
        self.antenna_on
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }
}
