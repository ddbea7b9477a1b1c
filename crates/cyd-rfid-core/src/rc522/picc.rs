//! Card exchanges: Transceive, REQA, cascaded SELECT, HLTA and page reads.
//!
//! The scan flow follows the scanner firmware: the antenna comes up only for
//! a scan and goes back down when no card answers, and the reader's timer is
//! armed (TAuto) only for the duration of a single Transceive.

use core::fmt;

use cyd_rfid_hal::RegisterBus;
use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};

use super::driver::Rc522;
use super::error::PiccError;
use super::ndef;
use super::registers::{self, command, picc};

/// Polls of `COM_IRQ` before a Transceive is abandoned.
pub const TRANSCEIVE_POLL_LIMIT: u32 = 2000;
/// Busy wait between `COM_IRQ` polls. With the limit, about 100 ms.
pub const TRANSCEIVE_POLL_INTERVAL_US: u32 = 50;
/// Settle time after touching `COLL` before a REQA/SELECT.
pub const COLL_SETTLE_US: u32 = 100;
/// Pause between the two NDEF page reads.
pub const PAGE_READ_GAP_MS: u32 = 5;
/// Longest ISO/IEC 14443-3 UID (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Result of one Transceive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Bytes copied out of the FIFO.
    pub len: usize,
    /// Valid bits in the last byte; 0 means the whole byte.
    pub valid_bits: u8,
}

/// UID of a selected card plus its final SAK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uid {
    bytes: Vec<u8, MAX_UID_LEN>,
    sak: u8,
}

impl Uid {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sak(&self) -> u8 {
        self.sak
    }

    /// NTAG and MIFARE Ultralight answer SELECT with SAK 0x00.
    pub fn is_ntag(&self) -> bool {
        self.sak == 0x00
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Running scan counters, kept by [`Rc522::detect_card`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub total_scans: u32,
    pub successful_scans: u32,
    pub failed_scans: u32,
    pub collision_errors: u32,
    pub timeout_errors: u32,
    /// UID check byte mismatches.
    pub crc_errors: u32,
}

impl<B: RegisterBus, D: DelayNs> Rc522<B, D> {
    /// Send `send` to the card and collect the answer into `back`.
    ///
    /// `tx_last_bits` is the number of bits sent from the last byte (0 for
    /// all eight). The reader's timer runs only while this call is in
    /// progress; `T_MODE` is put back to 0 on every exit path that still has
    /// a working bus.
    pub fn transceive(
        &mut self,
        send: &[u8],
        tx_last_bits: u8,
        back: &mut [u8],
    ) -> Result<Received, PiccError<B::Error>> {
        if send.len() > registers::FIFO_SIZE {
            return Err(PiccError::NoRoom {
                received: send.len(),
                capacity: registers::FIFO_SIZE,
            });
        }

        self.write_register(registers::T_MODE, registers::T_MODE_AUTO)?;
        let result = self.transceive_armed(send, tx_last_bits, back);
        let disarmed = self.write_register(registers::T_MODE, 0x00);
        let received = result?;
        disarmed?;
        Ok(received)
    }

    fn transceive_armed(
        &mut self,
        send: &[u8],
        tx_last_bits: u8,
        back: &mut [u8],
    ) -> Result<Received, PiccError<B::Error>> {
        self.write_register(registers::COMMAND, command::IDLE)?;
        self.write_register(registers::COM_IRQ, registers::COM_IRQ_CLEAR_ALL)?;
        self.flush_fifo()?;
        self.write_fifo(send)?;
        self.write_register(
            registers::BIT_FRAMING,
            tx_last_bits & registers::BIT_FRAMING_TX_LAST_BITS,
        )?;
        self.write_register(registers::COMMAND, command::TRANSCEIVE)?;
        self.set_bit_mask(registers::BIT_FRAMING, registers::BIT_FRAMING_START_SEND)?;

        let mut answered = false;
        for _ in 0..TRANSCEIVE_POLL_LIMIT {
            let irq = self.read_register(registers::COM_IRQ)?;
            if irq & (registers::COM_IRQ_RX | registers::COM_IRQ_IDLE) != 0 {
                answered = true;
                break;
            }
            if irq & registers::COM_IRQ_TIMER != 0 {
                break;
            }
            self.delay.delay_us(TRANSCEIVE_POLL_INTERVAL_US);
        }
        self.clear_bit_mask(registers::BIT_FRAMING, registers::BIT_FRAMING_START_SEND)?;

        if !answered {
            return Err(PiccError::Timeout);
        }

        let error = self.read_register(registers::ERROR)?;
        if error & registers::ERROR_COLL != 0 {
            self.write_register(registers::BIT_FRAMING, 0x00)?;
            self.flush_fifo()?;
            return Err(PiccError::Collision);
        }
        if error & registers::ERROR_FRAME != 0 {
            return Err(PiccError::Protocol(error));
        }

        let level = (self.read_register(registers::FIFO_LEVEL)? & registers::FIFO_LEVEL_MASK) as usize;
        if level > back.len() {
            return Err(PiccError::NoRoom {
                received: level,
                capacity: back.len(),
            });
        }
        if level > 0 {
            self.bus.read_registers(registers::FIFO_DATA, &mut back[..level])?;
        }
        let valid_bits = self.read_register(registers::CONTROL)? & registers::CONTROL_RX_LAST_BITS;

        Ok(Received {
            len: level,
            valid_bits,
        })
    }

    /// CRC_A of `data` via the coprocessor, as a `PiccError`.
    fn crc(&mut self, data: &[u8]) -> Result<[u8; 2], PiccError<B::Error>> {
        self.calculate_crc(data)?.ok_or(PiccError::CrcTimeout)
    }

    /// REQA: ask idle cards in the field to answer. Returns the ATQA.
    pub fn request_a(&mut self) -> Result<[u8; 2], PiccError<B::Error>> {
        self.set_bit_mask(registers::COLL, registers::COLL_VALUES_AFTER_COLL)?;
        self.delay.delay_us(COLL_SETTLE_US);

        let mut atqa = [0u8; 2];
        // Short frame: seven bits.
        let received = self.transceive(&[picc::REQA], 7, &mut atqa)?;
        if received.len != 2 || received.valid_bits != 0 {
            log::debug!("bad ATQA: {} bytes, {} bits", received.len, received.valid_bits);
            return Err(PiccError::BadResponse);
        }
        Ok(atqa)
    }

    /// Anticollision and SELECT through up to three cascade levels.
    ///
    /// Handles single, double and triple size UIDs. A BCC mismatch aborts
    /// the selection.
    pub fn select(&mut self) -> Result<Uid, PiccError<B::Error>> {
        self.set_bit_mask(registers::COLL, registers::COLL_VALUES_AFTER_COLL)?;
        self.delay.delay_us(COLL_SETTLE_US);

        let mut uid = Uid {
            bytes: Vec::new(),
            sak: 0,
        };
        for sel in [picc::SEL_CL1, picc::SEL_CL2, picc::SEL_CL3] {
            let mut answer = [0u8; 5];
            let received = self.transceive(&[sel, picc::NVB_ANTICOLL], 0, &mut answer)?;
            if received.len != 5 || received.valid_bits != 0 {
                log::debug!(
                    "SEL 0x{sel:02X}: bad anticollision answer, {} bytes, {} bits",
                    received.len,
                    received.valid_bits
                );
                return Err(PiccError::BadResponse);
            }
            let bcc = answer[..4].iter().fold(0u8, |acc, b| acc ^ b);
            if bcc != answer[4] {
                log::debug!("SEL 0x{sel:02X}: BCC 0x{:02X}, expected 0x{bcc:02X}", answer[4]);
                return Err(PiccError::BccMismatch);
            }

            let mut frame = [0u8; 9];
            frame[0] = sel;
            frame[1] = picc::NVB_SELECT;
            frame[2..7].copy_from_slice(&answer);
            let crc = self.crc(&frame[..7])?;
            frame[7..].copy_from_slice(&crc);

            let mut sak = [0u8; 3];
            let received = self.transceive(&frame, 0, &mut sak)?;
            if !(1..=3).contains(&received.len) || received.valid_bits != 0 {
                log::debug!("SEL 0x{sel:02X}: bad SAK, {} bytes", received.len);
                return Err(PiccError::BadResponse);
            }
            uid.sak = sak[0];

            let more = sak[0] & picc::SAK_CASCADE != 0;
            let part = if more && answer[0] == picc::CASCADE_TAG {
                &answer[1..4]
            } else {
                &answer[..4]
            };
            uid.bytes
                .extend_from_slice(part)
                .map_err(|_| PiccError::CascadeTooDeep)?;

            if !more {
                log::debug!("selected {uid} (SAK 0x{:02X})", uid.sak);
                return Ok(uid);
            }
        }

        log::error!("card asked for a fourth cascade level");
        Err(PiccError::CascadeTooDeep)
    }

    /// HLTA: put the selected card to sleep. The card does not answer, so a
    /// timeout is success.
    pub fn halt_a(&mut self) -> Result<(), PiccError<B::Error>> {
        let mut frame = [picc::HLTA, 0x00, 0x00, 0x00];
        let crc = self.crc(&frame[..2])?;
        frame[2..].copy_from_slice(&crc);

        let mut answer = [0u8; 1];
        match self.transceive(&frame, 0, &mut answer) {
            Ok(_) | Err(PiccError::Timeout) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// READ four pages (16 bytes) starting at `page`.
    pub fn read_page(&mut self, page: u8) -> Result<[u8; 16], PiccError<B::Error>> {
        let mut frame = [picc::READ, page, 0x00, 0x00];
        let crc = self.crc(&frame[..2])?;
        frame[2..].copy_from_slice(&crc);

        // Data plus the card's CRC_A.
        let mut answer = [0u8; 18];
        let received = self.transceive(&frame, 0, &mut answer)?;
        if received.len < 16 {
            log::debug!("page {page}: short read, {} bytes", received.len);
            return Err(PiccError::BadResponse);
        }
        let mut data = [0u8; 16];
        data.copy_from_slice(&answer[..16]);
        Ok(data)
    }

    /// One scan: antenna on, REQA, SELECT.
    ///
    /// On failure the antenna is switched back off. The antenna stays on
    /// after a success so the card can be read; finish with
    /// [`Self::end_scan`].
    pub fn detect_card(&mut self) -> Result<Uid, PiccError<B::Error>> {
        self.scans.total_scans += 1;
        self.antenna_on()?;

        let result = self.request_a().and_then(|_| self.select());
        match result {
            Ok(uid) => {
                self.scans.successful_scans += 1;
                log::info!("card detected: {uid} (SAK 0x{:02X})", uid.sak());
                Ok(uid)
            }
            Err(e) => {
                self.scans.failed_scans += 1;
                match &e {
                    PiccError::Timeout => self.scans.timeout_errors += 1,
                    PiccError::Collision => self.scans.collision_errors += 1,
                    PiccError::BccMismatch => self.scans.crc_errors += 1,
                    _ => {}
                }
                if let Err(off) = self.antenna_off() {
                    log::warn!("antenna off after failed scan: {off:?}");
                }
                Err(e)
            }
        }
    }

    /// Text of the first NDEF text record on an NTAG, if there is one.
    ///
    /// Reads pages 3..=10. Cards other than NTAG/Ultralight yield `None`
    /// without any RF traffic.
    pub fn read_ndef_text(
        &mut self,
        uid: &Uid,
    ) -> Result<Option<String<{ ndef::TEXT_CAPACITY }>>, PiccError<B::Error>> {
        if !uid.is_ntag() {
            log::debug!("SAK 0x{:02X} is not an NTAG, skipping NDEF", uid.sak());
            return Ok(None);
        }

        let head = self.read_page(3)?;
        self.delay.delay_ms(PAGE_READ_GAP_MS);
        let tail = self.read_page(7)?;

        let text = ndef::text_from_pages(&head, &tail);
        match &text {
            Some(t) => log::info!("NDEF text: '{t}'"),
            None => log::debug!("no NDEF text record"),
        }
        Ok(text)
    }

    /// Halt the card and drop the field.
    pub fn end_scan(&mut self) -> Result<(), PiccError<B::Error>> {
        let halted = self.halt_a();
        self.antenna_off()?;
        halted
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.scans
    }

    pub fn reset_scan_stats(&mut self) {
        self.scans = ScanStats::default();
    }
}
