//! ISO/IEC 14443-3 Type A card model for the simulated reader.
//!
//! Answers REQA/WUPA, cascaded anticollision and SELECT, HLTA, and NTAG
//! READ. Loses its state when the field drops.

use cyd_rfid_core::rc522::registers::picc;
use heapless::Vec;

use crate::sim::crc_a;

/// NTAG213 user memory size in pages.
pub const NTAG213_PAGES: usize = 45;
const PAGE_SIZE: usize = 4;

/// Longest answer a card gives: 16 data bytes plus CRC_A.
pub type Answer = Vec<u8, 18>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle,
    /// Woken, anticollision in progress at this cascade level.
    Ready(usize),
    Active,
    Halted,
}

#[derive(Debug, Clone)]
pub struct Card {
    uid: Vec<u8, 10>,
    sak: u8,
    memory: [u8; NTAG213_PAGES * PAGE_SIZE],
    state: CardState,
    bad_bcc: bool,
}

impl Card {
    /// A card with the given UID (4, 7 or 10 bytes) and final SAK.
    pub fn new(uid: &[u8], sak: u8) -> Self {
        assert!(matches!(uid.len(), 4 | 7 | 10), "UID must be 4, 7 or 10 bytes");
        let mut bytes = Vec::new();
        let _ = bytes.extend_from_slice(uid);
        Self {
            uid: bytes,
            sak,
            memory: [0; NTAG213_PAGES * PAGE_SIZE],
            state: CardState::Idle,
            bad_bcc: false,
        }
    }

    /// Blank NTAG213: 7-byte UID, SAK 0x00, capability container in page 3.
    pub fn ntag213(uid: [u8; 7]) -> Self {
        let mut card = Self::new(&uid, 0x00);
        card.memory[3 * PAGE_SIZE..4 * PAGE_SIZE].copy_from_slice(&[0xE1, 0x10, 0x12, 0x00]);
        card.memory[4 * PAGE_SIZE] = 0xFE;
        card
    }

    /// NTAG213 holding one NDEF text record (language "en").
    pub fn ntag213_with_text(uid: [u8; 7], text: &str) -> Self {
        let mut card = Self::ntag213(uid);
        let payload_len = 3 + text.len();
        let mut tlv: std::vec::Vec<u8> = vec![
            0x03,
            (4 + payload_len) as u8,
            0xD1,
            0x01,
            payload_len as u8,
            b'T',
            0x02,
            b'e',
            b'n',
        ];
        tlv.extend_from_slice(text.as_bytes());
        tlv.push(0xFE);
        let start = 4 * PAGE_SIZE;
        card.memory[start..start + tlv.len()].copy_from_slice(&tlv);
        card
    }

    /// MIFARE Classic 1K style: 4-byte UID, SAK 0x08.
    pub fn classic_1k(uid: [u8; 4]) -> Self {
        Self::new(&uid, 0x08)
    }

    /// Send a wrong check byte in every anticollision answer.
    pub fn with_bad_bcc(mut self) -> Self {
        self.bad_bcc = true;
        self
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Field off: back to power-on state.
    pub fn power_down(&mut self) {
        self.state = CardState::Idle;
    }

    fn levels(&self) -> usize {
        match self.uid.len() {
            4 => 1,
            7 => 2,
            _ => 3,
        }
    }

    fn atqa(&self) -> [u8; 2] {
        match self.levels() {
            1 => [0x04, 0x00],
            2 => [0x44, 0x00],
            _ => [0x84, 0x00],
        }
    }

    /// The four UID bytes (with cascade tag where needed) sent at `level`.
    fn level_part(&self, level: usize) -> [u8; 4] {
        let last = level + 1 == self.levels();
        let offset = level * 3;
        let mut part = [0u8; 4];
        if last {
            part.copy_from_slice(&self.uid[offset..offset + 4]);
        } else {
            part[0] = picc::CASCADE_TAG;
            part[1..].copy_from_slice(&self.uid[offset..offset + 3]);
        }
        part
    }

    fn with_crc(data: &[u8]) -> Answer {
        let mut answer = Answer::new();
        let _ = answer.extend_from_slice(data);
        let crc = crc_a(data);
        let _ = answer.extend_from_slice(&crc.to_le_bytes());
        answer
    }

    fn crc_ok(frame: &[u8]) -> bool {
        match frame.len().checked_sub(2) {
            Some(n) => crc_a(&frame[..n]).to_le_bytes() == frame[n..],
            None => false,
        }
    }

    fn select_code(level: usize) -> u8 {
        [picc::SEL_CL1, picc::SEL_CL2, picc::SEL_CL3][level]
    }

    /// React to one frame from the reader. `None` means the card stays
    /// silent.
    pub fn respond(&mut self, frame: &[u8], tx_last_bits: u8) -> Option<Answer> {
        if tx_last_bits == 7 && frame.len() == 1 {
            let wakes = match frame[0] {
                picc::REQA => self.state != CardState::Halted,
                picc::WUPA => true,
                _ => false,
            };
            if !wakes {
                return None;
            }
            self.state = CardState::Ready(0);
            return Vec::from_slice(&self.atqa()).ok();
        }

        match (self.state, frame) {
            (CardState::Ready(level), [sel, nvb]) if *sel == Self::select_code(level) && *nvb == picc::NVB_ANTICOLL => {
                let part = self.level_part(level);
                let mut bcc = part.iter().fold(0u8, |acc, b| acc ^ b);
                if self.bad_bcc {
                    bcc ^= 0xFF;
                }
                let mut answer = Answer::new();
                let _ = answer.extend_from_slice(&part);
                let _ = answer.push(bcc);
                Some(answer)
            }
            (CardState::Ready(level), [sel, nvb, rest @ ..])
                if *sel == Self::select_code(level) && *nvb == picc::NVB_SELECT && rest.len() == 7 =>
            {
                let part = self.level_part(level);
                if !Self::crc_ok(frame) || rest[..4] != part {
                    self.state = CardState::Idle;
                    return None;
                }
                let sak = if level + 1 < self.levels() {
                    self.state = CardState::Ready(level + 1);
                    picc::SAK_CASCADE
                } else {
                    self.state = CardState::Active;
                    self.sak
                };
                Some(Self::with_crc(&[sak]))
            }
            (CardState::Active, [picc::READ, page, _, _]) if Self::crc_ok(frame) => {
                let mut data = [0u8; 16];
                let size = self.memory.len();
                let start = usize::from(*page) * PAGE_SIZE;
                for (i, byte) in data.iter_mut().enumerate() {
                    // Reads past the end roll over to page 0.
                    *byte = self.memory[(start + i) % size];
                }
                Some(Self::with_crc(&data))
            }
            (CardState::Active, [picc::HLTA, 0x00, _, _]) if Self::crc_ok(frame) => {
                self.state = CardState::Halted;
                None
            }
            _ => None,
        }
    }
}
