//! Behavioural model of an MFRC522 behind its SPI pins.
//!
//! Covers the register file with power-on defaults, soft reset, the 64-byte
//! FIFO, `CalcCRC`, the `DIV_IRQ`/`COM_IRQ` set/clear semantics, and
//! `Transceive` against [`Card`]s placed in the field. The analog front end
//! is reduced to "antenna drivers on or off".
//!
//! The SPI slave follows Mode 0: data in is latched on the rising clock
//! edge, data out changes on the falling edge.

use cyd_rfid_core::rc522::registers::{self, command};
use heapless::{Deque, Vec};

use crate::card::{Answer, Card};

const REGISTER_COUNT: usize = 64;

/// Version byte of the simulated part (MFRC522 v2.0).
pub const SIM_VERSION: u8 = 0x92;
/// Cards that fit in the simulated field at once.
pub const MAX_CARDS: usize = 4;

/// Register number (0..=0x3F) of an address-byte constant.
const fn index(address: u8) -> usize {
    ((address >> 1) & 0x3F) as usize
}

/// ISO/IEC 14443-3 CRC_A: reflected 0x8408 polynomial, preset 0x6363.
pub fn crc_a(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    crc
}

/// Register-level chip state.
pub struct Chip {
    regs: [u8; REGISTER_COUNT],
    fifo: Deque<u8, { registers::FIFO_SIZE }>,
    resets: u32,
    cards: Vec<Card, MAX_CARDS>,
    transmissions: u32,
}

impl Default for Chip {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip {
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; REGISTER_COUNT],
            fifo: Deque::new(),
            resets: 0,
            cards: Vec::new(),
            transmissions: 0,
        };
        chip.load_defaults();
        chip
    }

    fn load_defaults(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.fifo.clear();
        for card in &mut self.cards {
            card.power_down();
        }
        let defaults = [
            (registers::COMMAND, 0x20),
            (registers::COM_IEN, 0x80),
            (registers::COM_IRQ, 0x14),
            (registers::WATER_LEVEL, 0x08),
            (registers::CONTROL, 0x10),
            (registers::MODE, 0x3F),
            (registers::TX_CONTROL, 0x80),
            (registers::TX_SEL, 0x10),
            (registers::RX_SEL, 0x84),
            (registers::RX_THRESHOLD, 0x84),
            (registers::DEMOD, 0x4D),
            (registers::MF_TX, 0x62),
            (registers::SERIAL_SPEED, 0xEB),
            (registers::CRC_RESULT_H, 0xFF),
            (registers::CRC_RESULT_L, 0xFF),
            (registers::MOD_WIDTH, 0x26),
            (registers::RF_CFG, 0x48),
            (registers::GS_N, 0x88),
            (registers::CW_GS_P, 0x20),
            (registers::MOD_GS_P, 0x20),
            (registers::VERSION, SIM_VERSION),
        ];
        for (address, value) in defaults {
            self.regs[index(address)] = value;
        }
    }

    /// Number of soft resets executed since construction.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Raw register value without read side effects.
    pub fn peek(&self, address: u8) -> u8 {
        match address {
            registers::FIFO_LEVEL => self.fifo.len() as u8,
            _ => self.regs[index(address)],
        }
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    /// Put a card in the field. Returns it back if the field is full.
    pub fn insert_card(&mut self, card: Card) -> Result<(), Card> {
        self.cards.push(card)
    }

    pub fn remove_cards(&mut self) {
        self.cards.clear();
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Frames sent to the field since construction.
    pub fn transmissions(&self) -> u32 {
        self.transmissions
    }

    /// Both antenna drivers enabled.
    pub fn field_on(&self) -> bool {
        self.regs[index(registers::TX_CONTROL)] & registers::TX_CONTROL_ANTENNA
            == registers::TX_CONTROL_ANTENNA
    }

    pub fn read(&mut self, address: u8) -> u8 {
        match address {
            registers::FIFO_DATA => self.fifo.pop_front().unwrap_or(0),
            _ => self.peek(address),
        }
    }

    pub fn write(&mut self, address: u8, value: u8) {
        match address {
            registers::COMMAND => self.execute(value),
            registers::FIFO_DATA => {
                if self.fifo.push_back(value).is_err() {
                    // BufferOvfl
                    self.regs[index(registers::ERROR)] |= 1 << 4;
                }
            }
            registers::FIFO_LEVEL => {
                if value & registers::FIFO_FLUSH != 0 {
                    self.fifo.clear();
                    self.regs[index(registers::ERROR)] &= !(1 << 4);
                }
            }
            registers::COM_IRQ | registers::DIV_IRQ => {
                // Bit 7 selects set or clear for the marked bits.
                let slot = &mut self.regs[index(address)];
                let mask = value & 0x7F;
                if value & 0x80 != 0 {
                    *slot |= mask;
                } else {
                    *slot &= !mask;
                }
            }
            registers::BIT_FRAMING => {
                self.regs[index(address)] = value;
                let transceiving =
                    self.regs[index(registers::COMMAND)] & 0x0F == command::TRANSCEIVE;
                if transceiving && value & registers::BIT_FRAMING_START_SEND != 0 {
                    self.transmit(value & registers::BIT_FRAMING_TX_LAST_BITS);
                }
            }
            registers::TX_CONTROL => {
                self.regs[index(address)] = value;
                if !self.field_on() {
                    for card in &mut self.cards {
                        card.power_down();
                    }
                }
            }
            registers::VERSION | registers::STATUS1 | registers::ERROR => {}
            _ => self.regs[index(address)] = value,
        }
    }

    /// Send the FIFO contents to every card in the field and collect what
    /// comes back.
    fn transmit(&mut self, tx_last_bits: u8) {
        let mut frame: Vec<u8, { registers::FIFO_SIZE }> = Vec::new();
        while let Some(byte) = self.fifo.pop_front() {
            let _ = frame.push(byte);
        }
        self.transmissions += 1;
        self.regs[index(registers::ERROR)] = 0;

        let mut answers: Vec<Answer, MAX_CARDS> = Vec::new();
        if self.field_on() {
            for card in &mut self.cards {
                if let Some(answer) = card.respond(&frame, tx_last_bits) {
                    let _ = answers.push(answer);
                }
            }
        }

        let Some(first) = answers.first() else {
            log::trace!("sim: {:02X?} got no answer", frame.as_slice());
            if self.regs[index(registers::T_MODE)] & registers::T_MODE_AUTO != 0 {
                self.regs[index(registers::COM_IRQ)] |= registers::COM_IRQ_TIMER;
            }
            return;
        };

        if answers.iter().any(|a| a != first) {
            log::trace!("sim: {} cards answered differently", answers.len());
            self.regs[index(registers::ERROR)] |= registers::ERROR_COLL;
        }
        for &byte in first.iter() {
            let _ = self.fifo.push_back(byte);
        }
        self.regs[index(registers::CONTROL)] &= !registers::CONTROL_RX_LAST_BITS;
        self.regs[index(registers::COM_IRQ)] |= registers::COM_IRQ_RX;
        log::trace!("sim: {:02X?} -> {:02X?}", frame.as_slice(), first.as_slice());
    }

    fn execute(&mut self, value: u8) {
        let keep = self.regs[index(registers::COMMAND)] & 0x30;
        match value & 0x0F {
            command::SOFT_RESET => {
                self.load_defaults();
                self.resets += 1;
                log::trace!("sim: soft reset");
            }
            command::CALC_CRC => {
                let mut data: heapless::Vec<u8, { registers::FIFO_SIZE }> = heapless::Vec::new();
                while let Some(byte) = self.fifo.pop_front() {
                    let _ = data.push(byte);
                }
                let crc = crc_a(&data);
                self.regs[index(registers::CRC_RESULT_L)] = crc as u8;
                self.regs[index(registers::CRC_RESULT_H)] = (crc >> 8) as u8;
                self.regs[index(registers::DIV_IRQ)] |= registers::DIV_IRQ_CRC;
                self.regs[index(registers::COMMAND)] = keep | command::CALC_CRC;
                log::trace!("sim: CRC_A over {} bytes = {crc:04X}", data.len());
            }
            cmd => self.regs[index(registers::COMMAND)] = keep | cmd,
        }
    }
}

/// SPI slave front end wrapped around a [`Chip`].
pub struct Mfrc522Sim {
    pub chip: Chip,
    selected: bool,
    rx: u8,
    rx_bits: u8,
    tx: u8,
    tx_bit: u8,
    pending_tx: Option<u8>,
    bytes_in_frame: usize,
    address: u8,
    reading: bool,
    frames: u32,
}

impl Default for Mfrc522Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl Mfrc522Sim {
    pub fn new() -> Self {
        Self {
            chip: Chip::new(),
            selected: false,
            rx: 0,
            rx_bits: 0,
            tx: 0,
            tx_bit: 0,
            pending_tx: None,
            bytes_in_frame: 0,
            address: 0,
            reading: false,
            frames: 0,
        }
    }

    /// Completed chip-select frames.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Level the chip drives on MISO, or `None` when the output is
    /// tri-stated (chip not selected).
    pub fn miso(&self) -> Option<bool> {
        if !self.selected {
            return None;
        }
        Some(self.tx & (0x80 >> self.tx_bit.min(7)) != 0)
    }

    pub fn chip_select(&mut self, active: bool) {
        if active == self.selected {
            return;
        }
        self.selected = active;
        if active {
            self.rx = 0;
            self.rx_bits = 0;
            self.tx = 0;
            self.tx_bit = 0;
            self.pending_tx = None;
            self.bytes_in_frame = 0;
        } else {
            self.frames += 1;
            if self.rx_bits != 0 {
                log::warn!("sim: frame ended mid-byte after {} bits", self.rx_bits);
            }
        }
    }

    pub fn rising_edge(&mut self, mosi: bool) {
        if !self.selected {
            return;
        }
        self.rx = (self.rx << 1) | u8::from(mosi);
        self.rx_bits += 1;
        if self.rx_bits == 8 {
            let byte = self.rx;
            self.rx = 0;
            self.rx_bits = 0;
            self.pending_tx = Some(self.receive(byte));
        }
    }

    pub fn falling_edge(&mut self) {
        if !self.selected {
            return;
        }
        match self.pending_tx.take() {
            Some(next) => {
                self.tx = next;
                self.tx_bit = 0;
            }
            None => self.tx_bit = (self.tx_bit + 1).min(7),
        }
    }

    /// Handle one complete byte; returns the byte to shift out next.
    fn receive(&mut self, byte: u8) -> u8 {
        let position = self.bytes_in_frame;
        self.bytes_in_frame += 1;

        if position == 0 {
            self.address = byte & 0x7E;
            self.reading = byte & 0x80 != 0;
            return if self.reading { self.chip.read(self.address) } else { 0 };
        }

        if self.reading {
            // During a read each byte clocked in names the next address;
            // zero ends the burst.
            if byte & 0x80 != 0 {
                self.address = byte & 0x7E;
                self.chip.read(self.address)
            } else {
                0
            }
        } else {
            self.chip.write(self.address, byte);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_a_known_vectors() {
        // HLTA frame: 50 00 -> 57 CD
        assert_eq!(crc_a(&[0x50, 0x00]), 0xCD57);
        assert_eq!(crc_a(&[]), 0x6363);
    }

    #[test]
    fn soft_reset_restores_defaults() {
        let mut chip = Chip::new();
        chip.write(registers::MODE, 0x00);
        chip.write(registers::FIFO_DATA, 0x11);

        chip.write(registers::COMMAND, command::SOFT_RESET);

        assert_eq!(chip.peek(registers::MODE), 0x3F);
        assert_eq!(chip.fifo_len(), 0);
        assert_eq!(chip.peek(registers::VERSION), SIM_VERSION);
        assert_eq!(chip.resets(), 1);
    }

    #[test]
    fn version_is_read_only() {
        let mut chip = Chip::new();
        chip.write(registers::VERSION, 0x00);
        assert_eq!(chip.read(registers::VERSION), SIM_VERSION);
    }

    #[test]
    fn fifo_overflow_sets_error() {
        let mut chip = Chip::new();
        for i in 0..=registers::FIFO_SIZE {
            chip.write(registers::FIFO_DATA, i as u8);
        }
        assert_eq!(chip.fifo_len(), registers::FIFO_SIZE);
        assert_ne!(chip.peek(registers::ERROR) & (1 << 4), 0);

        chip.write(registers::FIFO_LEVEL, registers::FIFO_FLUSH);
        assert_eq!(chip.peek(registers::ERROR), 0);
    }

    #[test]
    fn div_irq_set_and_clear() {
        let mut chip = Chip::new();
        chip.write(registers::DIV_IRQ, 0x80 | registers::DIV_IRQ_CRC);
        assert_eq!(chip.peek(registers::DIV_IRQ), registers::DIV_IRQ_CRC);
        chip.write(registers::DIV_IRQ, registers::DIV_IRQ_CRC);
        assert_eq!(chip.peek(registers::DIV_IRQ), 0);
    }

    #[test]
    fn calc_crc_consumes_fifo() {
        let mut chip = Chip::new();
        chip.write(registers::FIFO_DATA, 0x50);
        chip.write(registers::FIFO_DATA, 0x00);
        chip.write(registers::COMMAND, command::CALC_CRC);

        assert_eq!(chip.fifo_len(), 0);
        assert_eq!(chip.peek(registers::CRC_RESULT_L), 0x57);
        assert_eq!(chip.peek(registers::CRC_RESULT_H), 0xCD);
        assert_ne!(chip.peek(registers::DIV_IRQ) & registers::DIV_IRQ_CRC, 0);
    }

    fn send(chip: &mut Chip, frame: &[u8], tx_last_bits: u8) {
        chip.write(registers::COM_IRQ, registers::COM_IRQ_CLEAR_ALL);
        for &byte in frame {
            chip.write(registers::FIFO_DATA, byte);
        }
        chip.write(registers::COMMAND, command::TRANSCEIVE);
        chip.write(
            registers::BIT_FRAMING,
            registers::BIT_FRAMING_START_SEND | tx_last_bits,
        );
    }

    #[test]
    fn transceive_delivers_atqa() {
        let mut chip = Chip::new();
        chip.insert_card(Card::classic_1k([1, 2, 3, 4])).unwrap();
        chip.write(registers::TX_CONTROL, 0x83);

        send(&mut chip, &[0x26], 7);

        assert_ne!(chip.peek(registers::COM_IRQ) & registers::COM_IRQ_RX, 0);
        assert_eq!(chip.fifo_len(), 2);
        assert_eq!(chip.read(registers::FIFO_DATA), 0x04);
        assert_eq!(chip.transmissions(), 1);
    }

    #[test]
    fn card_is_silent_with_field_off() {
        let mut chip = Chip::new();
        chip.insert_card(Card::classic_1k([1, 2, 3, 4])).unwrap();
        chip.write(registers::T_MODE, registers::T_MODE_AUTO);

        send(&mut chip, &[0x26], 7);

        assert_eq!(chip.peek(registers::COM_IRQ) & registers::COM_IRQ_RX, 0);
        assert_ne!(chip.peek(registers::COM_IRQ) & registers::COM_IRQ_TIMER, 0);
        assert_eq!(chip.fifo_len(), 0);
    }

    #[test]
    fn differing_answers_flag_collision() {
        let mut chip = Chip::new();
        chip.insert_card(Card::classic_1k([1, 2, 3, 4])).unwrap();
        chip.insert_card(Card::classic_1k([5, 6, 7, 8])).unwrap();
        chip.write(registers::TX_CONTROL, 0x83);

        send(&mut chip, &[0x26], 7);
        assert_eq!(chip.peek(registers::ERROR) & registers::ERROR_COLL, 0);
        chip.write(registers::FIFO_LEVEL, registers::FIFO_FLUSH);

        send(&mut chip, &[0x93, 0x20], 0);
        assert_ne!(chip.peek(registers::ERROR) & registers::ERROR_COLL, 0);
    }

    #[test]
    fn slave_shifts_register_out() {
        let mut sim = Mfrc522Sim::new();
        let clock = |sim: &mut Mfrc522Sim, out: u8| -> u8 {
            let mut byte = 0;
            for bit in (0..8).rev() {
                let level = sim.miso().unwrap_or(true);
                sim.rising_edge(out & (1 << bit) != 0);
                byte = (byte << 1) | u8::from(level);
                sim.falling_edge();
            }
            byte
        };

        sim.chip_select(true);
        assert_eq!(clock(&mut sim, 0x80 | registers::VERSION), 0x00);
        assert_eq!(clock(&mut sim, 0x00), SIM_VERSION);
        sim.chip_select(false);
        assert_eq!(sim.frames(), 1);
    }
}
