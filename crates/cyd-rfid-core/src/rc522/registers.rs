//! MFRC522 register addresses, commands and bit-field constants.
//!
//! Addresses are given as SPI address bytes: the 6-bit register number
//! shifted left by one, direction bit clear. Datasheet section 9.

/// Register number to SPI address byte.
const fn reg(n: u8) -> u8 {
    n << 1
}

// Page 0: command and status
pub const COMMAND: u8 = reg(0x01);
pub const COM_IEN: u8 = reg(0x02);
pub const DIV_IEN: u8 = reg(0x03);
pub const COM_IRQ: u8 = reg(0x04);
pub const DIV_IRQ: u8 = reg(0x05);
pub const ERROR: u8 = reg(0x06);
pub const STATUS1: u8 = reg(0x07);
pub const STATUS2: u8 = reg(0x08);
pub const FIFO_DATA: u8 = reg(0x09);
pub const FIFO_LEVEL: u8 = reg(0x0A);
pub const WATER_LEVEL: u8 = reg(0x0B);
pub const CONTROL: u8 = reg(0x0C);
pub const BIT_FRAMING: u8 = reg(0x0D);
pub const COLL: u8 = reg(0x0E);

// Page 1: command
pub const MODE: u8 = reg(0x11);
pub const TX_MODE: u8 = reg(0x12);
pub const RX_MODE: u8 = reg(0x13);
pub const TX_CONTROL: u8 = reg(0x14);
pub const TX_ASK: u8 = reg(0x15);
pub const TX_SEL: u8 = reg(0x16);
pub const RX_SEL: u8 = reg(0x17);
pub const RX_THRESHOLD: u8 = reg(0x18);
pub const DEMOD: u8 = reg(0x19);
pub const MF_TX: u8 = reg(0x1C);
pub const MF_RX: u8 = reg(0x1D);
pub const SERIAL_SPEED: u8 = reg(0x1F);

// Page 2: configuration
pub const CRC_RESULT_H: u8 = reg(0x21);
pub const CRC_RESULT_L: u8 = reg(0x22);
pub const MOD_WIDTH: u8 = reg(0x24);
pub const RF_CFG: u8 = reg(0x26);
pub const GS_N: u8 = reg(0x27);
pub const CW_GS_P: u8 = reg(0x28);
pub const MOD_GS_P: u8 = reg(0x29);
pub const T_MODE: u8 = reg(0x2A);
pub const T_PRESCALER: u8 = reg(0x2B);
pub const T_RELOAD_H: u8 = reg(0x2C);
pub const T_RELOAD_L: u8 = reg(0x2D);
pub const T_COUNTER_VAL_H: u8 = reg(0x2E);
pub const T_COUNTER_VAL_L: u8 = reg(0x2F);

// Page 3: test
pub const TEST_SEL1: u8 = reg(0x31);
pub const TEST_SEL2: u8 = reg(0x32);
pub const TEST_PIN_EN: u8 = reg(0x33);
pub const TEST_PIN_VALUE: u8 = reg(0x34);
pub const TEST_BUS: u8 = reg(0x35);
pub const AUTO_TEST: u8 = reg(0x36);
pub const VERSION: u8 = reg(0x37);
pub const ANALOG_TEST: u8 = reg(0x38);
pub const TEST_DAC1: u8 = reg(0x39);
pub const TEST_DAC2: u8 = reg(0x3A);
pub const TEST_ADC: u8 = reg(0x3B);

/// PCD commands written to `COMMAND[3:0]`.
pub mod command {
    pub const IDLE: u8 = 0x00;
    pub const MEM: u8 = 0x01;
    pub const GENERATE_RANDOM_ID: u8 = 0x02;
    pub const CALC_CRC: u8 = 0x03;
    pub const TRANSMIT: u8 = 0x04;
    pub const NO_CMD_CHANGE: u8 = 0x07;
    pub const RECEIVE: u8 = 0x08;
    pub const TRANSCEIVE: u8 = 0x0C;
    pub const MF_AUTHENT: u8 = 0x0E;
    pub const SOFT_RESET: u8 = 0x0F;
}

/// `DIV_IRQ`: CRC coprocessor finished.
pub const DIV_IRQ_CRC: u8 = 1 << 2;
/// `FIFO_LEVEL`: writing 1 flushes the FIFO.
pub const FIFO_FLUSH: u8 = 1 << 7;
/// `FIFO_LEVEL[6:0]`: bytes currently buffered.
pub const FIFO_LEVEL_MASK: u8 = 0x7F;
/// FIFO depth in bytes.
pub const FIFO_SIZE: usize = 64;
/// `TX_CONTROL`: Tx1RFEn | Tx2RFEn.
pub const TX_CONTROL_ANTENNA: u8 = 0x03;
/// `COLL`: ValuesAfterColl.
pub const COLL_VALUES_AFTER_COLL: u8 = 1 << 7;
/// `COM_IRQ`: write-1-to-clear for all request bits.
pub const COM_IRQ_CLEAR_ALL: u8 = 0x7F;
/// `COM_IRQ`: RxIRq, a frame was received.
pub const COM_IRQ_RX: u8 = 1 << 5;
/// `COM_IRQ`: IdleIRq, the command finished.
pub const COM_IRQ_IDLE: u8 = 1 << 4;
/// `COM_IRQ`: TimerIRq, the timer reached zero.
pub const COM_IRQ_TIMER: u8 = 1 << 0;
/// `BIT_FRAMING`: StartSend, begins a Transceive transmission.
pub const BIT_FRAMING_START_SEND: u8 = 1 << 7;
/// `BIT_FRAMING[2:0]`: TxLastBits.
pub const BIT_FRAMING_TX_LAST_BITS: u8 = 0x07;
/// `T_MODE`: TAuto, timer starts at the end of transmission.
pub const T_MODE_AUTO: u8 = 1 << 7;
/// `ERROR`: CollErr.
pub const ERROR_COLL: u8 = 1 << 3;
/// `ERROR`: BufferOvfl | ParityErr | ProtocolErr.
pub const ERROR_FRAME: u8 = (1 << 4) | (1 << 1) | (1 << 0);
/// `CONTROL[2:0]`: RxLastBits, valid bits in the last received byte.
pub const CONTROL_RX_LAST_BITS: u8 = 0x07;

/// ISO/IEC 14443-3 Type A card commands and markers.
pub mod picc {
    /// REQA, sent as a 7-bit short frame.
    pub const REQA: u8 = 0x26;
    pub const WUPA: u8 = 0x52;
    pub const SEL_CL1: u8 = 0x93;
    pub const SEL_CL2: u8 = 0x95;
    pub const SEL_CL3: u8 = 0x97;
    /// NVB for anticollision: SEL and NVB only.
    pub const NVB_ANTICOLL: u8 = 0x20;
    /// NVB for SELECT: all seven bytes.
    pub const NVB_SELECT: u8 = 0x70;
    pub const HLTA: u8 = 0x50;
    /// NTAG/Ultralight READ: four pages.
    pub const READ: u8 = 0x30;
    /// Cascade tag: the UID continues at the next level.
    pub const CASCADE_TAG: u8 = 0x88;
    /// SAK bit: UID not complete.
    pub const SAK_CASCADE: u8 = 1 << 2;
}
