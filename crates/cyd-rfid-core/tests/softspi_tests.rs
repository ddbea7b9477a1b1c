//! Line-level tests for the soft SPI link.
//!
//! Every pin, the delay and the interrupt lock write into one shared event
//! log, so tests can check edge order, framing and what ran inside the
//! critical section.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use cyd_rfid_core::config::Timing;
use cyd_rfid_core::softspi::{Error, Line, SoftSpi, SoftSpiPins};
use cyd_rfid_hal::{InterruptLock, RegisterBus};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin};
use embedded_hal::spi::{Mode, Operation, Phase, Polarity, SpiDevice, MODE_0, MODE_1, MODE_2, MODE_3};

/// One observable thing on the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Clock(bool),
    DataOut(bool),
    ChipSelect(bool),
    Sample(bool),
    DelayUs(u32),
    LockAcquire,
    LockRelease,
}

#[derive(Default)]
struct Board {
    events: Vec<Event>,
    /// Bits returned by successive data-in samples; low when empty.
    miso: VecDeque<bool>,
    /// Fail the n-th (1-based) write to this line.
    fault: Option<(Line, usize)>,
    /// Panic on the n-th (1-based) write to this line.
    panic_on: Option<(Line, usize)>,
    writes: [usize; 4],
    cs_level: bool,
}

impl Board {
    fn line_index(line: Line) -> usize {
        match line {
            Line::Clock => 0,
            Line::DataOut => 1,
            Line::DataIn => 2,
            Line::ChipSelect => 3,
        }
    }

    fn queue_byte(&mut self, byte: u8) {
        for bit in (0..8).rev() {
            self.miso.push_back(byte & (1 << bit) != 0);
        }
    }
}

type Shared = Rc<RefCell<Board>>;

#[derive(Debug)]
struct InjectedFault;

impl digital::Error for InjectedFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

struct MockOut {
    board: Shared,
    line: Line,
}

impl MockOut {
    fn drive(&mut self, high: bool) -> Result<(), InjectedFault> {
        let mut board = self.board.borrow_mut();
        let idx = Board::line_index(self.line);
        board.writes[idx] += 1;
        if board.fault == Some((self.line, board.writes[idx])) {
            return Err(InjectedFault);
        }
        if board.panic_on == Some((self.line, board.writes[idx])) {
            drop(board);
            panic!("{} driver panicked", self.line);
        }
        let event = match self.line {
            Line::Clock => Event::Clock(high),
            Line::DataOut => Event::DataOut(high),
            Line::ChipSelect => {
                board.cs_level = high;
                Event::ChipSelect(high)
            }
            Line::DataIn => unreachable!("data-in is an input"),
        };
        board.events.push(event);
        Ok(())
    }
}

impl ErrorType for MockOut {
    type Error = InjectedFault;
}

impl OutputPin for MockOut {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

struct MockIn {
    board: Shared,
}

impl ErrorType for MockIn {
    type Error = InjectedFault;
}

impl InputPin for MockIn {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut board = self.board.borrow_mut();
        let idx = Board::line_index(Line::DataIn);
        board.writes[idx] += 1;
        if board.fault == Some((Line::DataIn, board.writes[idx])) {
            return Err(InjectedFault);
        }
        let level = board.miso.pop_front().unwrap_or(false);
        board.events.push(Event::Sample(level));
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

struct MockDelay {
    board: Shared,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.board.borrow_mut().events.push(Event::DelayUs(ns / 1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.board.borrow_mut().events.push(Event::DelayUs(us));
    }
}

struct MockLock {
    board: Shared,
}

impl InterruptLock for MockLock {
    type State = ();

    fn acquire(&mut self) {
        self.board.borrow_mut().events.push(Event::LockAcquire);
    }

    fn release(&mut self, _state: ()) {
        self.board.borrow_mut().events.push(Event::LockRelease);
    }
}

type TestSpi = SoftSpi<MockOut, MockOut, MockIn, MockOut, MockDelay, MockLock>;

fn make_spi_with(mode: Mode) -> (TestSpi, Shared) {
    let board: Shared = Rc::new(RefCell::new(Board::default()));
    let out = |line| MockOut {
        board: board.clone(),
        line,
    };
    let pins = SoftSpiPins::new(
        out(Line::Clock),
        out(Line::DataOut),
        MockIn {
            board: board.clone(),
        },
        out(Line::ChipSelect),
    );
    let spi = SoftSpi::with_mode(
        pins,
        MockDelay {
            board: board.clone(),
        },
        MockLock {
            board: board.clone(),
        },
        Timing::CYD,
        mode,
    )
    .expect("construction should succeed");
    // Forget the idle-level setup so tests see only their own traffic.
    board.borrow_mut().events.clear();
    board.borrow_mut().writes = [0; 4];
    (spi, board)
}

fn make_spi() -> (TestSpi, Shared) {
    make_spi_with(MODE_0)
}

fn clock_edges(events: &[Event]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Clock(level) => Some(*level),
            _ => None,
        })
        .collect()
}

/// Data-out level at every rising clock edge.
fn mosi_bits(events: &[Event]) -> Vec<bool> {
    let mut level = false;
    let mut bits = Vec::new();
    for event in events {
        match event {
            Event::DataOut(l) => level = *l,
            Event::Clock(true) => bits.push(level),
            _ => {}
        }
    }
    bits
}

/// Data-out level at every clock transition to `level`.
fn mosi_at_edges(events: &[Event], level: bool) -> Vec<bool> {
    let mut data = false;
    let mut bits = Vec::new();
    for event in events {
        match event {
            Event::DataOut(l) => data = *l,
            Event::Clock(l) if *l == level => bits.push(data),
            _ => {}
        }
    }
    bits
}

fn mosi_bytes(events: &[Event]) -> Vec<u8> {
    mosi_bits(events)
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | u8::from(b)))
        .collect()
}

// ============================================================================
// Bit transfer engine
// ============================================================================

mod transfer_byte_tests {
    use super::*;

    #[test]
    fn eight_alternating_edge_pairs_for_any_byte() {
        for byte in [0x00, 0xFF, 0xA5, 0x5A, 0b1011_0100, 0x01, 0x80] {
            let (mut spi, board) = make_spi();
            spi.transfer_byte(byte).expect("transfer should succeed");

            let edges = clock_edges(&board.borrow().events);
            let expected: Vec<bool> = (0..8).flat_map(|_| [true, false]).collect();
            assert_eq!(edges, expected, "edge shape for 0x{byte:02X}");
        }
    }

    #[test]
    fn data_out_is_msb_first() {
        let (mut spi, board) = make_spi();
        spi.transfer_byte(0b1011_0100)
            .expect("transfer should succeed");

        let bits = mosi_bits(&board.borrow().events);
        assert_eq!(
            bits,
            vec![true, false, true, true, false, true, false, false]
        );
    }

    #[test]
    fn data_in_is_assembled_msb_first() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().queue_byte(0x5A);

        let inbound = spi.transfer_byte(0x00).expect("transfer should succeed");
        assert_eq!(inbound, 0x5A);
    }

    #[test]
    fn data_in_sampled_while_clock_high() {
        let (mut spi, board) = make_spi();
        spi.transfer_byte(0x3C).expect("transfer should succeed");

        let mut clock = false;
        for event in &board.borrow().events {
            match event {
                Event::Clock(level) => clock = *level,
                Event::Sample(_) => assert!(clock, "sample taken with clock low"),
                _ => {}
            }
        }
    }

    #[test]
    fn whole_byte_inside_one_critical_section() {
        let (mut spi, board) = make_spi();
        spi.transfer_byte(0xC3).expect("transfer should succeed");

        let events = board.borrow().events.clone();
        assert_eq!(events.first(), Some(&Event::LockAcquire));
        assert_eq!(events.last(), Some(&Event::LockRelease));
        let acquires = events.iter().filter(|e| **e == Event::LockAcquire).count();
        assert_eq!(acquires, 1);
    }

    #[test]
    fn hold_time_is_fixed_and_bounded() {
        for byte in [0x00, 0xFF] {
            let (mut spi, board) = make_spi();
            spi.transfer_byte(byte).expect("transfer should succeed");

            let held: u32 = board
                .borrow()
                .events
                .iter()
                .filter_map(|e| match e {
                    Event::DelayUs(us) => Some(*us),
                    _ => None,
                })
                .sum();
            assert_eq!(held, Timing::CYD.byte_hold_time().to_micros());
        }
    }

    #[test]
    fn lock_released_when_pin_faults() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().fault = Some((Line::Clock, 3));

        let err = spi.transfer_byte(0xFF).unwrap_err();
        assert!(matches!(err, Error::Pin { line: Line::Clock, .. }));
        assert_eq!(board.borrow().events.last(), Some(&Event::LockRelease));
    }

    /// Level of the edge on which the slave latches data out.
    fn slave_sample_level(mode: Mode) -> bool {
        let idle_high = mode.polarity == Polarity::IdleHigh;
        match mode.phase {
            Phase::CaptureOnFirstTransition => !idle_high,
            Phase::CaptureOnSecondTransition => idle_high,
        }
    }

    #[test]
    fn every_mode_presents_data_at_slave_sample_edge() {
        for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
            let (mut spi, board) = make_spi_with(mode);
            spi.transfer_byte(0b1011_0100)
                .expect("transfer should succeed");

            let bits = mosi_at_edges(&board.borrow().events, slave_sample_level(mode));
            assert_eq!(
                bits,
                vec![true, false, true, true, false, true, false, false],
                "{mode:?}"
            );
        }
    }

    #[test]
    fn every_mode_assembles_data_in() {
        for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
            let (mut spi, board) = make_spi_with(mode);
            board.borrow_mut().queue_byte(0x5A);

            let inbound = spi.transfer_byte(0xFF).expect("transfer should succeed");
            assert_eq!(inbound, 0x5A, "{mode:?}");
        }
    }

    #[test]
    fn every_mode_samples_after_capture_edge() {
        for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
            let (mut spi, board) = make_spi_with(mode);
            spi.transfer_byte(0x3C).expect("transfer should succeed");

            let idle_high = mode.polarity == Polarity::IdleHigh;
            let expected = slave_sample_level(mode);
            let mut clock = idle_high;
            let mut samples = 0;
            for event in &board.borrow().events {
                match event {
                    Event::Clock(level) => clock = *level,
                    Event::Sample(_) => {
                        samples += 1;
                        assert_eq!(clock, expected, "{mode:?} sampled on the wrong phase");
                    }
                    _ => {}
                }
            }
            assert_eq!(samples, 8);
        }
    }

    #[test]
    fn second_phase_modes_change_data_on_leading_edge() {
        for mode in [MODE_1, MODE_3] {
            let (mut spi, board) = make_spi_with(mode);
            spi.transfer_byte(0xA5).expect("transfer should succeed");

            let idle_high = mode.polarity == Polarity::IdleHigh;
            let mut clock = idle_high;
            for event in &board.borrow().events {
                match event {
                    Event::Clock(level) => clock = *level,
                    Event::DataOut(_) => {
                        assert_ne!(clock, idle_high, "{mode:?} changed data with clock idle")
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn mode2_idles_clock_high_and_leads_falling() {
        let (mut spi, board) = make_spi_with(MODE_2);
        spi.transfer_byte(0x81).expect("transfer should succeed");

        let edges = clock_edges(&board.borrow().events);
        let expected: Vec<bool> = (0..8).flat_map(|_| [false, true]).collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn mode3_idles_clock_high() {
        let (mut spi, board) = make_spi_with(MODE_3);
        spi.transfer_byte(0x81).expect("transfer should succeed");

        let edges = clock_edges(&board.borrow().events);
        let expected: Vec<bool> = (0..8).flat_map(|_| [false, true]).collect();
        assert_eq!(edges, expected);
    }
}

// ============================================================================
// Register access protocol
// ============================================================================

mod register_tests {
    use super::*;

    #[test]
    fn write_register_frame() {
        let (mut spi, board) = make_spi();
        spi.write_register(0x02, 0x0F)
            .expect("write_register should succeed");

        let events = board.borrow().events.clone();
        assert_eq!(events[0], Event::ChipSelect(false));
        assert_eq!(events[1], Event::DelayUs(10));
        assert_eq!(mosi_bytes(&events), vec![0x02, 0x0F]);

        let release = events
            .iter()
            .position(|e| *e == Event::ChipSelect(true))
            .expect("chip select should be released");
        assert_eq!(events[release + 1], Event::DelayUs(10));
        // No clock activity outside the frame.
        assert!(!events[release..].iter().any(|e| matches!(e, Event::Clock(_))));
        assert!(board.borrow().cs_level);
    }

    #[test]
    fn read_register_sets_direction_bit() {
        let (mut spi, board) = make_spi();
        spi.write_register(0x6E, 0x00)
            .expect("write_register should succeed");
        let write_addr = mosi_bytes(&board.borrow().events)[0];

        board.borrow_mut().events.clear();
        spi.read_register(0x6E).expect("read_register should succeed");
        let read_bytes = mosi_bytes(&board.borrow().events);

        assert_eq!(read_bytes[0], write_addr | 0x80);
        assert_eq!(read_bytes[1], 0x00);
    }

    #[test]
    fn read_register_returns_second_byte() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().queue_byte(0xAA); // clocked in with the address
        board.borrow_mut().queue_byte(0x92);

        let value = spi.read_register(0x6E).expect("read_register should succeed");
        assert_eq!(value, 0x92);
    }

    #[test]
    fn lock_never_spans_chip_select_edges() {
        let (mut spi, board) = make_spi();
        spi.write_register(0x02, 0xFF)
            .expect("write_register should succeed");

        let mut locked = false;
        for event in &board.borrow().events {
            match event {
                Event::LockAcquire => locked = true,
                Event::LockRelease => locked = false,
                Event::ChipSelect(_) => assert!(!locked, "chip select toggled under lock"),
                Event::DelayUs(10) => assert!(!locked, "settle delay under lock"),
                _ => {}
            }
        }
    }

    #[test]
    fn data_out_parked_low_after_frame() {
        let (mut spi, board) = make_spi();
        spi.write_register(0x02, 0xFF)
            .expect("write_register should succeed");

        let last_mosi = board
            .borrow()
            .events
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::DataOut(level) => Some(*level),
                _ => None,
            });
        assert_eq!(last_mosi, Some(false));
    }

    #[test]
    fn burst_write_keeps_one_frame() {
        let (mut spi, board) = make_spi();
        spi.write_registers(0x12, &[0x01, 0x02, 0x03])
            .expect("write_registers should succeed");

        let events = board.borrow().events.clone();
        let selects = events
            .iter()
            .filter(|e| **e == Event::ChipSelect(false))
            .count();
        assert_eq!(selects, 1);
        assert_eq!(mosi_bytes(&events), vec![0x12, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn burst_read_resends_address() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().queue_byte(0x00);
        for byte in [0x11, 0x22, 0x33] {
            board.borrow_mut().queue_byte(byte);
        }

        let mut buf = [0u8; 3];
        spi.read_registers(0x12, &mut buf)
            .expect("read_registers should succeed");

        assert_eq!(buf, [0x11, 0x22, 0x33]);
        assert_eq!(
            mosi_bytes(&board.borrow().events),
            vec![0x92, 0x92, 0x92, 0x00]
        );
    }

    #[test]
    fn empty_burst_read_is_silent() {
        let (mut spi, board) = make_spi();
        spi.read_registers(0x12, &mut [])
            .expect("read_registers should succeed");
        assert!(board.borrow().events.is_empty());
    }
}

// ============================================================================
// Fault injection: chip select must always come back high
// ============================================================================

mod fault_tests {
    use super::*;

    #[test]
    fn clock_fault_mid_write_releases_chip_select() {
        for nth in [1, 5, 16, 17, 32] {
            let (mut spi, board) = make_spi();
            board.borrow_mut().fault = Some((Line::Clock, nth));

            let err = spi.write_register(0x02, 0x0F).unwrap_err();
            assert!(matches!(err, Error::Pin { line: Line::Clock, .. }));
            assert!(board.borrow().cs_level, "CS left asserted (fault at {nth})");
        }
    }

    #[test]
    fn data_out_fault_mid_write_releases_chip_select() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().fault = Some((Line::DataOut, 9));

        let err = spi.write_register(0x02, 0x0F).unwrap_err();
        assert!(matches!(err, Error::Pin { line: Line::DataOut, .. }));
        assert!(board.borrow().cs_level);
    }

    #[test]
    fn data_in_fault_mid_read_releases_chip_select() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().fault = Some((Line::DataIn, 12));

        let err = spi.read_register(0x6E).unwrap_err();
        assert!(matches!(err, Error::Pin { line: Line::DataIn, .. }));
        assert!(board.borrow().cs_level);
    }

    #[test]
    fn failed_assert_still_drives_release() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().fault = Some((Line::ChipSelect, 1));

        let err = spi.write_register(0x02, 0x0F).unwrap_err();
        assert!(matches!(err, Error::Pin { line: Line::ChipSelect, .. }));
        assert!(clock_edges(&board.borrow().events).is_empty());
        assert_eq!(
            board.borrow().events.first(),
            Some(&Event::ChipSelect(true))
        );
    }

    #[test]
    fn stats_count_faults() {
        let (mut spi, board) = make_spi();
        spi.write_register(0x02, 0x0F)
            .expect("write_register should succeed");
        board.borrow_mut().fault = Some((Line::Clock, 40));
        let _ = spi.write_register(0x02, 0x0F);

        let stats = spi.stats();
        assert_eq!(stats.transactions, 2);
        assert_eq!(stats.pin_faults, 1);
        assert!(stats.bytes >= 3);

        spi.reset_stats();
        assert_eq!(spi.stats().transactions, 0);
    }

    #[test]
    fn pin_panic_mid_frame_releases_chip_select() {
        for (line, nth) in [(Line::Clock, 1), (Line::Clock, 5), (Line::Clock, 16), (Line::DataOut, 9)] {
            let (mut spi, board) = make_spi();
            board.borrow_mut().panic_on = Some((line, nth));

            let outcome = catch_unwind(AssertUnwindSafe(|| spi.write_register(0x02, 0x0F)));

            assert!(outcome.is_err(), "{line} write {nth} should have panicked");
            let board = board.borrow();
            assert!(board.cs_level, "CS left asserted ({line} panic at {nth})");
            let last_data_out = board.events.iter().rev().find_map(|e| match e {
                Event::DataOut(level) => Some(*level),
                _ => None,
            });
            assert_eq!(last_data_out, Some(false), "data out not parked");
            let acquires = board.events.iter().filter(|e| **e == Event::LockAcquire).count();
            let releases = board.events.iter().filter(|e| **e == Event::LockRelease).count();
            assert_eq!(acquires, releases, "lock left held");
        }
    }

    #[test]
    fn link_usable_after_pin_panic() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().panic_on = Some((Line::Clock, 3));
        let _ = catch_unwind(AssertUnwindSafe(|| spi.write_register(0x02, 0x0F)));

        board.borrow_mut().events.clear();
        spi.write_register(0x02, 0x0F)
            .expect("write after a caught panic should succeed");

        let events = board.borrow().events.clone();
        assert_eq!(mosi_bytes(&events), vec![0x02, 0x0F]);
        assert_eq!(events.first(), Some(&Event::ChipSelect(false)));
        assert_eq!(events.iter().filter(|e| **e == Event::ChipSelect(true)).count(), 1);
        assert_eq!(spi.stats().pin_faults, 0);
    }
}

// ============================================================================
// embedded-hal SpiDevice
// ============================================================================

mod spi_device_tests {
    use super::*;

    #[test]
    fn transaction_frames_all_operations() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().queue_byte(0x00);
        board.borrow_mut().queue_byte(0x91);

        let mut rx = [0u8; 1];
        spi.transaction(&mut [Operation::Write(&[0xEE]), Operation::Read(&mut rx)])
            .expect("transaction should succeed");

        assert_eq!(rx, [0x91]);
        let events = board.borrow().events.clone();
        let selects = events
            .iter()
            .filter(|e| **e == Event::ChipSelect(false))
            .count();
        assert_eq!(selects, 1);
        assert_eq!(mosi_bytes(&events), vec![0xEE, 0x00]);
        assert!(board.borrow().cs_level);
    }

    #[test]
    fn transfer_pads_short_write() {
        let (mut spi, board) = make_spi();
        board.borrow_mut().queue_byte(0x01);
        board.borrow_mut().queue_byte(0x02);

        let mut rx = [0u8; 2];
        spi.transfer(&mut rx, &[0xAB]).expect("transfer should succeed");

        assert_eq!(rx, [0x01, 0x02]);
        assert_eq!(mosi_bytes(&board.borrow().events), vec![0xAB, 0x00]);
    }
}
