//! Simulated CYD wiring: four GPIO lines between the bit engine and a
//! simulated reader.
//!
//! Pins share one [`Board`] through `Rc<RefCell<..>>`, so a clock edge
//! driven through the SCK pin reaches the reader model immediately.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use cyd_rfid_core::softspi::SoftSpiPins;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::card::Card;
use crate::sim::Mfrc522Sim;

/// What sits at the far end of the wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attached {
    /// A powered reader.
    Reader,
    /// Nothing answers; MISO floats to the given level.
    Floating { pulled_high: bool },
}

/// Line levels plus the reader model.
pub struct Board {
    pub reader: Mfrc522Sim,
    pub attached: Attached,
    sck: bool,
    mosi: bool,
    cs: bool,
    /// Rising SCK edges seen, selected or not.
    pub clock_edges: u32,
}

impl Board {
    fn new(attached: Attached) -> Self {
        Self {
            reader: Mfrc522Sim::new(),
            attached,
            sck: false,
            mosi: false,
            cs: true,
            clock_edges: 0,
        }
    }

    fn connected(&self) -> bool {
        self.attached == Attached::Reader
    }

    pub fn cs_level(&self) -> bool {
        self.cs
    }

    pub fn mosi_level(&self) -> bool {
        self.mosi
    }

    fn drive(&mut self, wire: Wire, high: bool) {
        match wire {
            Wire::Sck => {
                let was = self.sck;
                self.sck = high;
                if !was && high {
                    self.clock_edges += 1;
                    if self.connected() {
                        self.reader.rising_edge(self.mosi);
                    }
                } else if was && !high && self.connected() {
                    self.reader.falling_edge();
                }
            }
            Wire::Mosi => self.mosi = high,
            Wire::Cs => {
                self.cs = high;
                if self.connected() {
                    self.reader.chip_select(!high);
                }
            }
            Wire::Miso => {}
        }
    }

    fn sample_miso(&self) -> bool {
        match self.attached {
            Attached::Reader => self.reader.miso().unwrap_or(true),
            Attached::Floating { pulled_high } => pulled_high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    Sck,
    Mosi,
    Miso,
    Cs,
}

/// One simulated GPIO.
#[derive(Clone)]
pub struct SimPin {
    wire: Wire,
    board: Rc<RefCell<Board>>,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.board.borrow_mut().drive(self.wire, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.board.borrow_mut().drive(self.wire, true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.board.borrow().sample_miso())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub type SimPins = SoftSpiPins<SimPin, SimPin, SimPin, SimPin>;

/// Handle to a simulated board.
#[derive(Clone)]
pub struct SimBoard {
    board: Rc<RefCell<Board>>,
}

impl SimBoard {
    pub fn with_reader() -> Self {
        Self::new(Attached::Reader)
    }

    /// No reader on the wires. A pulled-up MISO reads 0xFF, a pulled-down
    /// one 0x00.
    pub fn disconnected(pulled_high: bool) -> Self {
        Self::new(Attached::Floating { pulled_high })
    }

    fn new(attached: Attached) -> Self {
        Self {
            board: Rc::new(RefCell::new(Board::new(attached))),
        }
    }

    fn pin(&self, wire: Wire) -> SimPin {
        SimPin {
            wire,
            board: Rc::clone(&self.board),
        }
    }

    /// The four link lines in SCK, MOSI, MISO, SS order.
    pub fn pins(&self) -> SimPins {
        SoftSpiPins::new(
            self.pin(Wire::Sck),
            self.pin(Wire::Mosi),
            self.pin(Wire::Miso),
            self.pin(Wire::Cs),
        )
    }

    /// Hold `card` over the reader's antenna.
    pub fn place_card(&self, card: Card) -> Result<(), Card> {
        self.with(|board| board.reader.chip.insert_card(card))
    }

    pub fn remove_cards(&self) {
        self.with(|board| board.reader.chip.remove_cards());
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Board) -> R) -> R {
        f(&mut self.board.borrow_mut())
    }
}

/// Delay that returns immediately. The simulated reader has no timing
/// requirements.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantDelay;

impl DelayNs for InstantDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Wall-clock delay for running the bring-up sequence at board speed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}
