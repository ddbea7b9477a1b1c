//! Software SPI link and MFRC522 driver for the ESP32 "Cheap Yellow Display".
//!
//! On the CYD the reader's natural SPI pins belong to the display, so the
//! reader is bit-banged on spare GPIOs. Layers, bottom up:
//!
//! - [`softspi`]: pins, critical-section guard, bit engine, register framing
//! - [`rc522`]: register map, identification, chip bring-up, card scans
//! - [`config`]: link timing
//!
//! Everything is generic over `embedded-hal` 1.0 traits and the
//! `cyd-rfid-hal` platform traits, so it runs against simulated lines on a
//! host.

#![no_std]

pub mod config;
pub mod diag;
pub mod rc522;
pub mod softspi;

pub use config::Timing;
pub use diag::LogSink;
pub use rc522::{Identification, LinkState, PiccError, Rc522, ScanStats, Uid};
pub use softspi::{Error, SoftSpi, SoftSpiPins};
