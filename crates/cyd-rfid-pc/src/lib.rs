//! Host-side harness for the CYD RFID link.
//!
//! Runs the real bit engine and driver against simulated GPIO lines and a
//! behavioural MFRC522, so the link can be exercised without hardware.

pub mod board;
pub mod card;
pub mod sim;

pub use board::{HostDelay, InstantDelay, SimBoard, SimPins};
pub use card::Card;
pub use sim::{Mfrc522Sim, SIM_VERSION};
