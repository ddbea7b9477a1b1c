pub mod engine;
mod error;
pub mod guard;
pub mod pins;
pub mod register;

pub use engine::{LinkStats, SoftSpi};
pub use error::{Error, Line};
pub use guard::{GlobalLock, LockGuard};
pub use pins::SoftSpiPins;
pub use register::{address_byte, Direction, READ_BIT};
