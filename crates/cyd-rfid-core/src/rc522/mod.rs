pub mod driver;
pub mod error;
pub mod identify;
pub mod ndef;
pub mod picc;
pub mod registers;

pub use driver::{LinkState, Rc522};
pub use error::PiccError;
pub use identify::{ChipVersion, Identification};
pub use picc::{Received, ScanStats, Uid};
