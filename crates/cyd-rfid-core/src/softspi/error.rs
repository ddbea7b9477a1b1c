use core::fmt;

use embedded_hal::digital;

/// One of the four soft SPI lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Clock,
    DataOut,
    DataIn,
    ChipSelect,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Line::Clock => "SCK",
            Line::DataOut => "MOSI",
            Line::DataIn => "MISO",
            Line::ChipSelect => "SS",
        };
        f.write_str(name)
    }
}

/// Error type for soft SPI operations.
///
/// Only the GPIO layer can fail. A wrong byte on the wire is not an error at
/// this level; callers judge the data they get back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A GPIO driver rejected a read or write on the given line.
    Pin { line: Line, kind: digital::ErrorKind },
}

impl Error {
    pub(crate) fn pin<E: digital::Error>(line: Line, err: E) -> Self {
        Error::Pin {
            line,
            kind: err.kind(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Pin { line, kind } => write!(f, "{line} pin fault: {kind}"),
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}
