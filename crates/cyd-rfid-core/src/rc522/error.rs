use core::fmt;

/// Error type for card exchanges, generic over bus errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiccError<E: fmt::Debug> {
    /// Register bus error.
    Bus(E),
    /// No answer before the reader's timer or the poll budget ran out.
    Timeout,
    /// Two or more cards answered at once.
    Collision,
    /// `ERROR` reported a buffer overflow, parity or protocol error.
    Protocol(u8),
    /// The answer did not fit the caller's buffer.
    NoRoom { received: usize, capacity: usize },
    /// The answer had the wrong length or framing for the command.
    BadResponse,
    /// UID check byte did not match the four bytes before it.
    BccMismatch,
    /// The CRC coprocessor did not finish.
    CrcTimeout,
    /// SAK still asked for another cascade level after level 3.
    CascadeTooDeep,
}

impl<E: fmt::Debug> From<E> for PiccError<E> {
    fn from(e: E) -> Self {
        PiccError::Bus(e)
    }
}

impl<E: fmt::Debug> PiccError<E> {
    /// Timeout means "nothing in the field", not a fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PiccError::Timeout)
    }
}

impl<E: fmt::Debug + fmt::Display> fmt::Display for PiccError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PiccError::Bus(e) => write!(f, "bus error: {e}"),
            PiccError::Timeout => f.write_str("no card answered"),
            PiccError::Collision => f.write_str("card collision"),
            PiccError::Protocol(bits) => write!(f, "protocol error (ERROR=0x{bits:02X})"),
            PiccError::NoRoom { received, capacity } => {
                write!(f, "answer of {received} bytes exceeds {capacity}-byte buffer")
            }
            PiccError::BadResponse => f.write_str("malformed card answer"),
            PiccError::BccMismatch => f.write_str("UID check byte mismatch"),
            PiccError::CrcTimeout => f.write_str("CRC coprocessor timeout"),
            PiccError::CascadeTooDeep => f.write_str("UID longer than three cascade levels"),
        }
    }
}
