#![no_std]

/// Abstracts register access to the reader chip over any link.
///
/// Implementations own chip-select framing: every call is one complete
/// transaction, and chip-select is released before the call returns.
pub trait RegisterBus {
    type Error: core::fmt::Debug;

    /// Write one byte to a register.
    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Self::Error>;

    /// Read one byte from a register.
    fn read_register(&mut self, address: u8) -> Result<u8, Self::Error>;

    /// Write several bytes to the same register (FIFO bursts).
    ///
    /// The default issues one transaction per byte; links that can keep
    /// chip-select asserted across the burst should override it.
    fn write_registers(&mut self, address: u8, values: &[u8]) -> Result<(), Self::Error> {
        for &value in values {
            self.write_register(address, value)?;
        }
        Ok(())
    }

    /// Read several bytes from the same register (FIFO drains).
    fn read_registers(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        for slot in buf.iter_mut() {
            *slot = self.read_register(address)?;
        }
        Ok(())
    }
}

/// Abstracts the CPU's interrupt-preemption window.
///
/// The soft SPI engine holds this for exactly one byte transfer so that a
/// timer interrupt or a task switch cannot stretch a bit's dwell time.
/// Implementations must tolerate `release` being called from a `Drop` impl.
pub trait InterruptLock {
    /// Token captured on entry and handed back on exit (e.g. the saved
    /// interrupt mask).
    type State;

    /// Enter the exclusive region.
    fn acquire(&mut self) -> Self::State;

    /// Leave the exclusive region, restoring the state captured by `acquire`.
    fn release(&mut self, state: Self::State);
}

/// Lock that does nothing. For hosts and simulators where nothing can
/// preempt the bit engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoLock;

impl InterruptLock for NoLock {
    type State = ();

    fn acquire(&mut self) {}

    fn release(&mut self, _state: ()) {}
}

/// Human-readable result channel for diagnostic checks.
///
/// Bring-up sketches print their findings to a serial console; this is that
/// console with the transport left to the platform.
pub trait DiagnosticSink {
    /// Emit one line. The line carries no trailing newline.
    fn print_result(&mut self, line: core::fmt::Arguments<'_>);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn print_result(&mut self, line: core::fmt::Arguments<'_>) {
        (**self).print_result(line)
    }
}
