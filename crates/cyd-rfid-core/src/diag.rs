//! Diagnostic sinks.

use cyd_rfid_hal::DiagnosticSink;

/// Forwards identification results to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn print_result(&mut self, line: core::fmt::Arguments<'_>) {
        log::info!("{line}");
    }
}
