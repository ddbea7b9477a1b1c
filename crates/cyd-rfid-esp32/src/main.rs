//! CYD RFID firmware.
//!
//! Brings the MFRC522 up over the bit-banged link, then scans for cards on a
//! fixed period. When a scan fails and the version register reads as a link
//! fault, identification runs again so wiring can be checked live from the
//! serial console.

mod board;

use anyhow::Context;
use cyd_rfid_core::softspi::GlobalLock;
use cyd_rfid_core::{Identification, LogSink, Rc522, SoftSpi, Timing};
use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::peripherals::Peripherals;

/// Pause between scans.
const SCAN_PERIOD_MS: u32 = 2000;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("cyd-rfid-esp32: RFID link bring-up");

    let timing = Timing::CYD;
    timing
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid link timing: {e}"))?;

    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let pins = board::reader_pins(peripherals.pins).context("claiming reader pins")?;

    // Ets busy-waits; the bit engine needs microsecond dwell times.
    let spi = SoftSpi::new(pins, Ets, GlobalLock, timing)
        .map_err(|e| anyhow::anyhow!("link setup: {e}"))?;
    let mut reader = Rc522::new(spi, Ets, timing);
    let mut sink = LogSink;

    match reader.init() {
        Ok(Identification::Known(chip)) => log::info!("reader ready: {chip}"),
        Ok(id) => log::warn!("reader not ready: {id:?}"),
        Err(e) => log::error!("init failed: {e}"),
    }

    loop {
        match reader.detect_card() {
            Ok(uid) => {
                match reader.read_ndef_text(&uid) {
                    Ok(Some(text)) => log::info!("card {uid}: '{text}'"),
                    Ok(None) => log::info!("card {uid}"),
                    Err(e) => log::warn!("card {uid}: NDEF read failed: {e}"),
                }
                if let Err(e) = reader.end_scan() {
                    log::warn!("halt failed: {e}");
                }
            }
            Err(e) => {
                if !e.is_timeout() {
                    log::warn!("scan failed: {e}");
                }
                // A floating MISO looks like a quiet field or a collision;
                // the version register tells them apart.
                match reader.version() {
                    Ok(version) if Identification::from_version(version).is_link_fault() => {
                        log::warn!("reader not answering, re-running identification");
                        match reader.reset_and_identify(&mut sink) {
                            Ok(version) if !Identification::from_version(version).is_link_fault() => {
                                if let Err(e) = reader.init() {
                                    log::error!("re-init failed: {e}");
                                }
                            }
                            Ok(_) => log::warn!("no reader on the link, retrying in {SCAN_PERIOD_MS} ms"),
                            Err(e) => log::error!("identification failed: {e}"),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("version read failed: {e}"),
                }
            }
        }

        let stats = reader.bus().stats();
        let scans = reader.scan_stats();
        log::debug!(
            "link: {} frames, {} pin faults; scans: {} ok, {} failed",
            stats.transactions,
            stats.pin_faults,
            scans.successful_scans,
            scans.failed_scans
        );
        FreeRtos::delay_ms(SCAN_PERIOD_MS);
    }
}
