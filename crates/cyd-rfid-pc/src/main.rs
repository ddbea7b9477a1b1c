//! Bring-up harness for the CYD RFID link.
//!
//! Runs the same bring-up the firmware runs at boot against a simulated reader
//! with an NTAG in its field, then against wires with nothing attached, and
//! logs what a serial console would show.

use cyd_rfid_core::softspi::GlobalLock;
use cyd_rfid_core::{LogSink, Rc522, SoftSpi, Timing};
use cyd_rfid_pc::{Card, HostDelay, SimBoard};

const DEMO_UID: [u8; 7] = [0x04, 0xA2, 0x3C, 0x5A, 0x9F, 0x61, 0x80];

fn bring_up(label: &str, board: &SimBoard, timing: Timing) -> Result<(), cyd_rfid_core::Error> {
    log::info!("{label}: bringing up with {:?}", timing);
    let spi = SoftSpi::new(board.pins(), HostDelay, GlobalLock, timing)?;
    let mut reader = Rc522::new(spi, HostDelay, timing);

    let mut sink = LogSink;
    reader.reset_and_identify(&mut sink)?;

    let id = reader.init()?;
    if !id.is_link_fault() {
        reader.antenna_on()?;
        match reader.calculate_crc(&[0x50, 0x00])? {
            Some([low, high]) => log::info!("{label}: CRC_A(50 00) = {low:02X} {high:02X}"),
            None => log::warn!("{label}: CRC coprocessor timed out"),
        }
        reader.antenna_off()?;

        match reader.detect_card() {
            Ok(uid) => {
                match reader.read_ndef_text(&uid) {
                    Ok(Some(text)) => log::info!("{label}: card {uid} says '{text}'"),
                    Ok(None) => log::info!("{label}: card {uid} has no text record"),
                    Err(e) => log::warn!("{label}: NDEF read failed: {e}"),
                }
                if let Err(e) = reader.end_scan() {
                    log::warn!("{label}: halt failed: {e}");
                }
            }
            Err(e) if e.is_timeout() => log::info!("{label}: no card in field"),
            Err(e) => log::warn!("{label}: scan failed: {e}"),
        }
        let scans = reader.scan_stats();
        log::info!(
            "{label}: {} scans, {} ok, {} failed",
            scans.total_scans,
            scans.successful_scans,
            scans.failed_scans
        );
    }

    let stats = reader.bus().stats();
    log::info!(
        "{label}: {} frames, {} bytes, {} pin faults",
        stats.transactions,
        stats.bytes,
        stats.pin_faults
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("cyd-rfid-pc: host bring-up harness starting");

    let timing = Timing::CYD;
    if let Err(e) = timing.validate() {
        log::error!("invalid timing: {e}");
        return;
    }

    let with_card = SimBoard::with_reader();
    if with_card
        .place_card(Card::ntag213_with_text(DEMO_UID, "hello from the field"))
        .is_err()
    {
        log::error!("simulated field is full");
        return;
    }

    let runs = [
        ("reader", with_card),
        ("no reader, MISO pulled up", SimBoard::disconnected(true)),
        ("no reader, MISO pulled down", SimBoard::disconnected(false)),
    ];
    for (label, board) in &runs {
        if let Err(e) = bring_up(label, board, timing) {
            log::error!("{label}: link error: {e}");
        }
    }
}
