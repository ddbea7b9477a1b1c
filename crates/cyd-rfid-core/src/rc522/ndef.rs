//! NDEF text record extraction from NTAG user memory.
//!
//! Works on two 16-byte READ answers: pages 3..=6 (capability container
//! then the start of the TLV area) and pages 7..=10.

use heapless::{String, Vec};

/// Longest NDEF message and text this reader extracts.
pub const TEXT_CAPACITY: usize = 32;

const TLV_NULL: u8 = 0x00;
const TLV_LOCK_CONTROL: u8 = 0x01;
const TLV_NDEF: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;

/// MB, ME and SR set, TNF well-known.
const RECORD_HEADER_SHORT_WELL_KNOWN: u8 = 0xD0;
const RECORD_TYPE_TEXT: u8 = b'T';
/// Status byte: IANA language code length.
const LANG_LEN_MASK: u8 = 0x3F;
/// Five fixed bytes, one language byte, one text byte.
const MIN_TEXT_RECORD: usize = 7;

/// Locate the NDEF message TLV in the first block. Returns `(length, start)`.
fn find_ndef_tlv(block: &[u8; 16]) -> Option<(usize, usize)> {
    // The TLV area starts after the capability container (page 3).
    let mut i = 4;
    while i < 12 {
        match block[i] {
            TLV_NULL => i += 1,
            TLV_TERMINATOR => return None,
            TLV_LOCK_CONTROL => i += 2 + usize::from(block[i + 1]),
            TLV_NDEF => return Some((usize::from(block[i + 1]), i + 2)),
            _ => i += 1,
        }
    }
    None
}

/// Text of a single short well-known `T` record, or `None`.
///
/// The message is capped at [`TEXT_CAPACITY`] bytes; longer text is cut at
/// the cap. Text that is not valid UTF-8 is rejected.
pub fn text_from_pages(first: &[u8; 16], second: &[u8; 16]) -> Option<String<TEXT_CAPACITY>> {
    let (length, start) = find_ndef_tlv(first)?;
    if length == 0 {
        return None;
    }

    let message: Vec<u8, TEXT_CAPACITY> = first[start..]
        .iter()
        .chain(second.iter())
        .copied()
        .take(length.min(TEXT_CAPACITY))
        .collect();

    if length < MIN_TEXT_RECORD || message.len() < 5 {
        return None;
    }
    if message[0] & 0xF0 != RECORD_HEADER_SHORT_WELL_KNOWN
        || message[1] != 1
        || message[3] != RECORD_TYPE_TEXT
    {
        return None;
    }

    let payload_len = usize::from(message[2]);
    let lang_len = usize::from(message[4] & LANG_LEN_MASK);
    let text_start = (5 + lang_len).min(message.len());
    let text_len = payload_len.saturating_sub(1 + lang_len);
    let text_end = (text_start + text_len).min(message.len());

    let text = core::str::from_utf8(&message[text_start..text_end]).ok()?;
    let mut out = String::new();
    out.push_str(text).ok()?;
    Some(out)
}
