//! Best-effort text extraction from opaque post-handshake traffic.
//!
//! No real netchannel decoder exists here (sequencing, fragmentation and
//! delta compression are out of scope), so this module only scans raw
//! payload bytes for printable runs that look like chat. Display-only:
//! false positives and negatives are expected and acceptable, and nothing
//! else may rely on its output. A future netchannel implementation can
//! replace this without touching the handshake state machine.

/// Sequence/acknowledgement pair prefixed to netchannel payloads.
const NETCHANNEL_HEADER_LEN: usize = 8;

/// Minimum cleaned length before a payload is worth surfacing.
const MIN_TEXT_LEN: usize = 5;

/// Cap on surfaced text; netchannel frames can carry kilobytes of noise.
const MAX_TEXT_LEN: usize = 100;

/// Markers that make a printable run look like chat or console output.
const CHAT_MARKERS: [&str; 3] = ["Console", " : ", "SayText"];

/// Scans a raw inbound payload for chat-like text. Strips the fixed
/// netchannel header when present, then keeps printable ASCII only (this
/// also drops the GoldSrc chat color control bytes 0x01/0x03/0x04).
pub fn extract_chat_text(payload: &[u8]) -> Option<String> {
    let body = if payload.len() > NETCHANNEL_HEADER_LEN {
        &payload[NETCHANNEL_HEADER_LEN..]
    } else {
        payload
    };

    let mut text: String = body
        .iter()
        .filter(|&&b| (32..=126).contains(&b))
        .map(|&b| b as char)
        .collect();

    if text.len() <= MIN_TEXT_LEN {
        return None;
    }
    if !CHAT_MARKERS.iter().any(|marker| text.contains(marker)) {
        return None;
    }

    text.truncate(MAX_TEXT_LEN);
    Some(text)
}
