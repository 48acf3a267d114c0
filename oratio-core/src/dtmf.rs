//! Keypress decoding.
//!
//! Channel transports report keypresses as raw integer codes — the ASCII
//! value of the key for the twelve standard DTMF keys. Anything else is
//! not a digit and must not be collected, so callers can tell "no input"
//! apart from "invalid input".

/// Decode a raw keypress code into its canonical digit character
/// (`0`–`9`, `*`, `#`). Unknown codes return `None`.
pub fn decode(code: i64) -> Option<char> {
    match code {
        35 => Some('#'),
        42 => Some('*'),
        48..=57 => Some((code as u8) as char),
        _ => None,
    }
}
