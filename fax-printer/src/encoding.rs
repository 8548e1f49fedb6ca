//! Code page 437 text encoding
//!
//! The printer has no Unicode support; its character generator uses the
//! original IBM PC code page. Control characters (LF, ESC, ...) map to
//! themselves so the output can be mixed freely with ESC/POS commands.

use codepage_437::CP437_CONTROL;

/// Byte printed for code points CP437 cannot represent (■)
pub const PLACEHOLDER: u8 = 0xFE;

/// Encode a Unicode string for the printer
///
/// Total and deterministic: every `char` yields exactly one byte, with
/// [`PLACEHOLDER`] standing in for anything outside the code page.
pub fn encode_text(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| CP437_CONTROL.encode(c).unwrap_or(PLACEHOLDER))
        .collect()
}

/// Printed width of a string in columns (one byte per char after encoding)
pub fn text_width(s: &str) -> usize {
    s.chars().count()
}
