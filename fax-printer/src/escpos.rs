//! ESC/POS command builder
//!
//! Provides a fluent API for building print data for the fax printer.

use crate::bitmap::{PixelBitmap, PrinterProfile, encode_bitmap};
use crate::encoding::{encode_text, text_width};
use crate::error::PrintResult;

/// Print mode bits for `ESC ! n`
pub mod mode {
    /// Font A, single height
    pub const NORMAL: u8 = 0x00;
    /// Font mode used ahead of line graphics
    pub const GRAPHICS: u8 = 0x03;
    pub const DOUBLE_HEIGHT: u8 = 0x10;
    /// Double height and double width
    pub const DOUBLE_SIZE: u8 = 0x30;
    pub const UNDERLINE: u8 = 0x80;
}

/// ESC/POS command builder
///
/// Text is encoded to CP437 as it is appended; commands go in verbatim.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// 58mm paper with font A: 32 characters
    pub fn new(width: usize) -> Self {
        Self {
            buf: Vec::with_capacity(1024),
            width,
        }
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    // === Text Output ===

    /// Write text (CP437 encoded)
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend(encode_text(s));
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    // === Print Mode ===

    /// Select print mode (`ESC ! n`), see [`mode`]
    pub fn mode(&mut self, n: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x21, n]);
        self
    }

    /// Back to font A, single height
    pub fn normal(&mut self) -> &mut Self {
        self.mode(mode::NORMAL)
    }

    // === Separators ===

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Layout Helpers ===

    /// Print left and right text on the same line
    ///
    /// Left text is left-aligned, right text is right-aligned,
    /// with spaces filling the gap.
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let lw = text_width(left);
        let rw = text_width(right);

        if lw + rw >= self.width {
            // Too long, just print with space
            self.text(left);
            self.text(" ");
            self.line(right);
        } else {
            let spaces = self.width - lw - rw;
            self.text(left);
            self.text(&" ".repeat(spaces));
            self.line(right);
        }
        self
    }

    // === Graphics ===

    /// Append a bitmap as line graphics
    pub fn bitmap(&mut self, bitmap: &PixelBitmap, profile: &PrinterProfile) -> PrintResult<&mut Self> {
        let data = encode_bitmap(bitmap, profile)?;
        self.buf.extend_from_slice(&data);
        Ok(self)
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Reset printer to default state
    pub fn reset(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x40]);
        self
    }

    // === Build ===

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(32)
    }
}
