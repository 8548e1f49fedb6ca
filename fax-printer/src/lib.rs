//! # fax-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - CP437 text encoding
//! - Monochrome bitmaps and line-graphics packing
//! - ESC/POS command building
//! - Paced writes to a character device
//!
//! Deciding WHAT to print (fax layout, help page) stays in `fax-station`.
//!
//! ## Example
//!
//! ```ignore
//! use fax_printer::{DevicePrinter, EscPosBuilder, Printer, mode};
//!
//! let mut builder = EscPosBuilder::new(32);
//! builder.mode(mode::DOUBLE_SIZE);
//! builder.line("Hello");
//! builder.normal();
//! builder.line("Città");
//!
//! let printer = DevicePrinter::default();
//! printer.print(&builder.build(), true).await?;
//! ```

mod bitmap;
mod encoding;
mod error;
mod escpos;
mod printer;

// Re-exports
pub use bitmap::{BitOrder, LUMA_THRESHOLD, PixelBitmap, PrinterProfile, encode_bitmap, pack_row};
pub use encoding::{PLACEHOLDER, encode_text, text_width};
pub use error::{PrintError, PrintResult};
pub use escpos::{EscPosBuilder, mode};
pub use printer::{DevicePrinter, FEED_PAST_CUTTER, MemoryPrinter, Printer};
