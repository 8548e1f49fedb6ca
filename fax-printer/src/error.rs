//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Device could not be opened or written
    #[error("Device error: {0}")]
    Device(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bitmap does not fit the printer's line-graphics format
    #[error("Unsupported image: {width}px wide (max {max_width}, must be a multiple of 8)")]
    UnsupportedImage { width: u32, max_width: u32 },

    /// Picture bytes could not be decoded into pixels
    #[error("Image decode error: {0}")]
    ImageDecode(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
