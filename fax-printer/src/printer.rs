//! Printer sinks for sending ESC/POS data
//!
//! Supports:
//! - Character devices (USB line printer, `/dev/usb/lp0`)
//! - In-memory capture

use crate::error::{PrintError, PrintResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Blank lines that move the last printed line past the tear-off edge
pub const FEED_PAST_CUTTER: &[u8] = b"\n\n\n\n";

/// Trait for printer sinks
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw ESC/POS data to the printer
    async fn write(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is present
    async fn is_online(&self) -> bool;

    /// Feed enough paper that tearing off does not clip content
    async fn feed_past_cutter(&self) -> PrintResult<()> {
        self.write(FEED_PAST_CUTTER).await
    }

    /// Print a block: data, a closing newline, optionally the cutter feed
    async fn print(&self, data: &[u8], feed_past_cutter: bool) -> PrintResult<()> {
        self.write(data).await?;
        self.write(b"\n").await?;
        if feed_past_cutter {
            self.feed_past_cutter().await?;
        }
        Ok(())
    }
}

/// Printer behind a character device
///
/// The device exposes no flow control, so writes are split into bounded
/// chunks with a pause after each one to avoid overrunning its buffer.
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    path: PathBuf,
    chunk_size: usize,
    pacing: Duration,
}

impl DevicePrinter {
    /// Default kernel device for the first USB line printer
    pub const DEFAULT_PATH: &'static str = "/dev/usb/lp0";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: 1024,
            pacing: Duration::from_millis(100),
        }
    }

    /// Set chunk size (bytes per write call)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the pause after each chunk
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Get the device path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for DevicePrinter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

impl Printer for DevicePrinter {
    #[instrument(skip(self, data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn write(&self, data: &[u8]) -> PrintResult<()> {
        // Never create: a missing device must not turn into a regular file
        let mut device = OpenOptions::new()
            .write(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PrintError::Device(format!("{}: {}", self.path.display(), e)))?;

        for chunk in data.chunks(self.chunk_size) {
            device
                .write_all(chunk)
                .await
                .map_err(|e| PrintError::Device(format!("Write failed: {}", e)))?;
            device
                .flush()
                .await
                .map_err(|e| PrintError::Device(format!("Flush failed: {}", e)))?;
            tokio::time::sleep(self.pacing).await;
        }

        debug!("Device write complete");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Printer device missing");
                false
            }
        }
    }
}

/// Printer that records every write in memory
///
/// Cloning shares the capture buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrinter {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    writes: Vec<Vec<u8>>,
    offline: bool,
}

impl MemoryPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with a device error
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Each `write` call in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().writes.clone()
    }

    /// Everything written so far, concatenated
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().writes.concat()
    }

    pub fn clear(&self) {
        self.inner.lock().writes.clear();
    }
}

impl Printer for MemoryPrinter {
    async fn write(&self, data: &[u8]) -> PrintResult<()> {
        let mut state = self.inner.lock();
        if state.offline {
            return Err(PrintError::Device("memory printer offline".to_string()));
        }
        state.writes.push(data.to_vec());
        Ok(())
    }

    async fn is_online(&self) -> bool {
        !self.inner.lock().offline
    }
}
