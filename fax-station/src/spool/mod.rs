//! Durable print spool
//!
//! One file per pending fax, named by a fixed-width hex key so that the
//! lexicographic order of file names is the arrival order. Entries become
//! visible atomically: bytes go to a dot-prefixed temp file, are synced,
//! then renamed into place, and the directory itself is synced.
//!
//! The transport client is the only writer; the scheduler reads and
//! deletes. Nothing else touches the directory.

use parking_lot::Mutex;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

const TMP_PREFIX: &str = ".tmp-";
const REJECTED_DIR: &str = "rejected";
const KEY_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("Spool IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spool entry not found: {0}")]
    NotFound(EntryId),

    #[error("{} does not exist or is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("No spool key left after {0}")]
    KeysExhausted(EntryId),
}

pub type SpoolResult<T> = Result<T, SpoolError>;

/// Spool key: nanoseconds since the Unix epoch at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(key: u64) -> Self {
        Self(key)
    }

    pub fn key(&self) -> u64 {
        self.0
    }

    /// File name for this entry
    pub fn file_name(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a spool file name; anything else in the directory is ignored
    pub fn parse(name: &str) -> Option<Self> {
        if name.len() != KEY_LEN || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(name, 16).ok().map(Self)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// File-backed, order-preserving queue of pending faxes
#[derive(Debug)]
pub struct Spool {
    dir: PathBuf,
    last_key: Mutex<u64>,
}

impl Spool {
    /// Open an existing spool directory
    ///
    /// Leftover temp files from an interrupted write are discarded: they
    /// were never acknowledged upstream, so the broker will redeliver.
    pub async fn open(dir: impl Into<PathBuf>) -> SpoolResult<Self> {
        let dir = dir.into();
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(SpoolError::NotADirectory(dir)),
        }

        let mut last_key = 0;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(TMP_PREFIX) {
                warn!(file = %name, "Removing incomplete spool write");
                fs::remove_file(entry.path()).await?;
            } else if let Some(id) = EntryId::parse(name) {
                last_key = last_key.max(id.key());
            }
        }

        let spool = Self {
            dir,
            last_key: Mutex::new(last_key),
        };
        info!(dir = %spool.dir.display(), pending = spool.list_pending().await?.len(), "Spool opened");
        Ok(spool)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably store a payload and return its key
    ///
    /// On success the entry is on stable storage; on error the caller must
    /// assume it does not exist.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn enqueue(&self, payload: &[u8]) -> SpoolResult<EntryId> {
        let id = self.next_id()?;
        let tmp_path = self.dir.join(format!("{}{}", TMP_PREFIX, id));
        let final_path = self.path_of(id);

        if let Err(e) = write_synced(&tmp_path, payload).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        sync_dir(&self.dir).await?;

        debug!(entry = %id, "Spool entry committed");
        Ok(id)
    }

    /// Snapshot of pending entries, oldest first
    pub async fn list_pending(&self) -> SpoolResult<Vec<EntryId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(EntryId::parse) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Oldest pending entry, if any
    pub async fn oldest(&self) -> SpoolResult<Option<EntryId>> {
        Ok(self.list_pending().await?.into_iter().next())
    }

    pub async fn read(&self, id: EntryId) -> SpoolResult<Vec<u8>> {
        fs::read(self.path_of(id)).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SpoolError::NotFound(id),
            _ => SpoolError::Io(e),
        })
    }

    /// Delete an entry; removing an absent entry is not an error
    pub async fn remove(&self, id: EntryId) -> SpoolResult<()> {
        match fs::remove_file(self.path_of(id)).await {
            Ok(()) => {
                debug!(entry = %id, "Spool entry removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move an entry that can never be printed out of the queue
    pub async fn quarantine(&self, id: EntryId) -> SpoolResult<PathBuf> {
        let rejected = self.dir.join(REJECTED_DIR);
        fs::create_dir_all(&rejected).await?;
        let target = rejected.join(id.file_name());
        fs::rename(self.path_of(id), &target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SpoolError::NotFound(id),
                _ => SpoolError::Io(e),
            })?;
        warn!(entry = %id, target = %target.display(), "Spool entry quarantined");
        Ok(target)
    }

    fn path_of(&self, id: EntryId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Strictly increasing key, even for bursts within one clock tick
    fn next_id(&self) -> SpoolResult<EntryId> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut last = self.last_key.lock();
        let after = last
            .checked_add(1)
            .ok_or(SpoolError::KeysExhausted(EntryId(*last)))?;
        let key = now.max(after);
        *last = key;
        Ok(EntryId(key))
    }
}

async fn write_synced(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(payload).await?;
    file.sync_all().await?;
    Ok(())
}

async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}
