//! Single-owner lock on a data directory
//!
//! The engine, the tier table and the reorganizer all assume one process
//! owns the store. A local data directory is claimed with an advisory
//! `flock` on `data_dir/.lock`, held for as long as the [`StoreLock`] lives.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};

/// File name of the lock inside the data directory
pub const LOCK_FILE: &str = ".lock";

/// Exclusive claim on a data directory, released on drop
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    _file: File,
}

impl StoreLock {
    /// Claim `data_dir`, failing with `StoreLocked` if another owner holds it
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        try_lock(&file, &path)?;
        tracing::debug!("Acquired store lock {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File, path: &Path) -> Result<()> {
    use rustix::fs::{FlockOperation, flock};
    use rustix::io::Errno;

    match flock(file, FlockOperation::NonBlockingLockExclusive) {
        Ok(()) => Ok(()),
        Err(e) if e == Errno::WOULDBLOCK => Err(MemoryError::StoreLocked(path.display().to_string())),
        Err(e) => Err(MemoryError::Io(e.into())),
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File, path: &Path) -> Result<()> {
    tracing::warn!("Advisory store locking is unavailable here, not guarding {}", path.display());
    Ok(())
}
