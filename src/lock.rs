//! Exclusive use of a working directory.
//!
//! Two runs pointed at the same working directory would reset or extract
//! over each other. A run holds an advisory lock on a `<dir>.lock` file next
//! to the directory for as long as it uses it. The file itself stays behind;
//! the operating system releases the lock when the run ends, even on a crash.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use mongo_backup_core::{BackupError, Result};

/// Held for the lifetime of a run; the lock is released on drop.
#[derive(Debug)]
pub struct WorkdirLock {
    path: PathBuf,
    file: File,
}

impl WorkdirLock {
    /// Take the lock for `dir`, failing with `Busy` if another run holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = lock_path(dir);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BackupError::io(&path, e))?;
        file.try_lock_exclusive()
            .map_err(|_| BackupError::Busy(dir.to_path_buf()))?;

        // Record the holder for whoever finds the file.
        file.set_len(0)
            .and_then(|()| file.rewind())
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|e| BackupError::io(&path, e))?;
        tracing::debug!("Acquired lock {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(dir: &Path) -> PathBuf {
    let trimmed = dir.components().as_path();
    let mut name = OsString::from(trimmed.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
