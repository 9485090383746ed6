//! Local directory upload target

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mongo_backup_core::{BackupError, Result};

use crate::{autorename_candidate, ConflictPolicy, ObjectStore, MAX_AUTORENAME_ATTEMPTS};

/// Copies archives into a directory (a mounted share, a synced folder, ...)
pub struct LocalDirStore {
    dir: PathBuf,
}

impl LocalDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `local` to `dest`, refusing to replace an existing file.
    async fn copy_new(local: &Path, dest: &Path) -> std::io::Result<u64> {
        let mut source = tokio::fs::File::open(local).await?;
        let mut target = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await?;
        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.sync_all().await?;
        Ok(copied)
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn upload(
        &self,
        local: &Path,
        remote_name: &str,
        policy: ConflictPolicy,
    ) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?;

        if policy == ConflictPolicy::Overwrite {
            let dest = self.dir.join(remote_name);
            tokio::fs::copy(local, &dest)
                .await
                .map_err(|e| BackupError::io(&dest, e))?;
            return Ok(dest.display().to_string());
        }

        let attempts = match policy {
            ConflictPolicy::Autorename => MAX_AUTORENAME_ATTEMPTS,
            _ => 1,
        };
        for attempt in 0..attempts {
            let dest = self.dir.join(autorename_candidate(remote_name, attempt));
            match Self::copy_new(local, &dest).await {
                Ok(bytes) => {
                    tracing::info!(
                        "Copied {} ({} bytes) to {}",
                        local.display(),
                        bytes,
                        dest.display()
                    );
                    return Ok(dest.display().to_string());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!("{} already exists", dest.display());
                }
                Err(e) => return Err(BackupError::io(&dest, e)),
            }
        }

        Err(BackupError::Remote {
            target: self.dir.join(remote_name).display().to_string(),
            reason: "name already taken".to_string(),
        })
    }

    fn display_name(&self) -> String {
        self.dir.display().to_string()
    }
}
