//! Pipeline composition: the `backup` and `restore` flows.
//!
//! ```text
//! backup:  lock ─► reset work dir ─► export ─► archive ─┬─► cleanup ─► report
//!                                                       └─► upload ──┘
//! restore: lock ─► delta sync ─► extract ─► seed ─► (remove archive)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use mongo_backup_archive::{ArchiveCodec, ArchiveInfo};
use mongo_backup_core::{BackupError, DocumentStore, Result};
use mongo_backup_file::{ConflictPolicy, ObjectStore};
use tokio_util::sync::CancellationToken;

use crate::archiver::{self, Archiver};
use crate::delta::{self, SyncReport};
use crate::export::{self, ExportReport};
use crate::lock::WorkdirLock;
use crate::seed::{self, SeedReport};
use crate::unpack;
use crate::SyncOpts;

/// Settings for one backup run
#[derive(Clone)]
pub struct BackupConfig {
    /// Scratch directory for record-set files, removed after archiving
    pub work_dir: PathBuf,
    /// Where the archive is written
    pub output_dir: PathBuf,
    /// Name used in the archive file name (defaults to the source's name)
    pub db_name: Option<String>,
    /// How long cleanup waits for the upload before deleting the work dir
    pub grace_period: Duration,
    pub upload: Option<(Arc<dyn ObjectStore>, ConflictPolicy)>,
    pub opts: SyncOpts,
    /// Date stamped into the archive name
    pub date: NaiveDate,
}

#[derive(Debug)]
pub struct BackupSummary {
    pub export: ExportReport,
    pub archive: ArchiveInfo,
    /// Where the upload landed, if one was configured
    pub uploaded_to: Option<String>,
}

/// Export `source`, archive the snapshot, upload it and clean up.
pub async fn backup<S>(
    source: &S,
    archiver: &Archiver,
    config: &BackupConfig,
    cancel: &CancellationToken,
) -> Result<BackupSummary>
where
    S: DocumentStore + ?Sized,
{
    let _lock = WorkdirLock::acquire(&config.work_dir)?;

    match tokio::fs::remove_dir_all(&config.work_dir).await {
        Ok(()) => tracing::info!("Removed stale {}", config.work_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(BackupError::io(&config.work_dir, e)),
    }

    let export = export::export_all(source, &config.work_dir, &config.opts, cancel).await?;
    if let Some(err) = export.partial_failure() {
        tracing::error!(
            "Not archiving an incomplete snapshot, {} kept for inspection",
            config.work_dir.display()
        );
        return Err(err);
    }

    let db_name = config
        .db_name
        .clone()
        .unwrap_or_else(|| source.name().to_string());
    let archive = archiver
        .archive(&config.work_dir, &config.output_dir, &db_name, config.date)
        .await?;

    let mut upload = config.upload.as_ref().map(|(store, policy)| {
        let store = Arc::clone(store);
        let policy = *policy;
        let local = archive.path.clone();
        let remote_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("Uploading {} to {}", remote_name, store.display_name());
        tokio::spawn(async move { store.upload(&local, &remote_name, policy).await })
    });

    let cleaned = archiver::cleanup(
        &config.work_dir,
        &archive.path,
        upload.as_mut(),
        config.grace_period,
    )
    .await;

    let joined = match (cleaned, upload) {
        (Ok(Some(joined)), _) => Some(joined),
        (Ok(None), Some(handle)) => Some(handle.await),
        (Ok(None), None) => None,
        (Err(e), handle) => {
            if let Some(handle) = handle {
                tracing::warn!("Abandoning upload after failed cleanup");
                handle.abort();
            }
            return Err(e);
        }
    };

    let uploaded_to = match joined {
        None => None,
        Some(Ok(Ok(target))) => Some(target),
        Some(Ok(Err(e))) => return Err(e),
        Some(Err(join)) => {
            let target = config
                .upload
                .as_ref()
                .map(|(store, _)| store.display_name())
                .unwrap_or_default();
            return Err(BackupError::Remote {
                target,
                reason: join.to_string(),
            });
        }
    };

    Ok(BackupSummary {
        export,
        archive,
        uploaded_to,
    })
}

/// Settings for one restore run
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub archive: PathBuf,
    pub extract_dir: PathBuf,
    /// Delete the archive once it has been extracted
    pub remove_archive: bool,
    pub opts: SyncOpts,
}

#[derive(Debug)]
pub struct RestoreSummary {
    pub sync: SyncReport,
    pub files_extracted: usize,
    pub seed: SeedReport,
}

impl RestoreSummary {
    /// Every failed collection and file across both phases, or `None`.
    pub fn partial_failure(&self) -> Option<BackupError> {
        if self.sync.is_success() && self.seed.is_success() {
            return None;
        }
        let failed = self
            .sync
            .failed
            .iter()
            .map(|(name, err)| format!("sync {name}: {err}"))
            .chain(
                self.seed
                    .failed
                    .iter()
                    .map(|(name, err)| format!("seed {name}: {err}")),
            )
            .collect();
        Some(BackupError::PartialFailure {
            unit: "restore unit",
            succeeded: self.sync.succeeded.len() + self.seed.succeeded.len(),
            failed,
        })
    }
}

/// Delta sync `source` into `dest`, then replay the archive into `dest`.
pub async fn restore<S, D>(
    source: &S,
    dest: &D,
    codec: Arc<dyn ArchiveCodec>,
    config: &RestoreConfig,
    cancel: &CancellationToken,
) -> Result<RestoreSummary>
where
    S: DocumentStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    let _lock = WorkdirLock::acquire(&config.extract_dir)?;

    let sync = delta::sync(source, dest, &config.opts, cancel).await?;
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let files_extracted = unpack::extract(codec, &config.archive, &config.extract_dir).await?;
    if config.remove_archive {
        match tokio::fs::remove_file(&config.archive).await {
            Ok(()) => tracing::info!("Removed archive {}", config.archive.display()),
            Err(e) => tracing::warn!(
                "Failed to remove archive {}: {}",
                config.archive.display(),
                e
            ),
        }
    }

    let seed = seed::seed_dir(dest, &config.extract_dir, &config.opts, cancel).await?;

    Ok(RestoreSummary {
        sync,
        files_extracted,
        seed,
    })
}
