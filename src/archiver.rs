//! Archiver: bundle the working directory into one dated archive, then
//! remove the working directory once the archive is safely on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use mongo_backup_archive::{ArchiveCodec, ArchiveInfo};
use mongo_backup_core::{BackupError, Result};

/// `<db>-backup-<day>-<month>-<year>.<ext>`, month counted from 1.
pub fn archive_file_name(db_name: &str, date: NaiveDate, extension: &str) -> String {
    format!(
        "{}-backup-{}-{}-{}.{}",
        db_name,
        date.day(),
        date.month(),
        date.year(),
        extension
    )
}

/// Writes archives with a given codec
#[derive(Clone)]
pub struct Archiver {
    codec: Arc<dyn ArchiveCodec>,
}

impl Archiver {
    pub fn new(codec: Arc<dyn ArchiveCodec>) -> Self {
        Self { codec }
    }

    /// Compress `input_dir` into `dest_dir/<archive name>`.
    ///
    /// An archive with the same name is replaced.
    pub async fn archive(
        &self,
        input_dir: &Path,
        dest_dir: &Path,
        db_name: &str,
        date: NaiveDate,
    ) -> Result<ArchiveInfo> {
        match tokio::fs::metadata(input_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(BackupError::io(
                    input_dir,
                    std::io::Error::other("backup input is not a directory"),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(input_dir.to_path_buf()))
            }
            Err(e) => return Err(BackupError::io(input_dir, e)),
        }
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| BackupError::io(dest_dir, e))?;

        let dest = dest_dir.join(archive_file_name(db_name, date, self.codec.extension()));
        tracing::info!(
            "Compressing {} into {}...",
            input_dir.display(),
            dest.display()
        );

        let codec = Arc::clone(&self.codec);
        let input: PathBuf = input_dir.to_path_buf();
        let info = tokio::task::spawn_blocking(move || codec.compress_dir(&input, &dest))
            .await
            .map_err(|e| BackupError::io(input_dir, std::io::Error::other(e)))??;

        tracing::info!(
            "Backup file {} created ({} files, {} bytes)",
            info.path.display(),
            info.file_count,
            info.size_bytes
        );
        Ok(info)
    }
}

/// Delete the working directory after a successful archive.
///
/// The directory is only removed when `archive` exists and is non-empty.
/// When `pending` is given (an upload of the archive in flight), deletion
/// waits for it up to `grace`. If it completes, its output is returned; if the
/// grace period runs out, the directory is removed anyway and `None` is
/// returned so the caller can keep waiting on the future.
pub async fn cleanup<F>(
    input_dir: &Path,
    archive: &Path,
    pending: Option<&mut F>,
    grace: Duration,
) -> Result<Option<F::Output>>
where
    F: Future + Unpin,
{
    match tokio::fs::metadata(archive).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        Ok(_) => {
            return Err(BackupError::corrupt(
                archive,
                "archive is empty, keeping the backup directory",
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BackupError::NotFound(archive.to_path_buf()))
        }
        Err(e) => return Err(BackupError::io(archive, e)),
    }

    let finished = match pending {
        Some(pending) => match tokio::time::timeout(grace, pending).await {
            Ok(output) => Some(output),
            Err(_) => {
                tracing::warn!(
                    "Upload still running after {:?}, deleting {} anyway",
                    grace,
                    input_dir.display()
                );
                None
            }
        },
        None => None,
    };

    match tokio::fs::remove_dir_all(input_dir).await {
        Ok(()) => tracing::info!("Backup directory {} deleted.", input_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Backup directory {} already gone", input_dir.display())
        }
        Err(e) => return Err(BackupError::io(input_dir, e)),
    }
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongo_backup_archive::TarZstdCodec;
    use tempfile::TempDir;

    #[test]
    fn test_archive_file_name_uses_calendar_month() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            archive_file_name("shop", date, "tar.zst"),
            "shop-backup-5-1-2024.tar.zst"
        );
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(
            archive_file_name("shop", date, "tar.zst"),
            "shop-backup-31-12-2023.tar.zst"
        );
    }

    #[tokio::test]
    async fn test_archive_missing_input_is_not_found() {
        let dir = TempDir::new().unwrap();
        let archiver = Archiver::new(Arc::new(TarZstdCodec::default()));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let err = archiver
            .archive(&dir.path().join("nope"), dir.path(), "shop", date)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_directory_without_archive() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("backup");
        std::fs::create_dir(&work).unwrap();
        std::fs::write(work.join("a.json"), "[]\n").unwrap();

        let err = cleanup::<std::future::Ready<()>>(
            &work,
            &dir.path().join("missing.tar.zst"),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
        assert!(work.join("a.json").exists());

        let empty = dir.path().join("empty.tar.zst");
        std::fs::write(&empty, b"").unwrap();
        let err = cleanup::<std::future::Ready<()>>(&work, &empty, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::CorruptArchive { .. }));
        assert!(work.exists());
    }

    #[tokio::test]
    async fn test_cleanup_waits_for_pending_upload() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("backup");
        std::fs::create_dir(&work).unwrap();
        let archive = dir.path().join("a.tar.zst");
        std::fs::write(&archive, b"data").unwrap();

        let mut upload = Box::pin(async { 42 });
        let out = cleanup(&work, &archive, Some(&mut upload), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, Some(42));
        assert!(!work.exists());
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_cleanup_gives_up_waiting_after_grace_period() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("backup");
        std::fs::create_dir(&work).unwrap();
        let archive = dir.path().join("a.tar.zst");
        std::fs::write(&archive, b"data").unwrap();

        let mut upload = Box::pin(std::future::pending::<()>());
        let out = cleanup(&work, &archive, Some(&mut upload), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(out.is_none());
        assert!(!work.exists());
    }
}
