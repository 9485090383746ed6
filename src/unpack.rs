//! Unpacker: extract an archive into a target directory.
//!
//! Extraction happens in a staging directory next to the target, which is
//! renamed into place only once every entry has been written. A corrupt or
//! truncated archive therefore never leaves a half-filled target behind, and
//! a target left over from an earlier run is replaced as a whole.

use std::path::Path;
use std::sync::Arc;

use mongo_backup_archive::ArchiveCodec;
use mongo_backup_core::{BackupError, Result};

/// Extract `archive` into `target_dir`, returning the number of files written.
pub async fn extract(
    codec: Arc<dyn ArchiveCodec>,
    archive: &Path,
    target_dir: &Path,
) -> Result<usize> {
    match tokio::fs::metadata(archive).await {
        Ok(meta) if meta.is_dir() => {
            return Err(BackupError::io(
                archive,
                std::io::Error::other("archive path is a directory"),
            ))
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BackupError::NotFound(archive.to_path_buf()))
        }
        Err(e) => return Err(BackupError::io(archive, e)),
    }

    if target_dir.file_name().is_none() {
        return Err(BackupError::io(
            target_dir,
            std::io::Error::other("refusing to extract over this directory"),
        ));
    }
    let parent = match target_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| BackupError::io(&parent, e))?;

    tracing::info!(
        "Extracting {} into {}...",
        archive.display(),
        target_dir.display()
    );

    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(&parent)
        .map_err(|e| BackupError::io(&parent, e))?;

    let staging_path = staging.path().to_path_buf();
    let archive_path = archive.to_path_buf();
    let files = tokio::task::spawn_blocking(move || codec.extract(&archive_path, &staging_path))
        .await
        .map_err(|e| BackupError::io(archive, std::io::Error::other(e)))??;

    // From here on the staging directory is ours to move or remove.
    let staging = staging.keep();
    if let Err(e) = replace_dir(&staging, target_dir).await {
        let _ = tokio::fs::remove_dir_all(&staging).await;
        return Err(e);
    }

    tracing::info!(
        "Extracted {} files into {}",
        files,
        target_dir.display()
    );
    Ok(files)
}

async fn replace_dir(staging: &Path, target_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(target_dir).await {
        Ok(()) => tracing::debug!("Replaced existing {}", target_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(BackupError::io(target_dir, e)),
    }
    tokio::fs::rename(staging, target_dir)
        .await
        .map_err(|e| BackupError::io(target_dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongo_backup_archive::TarZstdCodec;
    use tempfile::TempDir;

    fn codec() -> Arc<dyn ArchiveCodec> {
        Arc::new(TarZstdCodec::default())
    }

    #[tokio::test]
    async fn test_extract_round_trip_replaces_target() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("backup");
        std::fs::create_dir_all(work.join("nested")).unwrap();
        std::fs::write(work.join("users.json"), "[]\n").unwrap();
        std::fs::write(work.join("nested").join("orders.json"), "[]\n").unwrap();

        let archive = dir.path().join("shop.tar.zst");
        codec().compress_dir(&work, &archive).unwrap();

        let target = dir.path().join("restore");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.json"), "[]\n").unwrap();

        let files = extract(codec(), &archive, &target).await.unwrap();
        assert_eq!(files, 2);
        assert!(target.join("backup").join("users.json").exists());
        assert!(target.join("backup").join("nested").join("orders.json").exists());
        assert!(!target.join("stale.json").exists());
    }

    #[tokio::test]
    async fn test_extract_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = extract(codec(), &dir.path().join("nope.tar.zst"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_extract_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = extract(codec(), dir.path(), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Io { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_archive_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.tar.zst");
        std::fs::write(&archive, b"definitely not zstd").unwrap();
        let target = dir.path().join("out");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep.json"), "[]\n").unwrap();

        let err = extract(codec(), &archive, &target).await.unwrap_err();
        assert!(matches!(err, BackupError::CorruptArchive { .. }));
        assert!(target.join("keep.json").exists());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".extract-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
