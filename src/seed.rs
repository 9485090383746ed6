//! Seeder: full-replace restore from a directory of record-set files.
//!
//! Every `.json` file found below the seed directory, at any depth, replaces
//! the destination collection named after its base name: existing records
//! are deleted, then the file's records are inserted. Files are processed one
//! at a time in walk order, so when two subdirectories hold a file for the
//! same collection the later one wins.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use mongo_backup_core::record::{duplicate_id, parse_record_set};
use mongo_backup_core::{BackupError, DocumentStore, Report, Result};
use mongo_backup_file::walk;
use tokio_util::sync::CancellationToken;

use crate::SyncOpts;

/// Extension of record-set files
pub const RECORD_SET_EXTENSION: &str = "json";

/// What happened to one record-set file
#[derive(Debug, Clone)]
pub struct SeededFile {
    pub collection: String,
    pub deleted: u64,
    pub inserted: u64,
}

pub type SeedReport = Report<SeededFile>;

/// Collection a record-set file belongs to: its name without the extension.
pub fn collection_name(path: &Path) -> Option<String> {
    let is_record_set = path
        .extension()
        .is_some_and(|ext| ext == RECORD_SET_EXTENSION);
    if !is_record_set {
        return None;
    }
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Seed `dest` from every record-set file below `dir`.
///
/// A file that cannot be read or parsed, or whose collection cannot be
/// written, is recorded in the report and the walk continues; so is a
/// subdirectory that cannot be listed. A missing `dir` or a systemic
/// failure aborts with that error.
pub async fn seed_dir<D>(
    dest: &D,
    dir: &Path,
    opts: &SyncOpts,
    cancel: &CancellationToken,
) -> Result<SeedReport>
where
    D: DocumentStore + ?Sized,
{
    tracing::info!("Seeding '{}' from {}", dest.name(), dir.display());

    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(BackupError::io(
                dir,
                std::io::Error::other("seed path is not a directory"),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BackupError::NotFound(dir.to_path_buf()))
        }
        Err(e) => return Err(BackupError::io(dir, e)),
    }

    let mut report = Report::new("file");
    let mut entries = std::pin::pin!(walk(dir));

    while let Some(item) = entries.next().await {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                // An unreadable subdirectory: its files are reported as one failure.
                let name = match &err {
                    BackupError::Io { path, .. } | BackupError::NotFound(path) => {
                        relative_name(dir, path)
                    }
                    _ => dir.display().to_string(),
                };
                report.record(name, Err(err));
                continue;
            }
        };
        if entry.is_dir {
            tracing::info!("Moving into {} directory", entry.path.display());
            continue;
        }
        let Some(collection) = collection_name(&entry.path) else {
            tracing::debug!("Skipping {}", entry.path.display());
            continue;
        };
        if cancel.is_cancelled() {
            tracing::warn!("Seeding cancelled ({})", report.summary());
            return Err(BackupError::Cancelled);
        }

        let name = relative_name(dir, &entry.path);
        let outcome = seed_file(dest, &entry.path, &collection, opts).await;
        report.record(name, outcome);

        if let Some(err) = report.take_systemic() {
            tracing::error!("Seeding aborted: {}", err);
            return Err(err);
        }
    }

    tracing::info!("Seeding finished: {}", report.summary());
    Ok(report)
}

fn relative_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir).unwrap_or(path).display().to_string()
}

/// Replace `collection` in `dest` with the records of the file at `path`.
///
/// The file is parsed and checked completely before anything is deleted, so
/// a malformed file, or one that repeats an `_id`, leaves the collection as
/// it was.
pub async fn seed_file<D>(
    dest: &D,
    path: &Path,
    collection: &str,
    opts: &SyncOpts,
) -> Result<SeededFile>
where
    D: DocumentStore + ?Sized,
{
    tracing::info!("Seeding collection '{}' from {}", collection, path.display());

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| BackupError::io(path, e))?;
    let records = parse_record_set(&bytes).map_err(|reason| BackupError::InvalidRecordSet {
        path: PathBuf::from(path),
        reason,
    })?;
    if let Some(id) = duplicate_id(&records) {
        return Err(BackupError::InvalidRecordSet {
            path: PathBuf::from(path),
            reason: format!("_id {id} appears more than once"),
        });
    }

    if opts.dry_run {
        tracing::info!(
            "Dry-run mode: would replace '{}' with {} records",
            collection,
            records.len()
        );
        return Ok(SeededFile {
            collection: collection.to_string(),
            deleted: 0,
            inserted: records.len() as u64,
        });
    }

    let (deleted, inserted) = dest.replace_all(collection, records).await?;
    tracing::info!(
        "Collection '{}' replaced: {} deleted, {} inserted",
        collection,
        deleted,
        inserted
    );
    Ok(SeededFile {
        collection: collection.to_string(),
        deleted,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_from_file() {
        assert_eq!(
            collection_name(Path::new("backup/users.json")).as_deref(),
            Some("users")
        );
        assert_eq!(
            collection_name(Path::new("a/b/order.items.json")).as_deref(),
            Some("order.items")
        );
        assert_eq!(collection_name(Path::new("backup/notes.txt")), None);
        assert_eq!(collection_name(Path::new("backup/users.json.partial")), None);
        assert_eq!(collection_name(Path::new("backup/README")), None);
    }
}
