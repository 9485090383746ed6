//! Snapshot exporter: one record-set file per collection.
//!
//! Each collection is streamed through its cursor into `<collection>.json`.
//! The file is written as `<collection>.json.partial` and renamed once the
//! cursor is exhausted and the data is flushed, so a file under its final
//! name is always complete.

use std::path::{Path, PathBuf};

use futures::{stream, StreamExt, TryStreamExt};
use mongo_backup_core::record::to_json;
use mongo_backup_core::{BackupError, DocumentStore, Report, Result};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::SyncOpts;

/// A finished record-set file
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub records: u64,
}

pub type ExportReport = Report<ExportedFile>;

/// File name of a collection's record-set file
pub fn record_set_file_name(collection: &str) -> String {
    format!("{collection}.json")
}

/// Export every collection of `source` into `output_dir`, creating it if needed.
///
/// Collections are exported concurrently, up to `opts.concurrency` at a time.
pub async fn export_all<S>(
    source: &S,
    output_dir: &Path,
    opts: &SyncOpts,
    cancel: &CancellationToken,
) -> Result<ExportReport>
where
    S: DocumentStore + ?Sized,
{
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| BackupError::io(output_dir, e))?;

    let collections = source.list_collections().await?;
    tracing::info!(
        "Exporting {} collections from '{}' into {}",
        collections.len(),
        source.name(),
        output_dir.display()
    );

    let outcomes: Vec<(String, Option<Result<ExportedFile>>)> = stream::iter(collections)
        .map(move |collection| async move {
            if cancel.is_cancelled() {
                return (collection, None);
            }
            let outcome = export_collection(source, &collection, output_dir).await;
            (collection, Some(outcome))
        })
        .buffer_unordered(opts.concurrency())
        .collect()
        .await;

    let mut report = Report::new("collection");
    let mut skipped = 0;
    for (collection, outcome) in outcomes {
        match outcome {
            Some(outcome) => report.record(collection, outcome),
            None => skipped += 1,
        }
    }
    report.succeeded.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(err) = report.take_systemic() {
        tracing::error!("Export aborted: {}", err);
        return Err(err);
    }
    if skipped > 0 {
        tracing::warn!("Export cancelled, {} collections not started", skipped);
        return Err(BackupError::Cancelled);
    }

    tracing::info!("Finished downloading collections: {}", report.summary());
    Ok(report)
}

/// Export one collection into `output_dir`.
pub async fn export_collection<S>(
    source: &S,
    collection: &str,
    output_dir: &Path,
) -> Result<ExportedFile>
where
    S: DocumentStore + ?Sized,
{
    if collection.is_empty()
        || collection.starts_with('.')
        || collection.contains(['/', '\\'])
    {
        return Err(BackupError::query(
            collection,
            "collection name cannot be used as a file name",
        ));
    }

    let path = output_dir.join(record_set_file_name(collection));
    let partial = output_dir.join(format!("{}.partial", record_set_file_name(collection)));
    tracing::info!("Downloading collection into {}...", path.display());

    match write_record_set(source, collection, &partial).await {
        Ok(records) => {
            tokio::fs::rename(&partial, &path)
                .await
                .map_err(|e| BackupError::io(&path, e))?;
            tracing::debug!("Wrote {} records to {}", records, path.display());
            Ok(ExportedFile { path, records })
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

/// Stream a collection into `path` as a JSON array, one record per line.
async fn write_record_set<S>(source: &S, collection: &str, path: &Path) -> Result<u64>
where
    S: DocumentStore + ?Sized,
{
    let io_err = |e: std::io::Error| BackupError::io(path, e);

    let file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let mut cursor = source.find_after(collection, None).await?;

    writer.write_all(b"[").await.map_err(io_err)?;
    let mut records = 0u64;
    while let Some(record) = cursor.try_next().await? {
        let separator: &[u8] = if records == 0 { b"\n  " } else { b",\n  " };
        writer.write_all(separator).await.map_err(io_err)?;
        let line = serde_json::to_vec(&to_json(record))
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        writer.write_all(&line).await.map_err(io_err)?;
        records += 1;
    }
    let closing: &[u8] = if records == 0 { b"]\n" } else { b"\n]\n" };
    writer.write_all(closing).await.map_err(io_err)?;
    writer.flush().await.map_err(io_err)?;
    writer.get_ref().sync_all().await.map_err(io_err)?;

    Ok(records)
}
