//! Delta copier: live database-to-database sync of new records.
//!
//! For every collection of the source, the destination's highest `_id` is the
//! watermark. Only source records strictly beyond it are copied, tagged with
//! the provenance field, in ascending `_id` order. Because the watermark is
//! recomputed from the destination data on each run, running the copier
//! twice in a row copies nothing the second time, and a run interrupted
//! between batches resumes where it stopped.

use futures::{stream, StreamExt, TryStreamExt};
use mongo_backup_core::record::tag_copied;
use mongo_backup_core::{BackupError, Bson, Document, DocumentStore, Report, Result};
use tokio_util::sync::CancellationToken;

use crate::SyncOpts;

/// What happened to one collection
#[derive(Debug, Clone)]
pub struct CollectionSync {
    /// Destination `_id` the copy started after (`None`: copied everything)
    pub watermark: Option<Bson>,
    /// Records written (or that would be written, in dry-run mode)
    pub copied: u64,
}

pub type SyncReport = Report<CollectionSync>;

/// Copy records that are new since the last transfer, for every collection
/// present in `source`.
///
/// Collections are independent: a failing collection is recorded in the
/// report and the others still run. A systemic failure (database unreachable)
/// aborts with that error instead.
pub async fn sync<S, D>(
    source: &S,
    dest: &D,
    opts: &SyncOpts,
    cancel: &CancellationToken,
) -> Result<SyncReport>
where
    S: DocumentStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    tracing::info!(
        "Starting delta sync from '{}' to '{}'",
        source.name(),
        dest.name()
    );
    let collections = source.list_collections().await?;
    tracing::info!("Found {} collections in source", collections.len());

    let outcomes: Vec<(String, Option<Result<CollectionSync>>)> = stream::iter(collections)
        .map(move |collection| async move {
            if cancel.is_cancelled() {
                return (collection, None);
            }
            let outcome = sync_collection(source, dest, &collection, opts).await;
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
        tracing::error!("Delta sync aborted: {}", err);
        return Err(err);
    }
    if skipped > 0 {
        tracing::warn!(
            "Delta sync cancelled, {} collections not started ({})",
            skipped,
            report.summary()
        );
        return Err(BackupError::Cancelled);
    }

    let copied: u64 = report.succeeded.iter().map(|(_, c)| c.copied).sum();
    tracing::info!(
        "Delta sync finished: {}, {} records copied",
        report.summary(),
        copied
    );
    Ok(report)
}

/// Sync one collection.
pub async fn sync_collection<S, D>(
    source: &S,
    dest: &D,
    collection: &str,
    opts: &SyncOpts,
) -> Result<CollectionSync>
where
    S: DocumentStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    // The watermark must be read before the source query: a record committed
    // in between is fetched again (over-fetch), never skipped.
    let watermark = dest.max_id(collection).await?;
    tracing::debug!("Collection '{}' watermark: {:?}", collection, watermark);

    let mut newer = source.find_after(collection, watermark.as_ref()).await?;
    let mut batch: Vec<Document> = Vec::with_capacity(opts.batch_size());
    let mut copied = 0;

    while let Some(mut record) = newer.try_next().await? {
        tag_copied(&mut record);
        batch.push(record);
        if batch.len() >= opts.batch_size() {
            copied += flush(dest, collection, &mut batch, opts.dry_run).await?;
        }
    }
    if !batch.is_empty() {
        copied += flush(dest, collection, &mut batch, opts.dry_run).await?;
    }

    if copied == 0 {
        tracing::info!("Collection '{}' is up to date", collection);
    } else {
        tracing::info!("Copied {} new records into '{}'", copied, collection);
    }
    Ok(CollectionSync { watermark, copied })
}

async fn flush<D>(
    dest: &D,
    collection: &str,
    batch: &mut Vec<Document>,
    dry_run: bool,
) -> Result<u64>
where
    D: DocumentStore + ?Sized,
{
    let records = std::mem::take(batch);
    if dry_run {
        tracing::debug!(
            "Dry-run mode: skipping insert of {} records into '{}'",
            records.len(),
            collection
        );
        return Ok(records.len() as u64);
    }
    tracing::debug!(
        "Inserting batch of {} records into '{}'",
        records.len(),
        collection
    );
    dest.insert_many(collection, records).await
}
