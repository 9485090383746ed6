//! mongo-backup library
//!
//! Incremental backup and restore for MongoDB: snapshot collections to
//! record-set files, bundle them into an archive, and later replay the
//! archive into a destination database.
//!
//! # Recovery modes
//!
//! Two deliberately different strategies are kept side by side:
//!
//! - **Delta sync** ([`delta`]): continuous, append-only. Only records whose
//!   `_id` is beyond the destination's watermark are copied, tagged
//!   `copied: true`. Re-running it is a no-op.
//! - **Full-replace seeding** ([`seed`]): point-in-time restore. Every
//!   record-set file replaces the whole destination collection.
//!
//! # Pipeline
//!
//! ```text
//! backup:  export ──► archive ──► (upload) ──► cleanup working directory
//! restore: delta sync ──► extract archive ──► seed
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Snapshot a database into shop-backup-<d>-<m>-<y>.tar.zst
//! mongo-backup backup --source-uri mongodb://localhost:27017/shop --upload-to s3://backups/shop/
//!
//! # Copy new records, then replay the archive into the destination
//! mongo-backup restore --source-uri mongodb://prod/shop --dest-uri mongodb://replica/shop \
//!   --archive-file shop-backup-17-10-2026.tar.zst
//! ```

pub mod archiver;
pub mod config;
pub mod delta;
pub mod export;
pub mod lock;
pub mod pipeline;
pub mod seed;
pub mod unpack;

pub use mongo_backup_core::{BackupError, DocumentStore, MemoryStore, Report, Result};

/// Sync options (non-connection related)
#[derive(Clone, Debug)]
pub struct SyncOpts {
    /// Records per insert batch
    pub batch_size: usize,
    /// Collections processed at the same time
    pub concurrency: usize,
    /// Read and report, but write nothing to the destination
    pub dry_run: bool,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            concurrency: 4,
            dry_run: false,
        }
    }
}

impl SyncOpts {
    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}
