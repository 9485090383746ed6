//! Error taxonomy shared across the pipeline.

use std::io;
use std::path::{Path, PathBuf};

/// Result alias used by every library crate in the workspace.
pub type Result<T, E = BackupError> = std::result::Result<T, E>;

/// Errors that can occur while exporting, archiving, extracting, seeding or syncing.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The database could not be reached (systemic, aborts the whole run)
    #[error("Cannot connect to database: {0}")]
    Connection(String),

    /// An expected archive, file or directory is missing
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The archive could not be decoded
    #[error("Corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// Filesystem failure
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A database operation failed for one collection
    #[error("Query failed on collection '{collection}': {reason}")]
    Query { collection: String, reason: String },

    /// A record-set file does not hold a JSON array of documents
    #[error("Invalid record-set file {}: {reason}", path.display())]
    InvalidRecordSet { path: PathBuf, reason: String },

    /// Remote object storage rejected an operation
    #[error("Remote storage error for '{target}': {reason}")]
    Remote { target: String, reason: String },

    /// One or more independent units failed while others succeeded
    #[error("{} of {} {unit}s failed: {}", failed.len(), succeeded + failed.len(), failed.join("; "))]
    PartialFailure {
        unit: &'static str,
        succeeded: usize,
        failed: Vec<String>,
    },

    /// The run was cancelled before all units were started
    #[error("Operation cancelled")]
    Cancelled,

    /// Another run holds the working directory
    #[error("Working directory {} is locked by another run", .0.display())]
    Busy(PathBuf),
}

impl BackupError {
    /// Build an `Io` error tagged with the path being operated on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        BackupError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn query(collection: impl Into<String>, reason: impl ToString) -> Self {
        BackupError::Query {
            collection: collection.into(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        BackupError::CorruptArchive {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Systemic failures are fatal for the whole run instead of a single unit.
    pub fn is_systemic(&self) -> bool {
        matches!(self, BackupError::Connection(_))
    }
}
