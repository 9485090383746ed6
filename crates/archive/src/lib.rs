//! Archive codec for mongo-backup
//!
//! Bundles a directory of record-set files into one portable artifact and
//! unpacks it again. The codec is a capability the pipeline consumes:
//! it knows nothing about collections, only about directory trees.
//!
//! Implementations are blocking; async callers run them on the blocking pool.
//!
//! # Errors
//!
//! - Decoding failures (bad zstd frame, truncated tar, entries escaping the
//!   target directory) are reported as `BackupError::CorruptArchive`.
//! - Filesystem failures are reported as `BackupError::Io`.

mod tar_zstd;

use std::path::{Path, PathBuf};

use mongo_backup_core::Result;

pub use tar_zstd::TarZstdCodec;

/// Information about a written archive
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub file_count: usize,
}

/// Trait for archive formats.
pub trait ArchiveCodec: Send + Sync {
    /// File extension without the leading dot (e.g. "tar.zst")
    fn extension(&self) -> &'static str;

    /// Compress `input_dir` recursively into the single file `dest`.
    ///
    /// The archive's top-level entry is the base name of `input_dir`.
    /// Either `dest` is complete when this returns `Ok` or it does not exist.
    fn compress_dir(&self, input_dir: &Path, dest: &Path) -> Result<ArchiveInfo>;

    /// Extract `archive` into the existing directory `target_dir`,
    /// returning the number of regular files written.
    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<usize>;
}
