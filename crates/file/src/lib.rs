//! Filesystem traversal and object storage upload for mongo-backup
//!
//! # Directory walk
//!
//! [`walk`] yields every entry below a root directory, depth-first, children
//! in name order, reading each directory only when the traversal reaches it.
//!
//! # Upload targets
//!
//! An archive can be pushed to remote storage after it is written:
//! - `s3://bucket/prefix/` - S3 objects under a prefix
//! - Everything else - a local (or mounted) directory
//!
//! # Example
//!
//! ```ignore
//! use mongo_backup_file::{ConflictPolicy, UploadTarget};
//!
//! let store = UploadTarget::parse("s3://backups/nightly/")?.connect().await?;
//! let remote = store
//!     .upload(&archive_path, "shop-backup-1-2-2024.tar.zst", ConflictPolicy::Autorename)
//!     .await?;
//! ```

mod local;
mod s3;
mod walk;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use mongo_backup_core::{BackupError, Result};

pub use local::LocalDirStore;
pub use s3::S3Store;
pub use walk::{walk, WalkEntry};

/// Highest numeric suffix tried before autorename gives up
pub const MAX_AUTORENAME_ATTEMPTS: usize = 1000;

/// What to do when the remote name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Replace the existing object
    Overwrite,
    /// Keep both: upload as `name (1).ext`, `name (2).ext`, ...
    #[default]
    Autorename,
    /// Refuse the upload
    Fail,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "autorename" | "add" => Ok(ConflictPolicy::Autorename),
            "fail" => Ok(ConflictPolicy::Fail),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected overwrite, autorename or fail)"
            )),
        }
    }
}

/// Trait for remote storage that accepts finished archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local` as `remote_name`, returning where it actually landed.
    async fn upload(&self, local: &Path, remote_name: &str, policy: ConflictPolicy)
        -> Result<String>;

    /// Display name for logging
    fn display_name(&self) -> String;
}

/// Candidate name for the `attempt`-th autorename: `a.tar.zst` -> `a (1).tar.zst`.
///
/// The suffix goes before the first dot of the file name so multi-part
/// extensions stay intact.
pub fn autorename_candidate(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.find('.') {
        Some(dot) if dot > 0 => format!("{} ({attempt}){}", &name[..dot], &name[dot..]),
        _ => format!("{name} ({attempt})"),
    }
}

/// Parsed upload destination
#[derive(Debug, Clone)]
pub enum UploadTarget {
    /// Local directory
    Local(PathBuf),
    /// S3 bucket and key prefix
    S3 { bucket: String, prefix: String },
}

impl UploadTarget {
    /// Parse a target, auto-detecting S3 URIs
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.starts_with("s3://") {
            let (bucket, prefix) = parse_s3_uri(uri)?;
            Ok(UploadTarget::S3 { bucket, prefix })
        } else {
            Ok(UploadTarget::Local(PathBuf::from(uri)))
        }
    }

    /// Build the store for this target.
    pub async fn connect(&self) -> Result<Box<dyn ObjectStore>> {
        match self {
            UploadTarget::Local(dir) => Ok(Box::new(LocalDirStore::new(dir.clone()))),
            UploadTarget::S3 { bucket, prefix } => Ok(Box::new(
                S3Store::from_env(bucket.clone(), prefix.clone()).await,
            )),
        }
    }
}

/// Parse S3 URI in the format: s3://bucket/key/prefix
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let invalid = |reason: &str| BackupError::Remote {
        target: uri.to_string(),
        reason: reason.to_string(),
    };
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| invalid("S3 URI must start with 's3://'"))?;

    let parts: Vec<&str> = rest.splitn(2, '/').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(invalid("S3 URI must be in format 's3://bucket/prefix/'"));
    }

    Ok((parts[0].to_string(), parts[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_target() {
        let target = UploadTarget::parse("/mnt/backups").unwrap();
        assert!(matches!(target, UploadTarget::Local(_)));
    }

    #[test]
    fn test_parse_s3_target() {
        match UploadTarget::parse("s3://my-bucket/nightly/").unwrap() {
            UploadTarget::S3 { bucket, prefix } => {
                assert_eq!(bucket, "my-bucket");
                assert_eq!(prefix, "nightly/");
            }
            other => panic!("unexpected target: {other:?}"),
        }
    }

    #[test]
    fn test_parse_s3_uri_no_prefix() {
        assert!(parse_s3_uri("my-bucket/path").is_err());
    }

    #[test]
    fn test_parse_s3_uri_no_key() {
        assert!(parse_s3_uri("s3://my-bucket").is_err());
    }

    #[test]
    fn test_parse_s3_uri_bucket_root() {
        let (bucket, prefix) = parse_s3_uri("s3://my-bucket/").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(prefix, "");
    }

    #[test]
    fn test_autorename_candidates() {
        assert_eq!(autorename_candidate("db.tar.zst", 0), "db.tar.zst");
        assert_eq!(autorename_candidate("db.tar.zst", 1), "db (1).tar.zst");
        assert_eq!(autorename_candidate("README", 2), "README (2)");
        assert_eq!(autorename_candidate(".hidden", 1), ".hidden (1)");
    }

    #[test]
    fn test_conflict_policy_from_str() {
        assert_eq!("overwrite".parse(), Ok(ConflictPolicy::Overwrite));
        assert_eq!("Autorename".parse(), Ok(ConflictPolicy::Autorename));
        assert_eq!("fail".parse(), Ok(ConflictPolicy::Fail));
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }
}
