//! Command-line configuration shared by the subcommands.
//!
//! Every connection setting can also come from the environment, so a
//! scheduled job can be configured without a long command line.

mod duration;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mongo_backup_file::ConflictPolicy;

pub use duration::parse_duration;

use crate::SyncOpts;

/// Database the records are read from
#[derive(Parser, Clone, Debug)]
pub struct SourceArgs {
    /// Source connection string
    #[arg(long, env = "SOURCE_URI")]
    pub source_uri: String,
}

/// Database the records are written to
#[derive(Parser, Clone, Debug)]
pub struct DestArgs {
    /// Destination connection string
    #[arg(long, env = "DEST_URI")]
    pub dest_uri: String,
}

/// Tuning shared by every command that touches a database
#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// Database name, when a connection string does not name one
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Records per insert batch
    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    /// Collections processed at the same time
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Dry run mode - read and report, but don't write to the destination
    #[arg(long)]
    pub dry_run: bool,
}

impl From<&RunArgs> for SyncOpts {
    fn from(args: &RunArgs) -> Self {
        Self {
            batch_size: args.batch_size,
            concurrency: args.concurrency,
            dry_run: args.dry_run,
        }
    }
}

/// Where the finished archive is pushed
#[derive(Parser, Clone, Debug)]
pub struct UploadArgs {
    /// Upload target: a directory or s3://bucket/prefix/
    #[arg(long, env = "UPLOAD_TO")]
    pub upload_to: Option<String>,

    /// What to do when the archive name is already taken remotely
    /// (overwrite, autorename, fail)
    #[arg(long, default_value = "autorename")]
    pub upload_policy: ConflictPolicy,

    /// How long to wait for the upload before deleting the working directory
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub grace_period: Duration,
}

/// Archive settings
#[derive(Parser, Clone, Debug)]
pub struct ArchiveArgs {
    /// zstd compression level
    #[arg(long, default_value = "3")]
    pub compression_level: i32,
}

/// Archive to restore from
#[derive(Parser, Clone, Debug)]
pub struct RestoreArgs {
    /// Archive file to extract and seed from
    #[arg(long, env = "ARCHIVE_FILE_NAME")]
    pub archive_file: PathBuf,

    /// Directory the archive is extracted into
    #[arg(long, default_value = "restore")]
    pub extract_dir: PathBuf,

    /// Delete the archive once it has been extracted
    #[arg(long)]
    pub remove_archive: bool,
}
