//! Command-line interface for mongo-backup
//!
//! # Usage Examples
//!
//! ## Backup
//! ```bash
//! # Snapshot every collection into ./shop-backup-<d>-<m>-<y>.tar.zst
//! mongo-backup backup --source-uri mongodb://localhost:27017/shop
//!
//! # ... and push the archive to S3, keeping older uploads of the same day
//! mongo-backup backup --source-uri mongodb://localhost:27017/shop \
//!   --upload-to s3://backups/shop/ --upload-policy autorename --grace-period 2m
//! ```
//!
//! ## Restore
//! ```bash
//! # Copy new records from the live source, then replay the archive
//! SOURCE_URI=mongodb://prod/shop DEST_URI=mongodb://replica/shop \
//! ARCHIVE_FILE_NAME=shop-backup-17-10-2026.tar.zst mongo-backup restore
//! ```
//!
//! ## Single phases
//! ```bash
//! mongo-backup sync --source-uri mongodb://prod/shop --dest-uri mongodb://replica/shop
//! mongo-backup seed --dest-uri mongodb://replica/shop --from-dir restore/backup
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mongo_backup::archiver::Archiver;
use mongo_backup::config::{ArchiveArgs, DestArgs, RestoreArgs, RunArgs, SourceArgs, UploadArgs};
use mongo_backup::pipeline::{self, BackupConfig, RestoreConfig};
use mongo_backup::{delta, seed, unpack, SyncOpts};
use mongo_backup_archive::{ArchiveCodec, TarZstdCodec};
use mongo_backup_file::UploadTarget;
use mongo_backup_mongodb::{connect, ConnectOpts, MongoStore};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mongo-backup")]
#[command(about = "Incremental backup, archival and restore for MongoDB databases")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every collection, archive the snapshot, upload it and clean up
    Backup {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        upload: UploadArgs,

        #[command(flatten)]
        archive: ArchiveArgs,

        /// Working directory for record-set files (deleted after archiving)
        #[arg(long, default_value = "backup")]
        work_dir: PathBuf,

        /// Directory the archive is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Delta sync source into destination, then extract and seed an archive
    Restore {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        dest: DestArgs,

        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        restore: RestoreArgs,
    },

    /// Copy records newer than the destination's watermark, per collection
    Sync {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        dest: DestArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Replace destination collections with the contents of record-set files
    Seed {
        #[command(flatten)]
        dest: DestArgs,

        #[command(flatten)]
        run: RunArgs,

        /// Archive to extract before seeding
        #[arg(long, env = "ARCHIVE_FILE_NAME", required_unless_present = "from_dir")]
        archive_file: Option<PathBuf>,

        /// Seed from an already extracted directory instead of an archive
        #[arg(long, conflicts_with = "archive_file")]
        from_dir: Option<PathBuf>,

        /// Directory the archive is extracted into
        #[arg(long, default_value = "restore")]
        extract_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cancel = setup_shutdown_handler();

    match cli.command {
        Commands::Backup {
            source,
            run,
            upload,
            archive,
            work_dir,
            output_dir,
        } => {
            let source_store = open(&source.source_uri, &run, "source").await?;

            let upload_store = match &upload.upload_to {
                Some(target) => {
                    let store = UploadTarget::parse(target)?.connect().await?;
                    Some((Arc::from(store), upload.upload_policy))
                }
                None => None,
            };
            let config = BackupConfig {
                work_dir,
                output_dir,
                db_name: run.db_name.clone(),
                grace_period: upload.grace_period,
                upload: upload_store,
                opts: SyncOpts::from(&run),
                date: chrono::Local::now().date_naive(),
            };
            let archiver = Archiver::new(Arc::new(TarZstdCodec::new(archive.compression_level)));

            let summary = pipeline::backup(&source_store, &archiver, &config, &cancel)
                .await
                .context("Backup failed")?;
            tracing::info!(
                "Backup complete: {}, archive {}",
                summary.export.summary(),
                summary.archive.path.display()
            );
            if let Some(target) = summary.uploaded_to {
                tracing::info!("Archive uploaded to {}", target);
            }
        }
        Commands::Restore {
            source,
            dest,
            run,
            restore,
        } => {
            let source_store = open(&source.source_uri, &run, "source").await?;
            let dest_store = open(&dest.dest_uri, &run, "destination").await?;
            let config = RestoreConfig {
                archive: restore.archive_file,
                extract_dir: restore.extract_dir,
                remove_archive: restore.remove_archive,
                opts: SyncOpts::from(&run),
            };

            let summary =
                pipeline::restore(&source_store, &dest_store, codec(), &config, &cancel)
                    .await
                    .context("Restore failed")?;
            tracing::info!(
                "Restore finished: sync {}; {} files extracted; seed {}",
                summary.sync.summary(),
                summary.files_extracted,
                summary.seed.summary()
            );
            if let Some(err) = summary.partial_failure() {
                return Err(err).context("Restore incomplete");
            }
        }
        Commands::Sync { source, dest, run } => {
            let source_store = open(&source.source_uri, &run, "source").await?;
            let dest_store = open(&dest.dest_uri, &run, "destination").await?;

            let report = delta::sync(&source_store, &dest_store, &SyncOpts::from(&run), &cancel)
                .await
                .context("Delta sync failed")?;
            report.into_result().context("Delta sync incomplete")?;
        }
        Commands::Seed {
            dest,
            run,
            archive_file,
            from_dir,
            extract_dir,
        } => {
            let dest_store = open(&dest.dest_uri, &run, "destination").await?;

            let dir = match (from_dir, archive_file) {
                (Some(dir), _) => dir,
                (None, Some(archive)) => {
                    let _lock = mongo_backup::lock::WorkdirLock::acquire(&extract_dir)?;
                    unpack::extract(codec(), &archive, &extract_dir)
                        .await
                        .with_context(|| format!("Failed to extract {}", archive.display()))?;
                    extract_dir
                }
                (None, None) => anyhow::bail!("either --archive-file or --from-dir is required"),
            };

            let report = seed::seed_dir(&dest_store, &dir, &SyncOpts::from(&run), &cancel)
                .await
                .context("Seeding failed")?;
            report.into_result().context("Seeding incomplete")?;
        }
    }

    Ok(())
}

async fn open(uri: &str, run: &RunArgs, role: &str) -> anyhow::Result<MongoStore> {
    connect(&ConnectOpts::new(uri, run.db_name.clone()))
        .await
        .with_context(|| format!("Failed to connect to {role} database"))
}

fn codec() -> Arc<dyn ArchiveCodec> {
    Arc::new(TarZstdCodec::default())
}

/// Cancel the run on Ctrl+C; units already started still finish.
fn setup_shutdown_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        tracing::info!("Received interrupt signal (Ctrl+C), finishing started work");
        token.cancel();
    });

    cancel
}
