//! Core types for mongo-backup.
//!
//! This crate provides the foundational pieces shared by every stage of the
//! backup/restore pipeline:
//!
//! - [`BackupError`] - The error taxonomy (connection, not-found, corrupt archive, ...)
//! - [`Report`] - Per-unit outcome aggregation with partial-failure reporting
//! - [`DocumentStore`] - The database capability consumed by the engine
//! - [`MemoryStore`] - An in-process `DocumentStore` used by tests and dry runs
//! - [`record`] - Identifier ordering, provenance tagging and record-set encoding
//!
//! # Architecture
//!
//! ```text
//! mongo-backup-core (this crate)
//!    │
//!    ├─── mongo-backup-mongodb  (implements DocumentStore over the mongodb driver)
//!    ├─── mongo-backup-archive  (archive codec, reports CorruptArchive / Io)
//!    ├─── mongo-backup-file     (directory walk and object storage upload)
//!    └─── mongo-backup          (exporter, archiver, unpacker, seeder, delta copier)
//! ```

mod error;
mod memory;
pub mod record;
mod report;
mod store;

pub use bson::{Bson, Document};
pub use error::{BackupError, Result};
pub use memory::MemoryStore;
pub use report::Report;
pub use store::{DocumentStore, DocumentStream};
