//! DocumentStore capability trait.
//!
//! The engine never talks to a database driver directly. Every component
//! receives explicit `DocumentStore` handles, so the same delta copier or
//! seeder runs against MongoDB in production and `MemoryStore` in tests.

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;

use crate::Result;

/// Lazily consumed sequence of records, backed by a database cursor.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Trait for schema-less document databases.
///
/// # Usage Pattern
///
/// Engine functions are generic over the store, so after the CLI picks an
/// implementation every call is statically dispatched:
///
/// ```ignore
/// pub async fn sync<S: DocumentStore, D: DocumentStore>(source: &S, dest: &D, ...) {
///     let watermark = dest.max_id("orders").await?;
///     let mut newer = source.find_after("orders", watermark.as_ref()).await?;
///     ...
/// }
/// ```
///
/// Accessors for a collection are resolved on demand; writing to a collection
/// that does not exist yet creates it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Database name, used in logs and archive file names.
    fn name(&self) -> &str;

    /// Names of all user collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Highest `_id` currently stored, `None` if the collection is empty or absent.
    async fn max_id(&self, collection: &str) -> Result<Option<Bson>>;

    /// Stream the records whose `_id` is strictly greater than `after`
    /// (every record when `after` is `None`), in ascending `_id` order.
    async fn find_after(&self, collection: &str, after: Option<&Bson>) -> Result<DocumentStream>;

    /// Delete every record of a collection, returning how many were removed.
    async fn delete_all(&self, collection: &str) -> Result<u64>;

    /// Insert records in the given order, returning how many were written.
    ///
    /// An empty batch is a no-op.
    async fn insert_many(&self, collection: &str, records: Vec<Document>) -> Result<u64>;

    /// Replace the whole contents of a collection.
    ///
    /// This is the unit of work of a full-replace restore: callers never
    /// interrupt it halfway. Returns `(deleted, inserted)`.
    async fn replace_all(&self, collection: &str, records: Vec<Document>) -> Result<(u64, u64)> {
        let deleted = self.delete_all(collection).await?;
        let inserted = self.insert_many(collection, records).await?;
        Ok((deleted, inserted))
    }
}
