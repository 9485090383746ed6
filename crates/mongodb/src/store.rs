//! `DocumentStore` implementation for MongoDB.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongo_backup_core::record::ID_FIELD;
use mongo_backup_core::{BackupError, DocumentStore, DocumentStream, Result};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::{Client as MongoClient, Collection, Database, IndexModel};

/// Cursor batch size used when streaming a collection.
const CURSOR_BATCH_SIZE: u32 = 1000;

/// Prefix of the scratch collections `replace_all` fills before swapping them in.
const STAGING_PREFIX: &str = "mongo_backup_staging.";

/// Server error code for a missing namespace.
const NAMESPACE_NOT_FOUND: i32 = 26;

/// A MongoDB database handle.
#[derive(Clone, Debug)]
pub struct MongoStore {
    client: MongoClient,
    database: Database,
}

/// Map a driver error to the pipeline taxonomy.
///
/// Errors that mean the server cannot be reached are systemic; everything
/// else is local to the collection being worked on.
pub(crate) fn classify(err: mongodb::error::Error, collection: &str) -> BackupError {
    let unreachable = matches!(
        err.kind.as_ref(),
        ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
    );
    if unreachable {
        BackupError::Connection(err.to_string())
    } else {
        BackupError::query(collection, err)
    }
}

impl MongoStore {
    pub fn new(client: MongoClient, database: Database) -> Self {
        Self { client, database }
    }

    /// Schema-less accessor; the collection itself is created by the first write.
    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }

    /// Recreate the secondary indexes of `from` on `to`.
    async fn copy_indexes(&self, from: &str, to: &str) -> Result<()> {
        let indexes: Vec<IndexModel> = match self.collection(from).list_indexes().await {
            Ok(cursor) => cursor.try_collect().await.map_err(|e| classify(e, from))?,
            Err(e) if is_namespace_not_found(&e) => return Ok(()),
            Err(e) => return Err(classify(e, from)),
        };
        let secondary: Vec<IndexModel> = indexes
            .into_iter()
            .filter(|index| {
                index.options.as_ref().and_then(|o| o.name.as_deref()) != Some("_id_")
            })
            .collect();
        if secondary.is_empty() {
            return Ok(());
        }
        tracing::debug!("Copying {} indexes from '{}' to '{}'", secondary.len(), from, to);
        self.collection(to)
            .create_indexes(secondary)
            .await
            .map_err(|e| classify(e, to))?;
        Ok(())
    }

    async fn fill_and_swap(
        &self,
        collection: &str,
        staging: &str,
        records: Vec<Document>,
    ) -> Result<(u64, u64)> {
        self.database
            .create_collection(staging)
            .await
            .map_err(|e| classify(e, staging))?;
        let inserted = self.insert_many(staging, records).await?;
        self.copy_indexes(collection, staging).await?;

        let deleted = self
            .collection(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| classify(e, collection))?;
        let db = self.name();
        self.client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{db}.{staging}"),
                "to": format!("{db}.{collection}"),
                "dropTarget": true,
            })
            .await
            .map_err(|e| classify(e, collection))?;
        Ok((deleted, inserted))
    }
}

fn is_namespace_not_found(err: &mongodb::error::Error) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(e) if e.code == NAMESPACE_NOT_FOUND)
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &str {
        self.database.name()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = self
            .database
            .list_collection_names()
            .await
            .map_err(|e| classify(e, "<list>"))?;
        names.retain(|name| !name.starts_with("system.") && !name.starts_with(STAGING_PREFIX));
        names.sort();
        tracing::debug!("Collections in '{}': {:?}", self.name(), names);
        Ok(names)
    }

    async fn max_id(&self, collection: &str) -> Result<Option<Bson>> {
        let last = self
            .collection(collection)
            .find_one(doc! {})
            .sort(doc! { "_id": -1 })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(last.and_then(|mut record| record.remove(ID_FIELD)))
    }

    async fn find_after(&self, collection: &str, after: Option<&Bson>) -> Result<DocumentStream> {
        let filter = match after {
            Some(watermark) => doc! { "_id": { "$gt": watermark.clone() } },
            None => doc! {},
        };
        let cursor = self
            .collection(collection)
            .find(filter)
            .sort(doc! { "_id": 1 })
            .batch_size(CURSOR_BATCH_SIZE)
            .await
            .map_err(|e| classify(e, collection))?;

        let name = collection.to_string();
        Ok(cursor
            .map(move |item| item.map_err(|e| classify(e, &name)))
            .boxed())
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        let result = self
            .collection(collection)
            .delete_many(doc! {})
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(result.deleted_count)
    }

    async fn insert_many(&self, collection: &str, records: Vec<Document>) -> Result<u64> {
        // The driver rejects empty batches
        if records.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(collection)
            .insert_many(records)
            .await
            .map_err(|e| classify(e, collection))?;
        Ok(result.inserted_ids.len() as u64)
    }

    /// Fill a staging collection, then rename it over `collection`.
    ///
    /// The live collection is only touched by the final rename, so an insert
    /// that fails halfway (a duplicate `_id`, a lost connection) leaves it
    /// exactly as it was.
    async fn replace_all(&self, collection: &str, records: Vec<Document>) -> Result<(u64, u64)> {
        let staging = format!("{STAGING_PREFIX}{collection}");
        let scratch = self.collection(&staging);
        scratch.drop().await.map_err(|e| classify(e, &staging))?;

        let outcome = self.fill_and_swap(collection, &staging, records).await;
        if outcome.is_err() {
            if let Err(e) = scratch.drop().await {
                tracing::warn!("Failed to drop staging collection '{}': {}", staging, e);
            }
        }
        outcome
    }
}
