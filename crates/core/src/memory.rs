//! In-memory DocumentStore.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::record::{cmp_ids, record_id, ID_FIELD};
use crate::{BackupError, DocumentStore, DocumentStream, Result};

/// A `DocumentStore` kept entirely in process memory.
///
/// Records without an `_id` get a fresh `ObjectId` on insert. Failures can
/// be injected per collection (`fail_collection`) or for the whole store
/// (`set_unreachable`) to exercise the pipeline's error policy.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    failing: RwLock<BTreeSet<String>>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create (or extend) a collection with the given records.
    pub async fn with_collection(self, collection: &str, records: Vec<Document>) -> Self {
        self.insert_records(collection, records).await;
        self
    }

    /// Snapshot of a collection in `_id` order.
    pub async fn records(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Make every operation on `collection` fail with a query error.
    pub async fn fail_collection(&self, collection: &str) {
        self.failing.write().await.insert(collection.to_string());
    }

    /// Make every operation fail with a connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    async fn check(&self, collection: Option<&str>) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BackupError::Connection(format!(
                "memory store '{}' is unreachable",
                self.name
            )));
        }
        if let Some(collection) = collection {
            if self.failing.read().await.contains(collection) {
                return Err(BackupError::query(collection, "injected failure"));
            }
        }
        Ok(())
    }

    async fn insert_records(&self, collection: &str, records: Vec<Document>) -> u64 {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        for mut record in records {
            if record_id(&record).is_none() {
                record.insert(ID_FIELD, ObjectId::new());
            }
            stored.push(record);
            inserted += 1;
        }
        stored.sort_by(|a, b| match (record_id(a), record_id(b)) {
            (Some(x), Some(y)) => cmp_ids(x, y),
            _ => std::cmp::Ordering::Equal,
        });
        inserted
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.check(None).await?;
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn max_id(&self, collection: &str) -> Result<Option<Bson>> {
        self.check(Some(collection)).await?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|records| records.iter().filter_map(record_id).max_by(|a, b| cmp_ids(a, b)))
            .cloned())
    }

    async fn find_after(&self, collection: &str, after: Option<&Bson>) -> Result<DocumentStream> {
        self.check(Some(collection)).await?;
        let records: Vec<Document> = self
            .records(collection)
            .await
            .into_iter()
            .filter(|record| match (after, record_id(record)) {
                (None, _) => true,
                (Some(watermark), Some(id)) => cmp_ids(id, watermark).is_gt(),
                (Some(_), None) => false,
            })
            .collect();
        Ok(futures::stream::iter(records.into_iter().map(Ok)).boxed())
    }

    async fn delete_all(&self, collection: &str) -> Result<u64> {
        self.check(Some(collection)).await?;
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|records| {
                let removed = records.len() as u64;
                records.clear();
                removed
            })
            .unwrap_or(0))
    }

    async fn insert_many(&self, collection: &str, records: Vec<Document>) -> Result<u64> {
        self.check(Some(collection)).await?;
        if records.is_empty() {
            return Ok(0);
        }
        Ok(self.insert_records(collection, records).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_find_after_is_exclusive_and_ordered() {
        let store = MemoryStore::new("db")
            .with_collection(
                "orders",
                vec![doc! { "_id": 3 }, doc! { "_id": 1 }, doc! { "_id": 2 }],
            )
            .await;

        let found: Vec<Document> = store
            .find_after("orders", Some(&Bson::Int32(1)))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<i32> = found.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_max_id_of_missing_collection_is_none() {
        let store = MemoryStore::new("db");
        assert_eq!(store.max_id("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_assigns_missing_ids() {
        let store = MemoryStore::new("db");
        store
            .insert_many("users", vec![doc! { "name": "a" }])
            .await
            .unwrap();
        let records = store.records("users").await;
        assert!(records[0].get_object_id("_id").is_ok());
    }

    #[tokio::test]
    async fn test_empty_insert_does_not_create_collection() {
        let store = MemoryStore::new("db");
        assert_eq!(store.insert_many("users", vec![]).await.unwrap(), 0);
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new("db")
            .with_collection("orders", vec![doc! { "_id": 1 }])
            .await;
        store.fail_collection("orders").await;
        assert!(matches!(
            store.max_id("orders").await,
            Err(BackupError::Query { .. })
        ));

        store.set_unreachable(true);
        let err = store.list_collections().await.unwrap_err();
        assert!(err.is_systemic());
    }
}
