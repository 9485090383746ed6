//! Delta copier behaviour against in-memory stores.

use bson::{doc, Bson, Document};
use mongo_backup::delta::{sync, sync_collection};
use mongo_backup::{BackupError, MemoryStore, SyncOpts};
use mongo_backup_core::record::is_copied;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn orders(ids: std::ops::RangeInclusive<i32>) -> Vec<Document> {
    ids.map(|id| doc! {"_id": id, "total": id * 10}).collect()
}

fn ids(records: &[Document]) -> Vec<Bson> {
    records.iter().map(|r| r.get("_id").cloned().unwrap()).collect()
}

#[tokio::test]
async fn test_copies_only_records_beyond_watermark() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=5))
        .await;
    let dest = MemoryStore::new("dest")
        .with_collection("orders", orders(1..=3))
        .await;
    let cancel = CancellationToken::new();

    let report = assert_ok!(sync(&source, &dest, &SyncOpts::default(), &cancel).await);
    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 1);
    let (name, outcome) = &report.succeeded[0];
    assert_eq!(name, "orders");
    assert_eq!(outcome.watermark, Some(Bson::Int32(3)));
    assert_eq!(outcome.copied, 2);

    let records = dest.records("orders").await;
    assert_eq!(ids(&records), (1..=5).map(Bson::Int32).collect::<Vec<_>>());
    for record in &records[..3] {
        assert!(!is_copied(record));
    }
    for record in &records[3..] {
        assert!(is_copied(record));
        assert_eq!(record.get_bool("copied").unwrap(), true);
    }

    // Second run: nothing new
    let report = assert_ok!(sync(&source, &dest, &SyncOpts::default(), &cancel).await);
    assert_eq!(report.succeeded[0].1.copied, 0);
    assert_eq!(dest.count("orders").await, 5);
}

#[tokio::test]
async fn test_empty_destination_gets_everything_in_batches() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=7))
        .await
        .with_collection("users", vec![doc! {"_id": "alice"}, doc! {"_id": "bob"}])
        .await;
    let dest = MemoryStore::new("dest");
    let opts = SyncOpts {
        batch_size: 3,
        ..SyncOpts::default()
    };

    let report = assert_ok!(sync(&source, &dest, &opts, &CancellationToken::new()).await);
    let names: Vec<_> = report.succeeded.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);
    assert_eq!(report.succeeded[0].1.watermark, None);
    assert_eq!(report.succeeded[0].1.copied, 7);
    assert_eq!(dest.count("orders").await, 7);
    assert_eq!(dest.count("users").await, 2);
    assert!(dest.records("users").await.iter().all(is_copied));
}

#[tokio::test]
async fn test_watermark_is_destination_maximum() {
    // Destination holds a record the source never had; its id is the watermark.
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=10))
        .await;
    let dest = MemoryStore::new("dest")
        .with_collection("orders", vec![doc! {"_id": 7, "manual": true}])
        .await;

    let outcome = assert_ok!(
        sync_collection(&source, &dest, "orders", &SyncOpts::default()).await
    );
    assert_eq!(outcome.watermark, Some(Bson::Int32(7)));
    assert_eq!(outcome.copied, 3);
    assert_eq!(
        ids(&dest.records("orders").await),
        vec![Bson::Int32(7), Bson::Int32(8), Bson::Int32(9), Bson::Int32(10)]
    );
}

#[tokio::test]
async fn test_failing_collection_does_not_stop_others() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=2))
        .await
        .with_collection("users", vec![doc! {"_id": 1}])
        .await;
    let dest = MemoryStore::new("dest");
    dest.fail_collection("orders").await;

    let report = assert_ok!(
        sync(&source, &dest, &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "orders");
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(dest.count("users").await, 1);

    let err = assert_err!(report.into_result());
    match err {
        BackupError::PartialFailure {
            succeeded, failed, ..
        } => {
            assert_eq!(succeeded, 1);
            assert_eq!(failed.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_destination_aborts() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=2))
        .await;
    let dest = MemoryStore::new("dest");
    dest.set_unreachable(true);

    let err = assert_err!(
        sync(&source, &dest, &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert!(matches!(err, BackupError::Connection(_)));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=4))
        .await;
    let dest = MemoryStore::new("dest");
    let opts = SyncOpts {
        dry_run: true,
        ..SyncOpts::default()
    };

    let report = assert_ok!(sync(&source, &dest, &opts, &CancellationToken::new()).await);
    assert_eq!(report.succeeded[0].1.copied, 4);
    assert_eq!(dest.count("orders").await, 0);
}

#[tokio::test]
async fn test_cancelled_sync_touches_nothing() {
    let source = MemoryStore::new("source")
        .with_collection("orders", orders(1..=4))
        .await;
    let dest = MemoryStore::new("dest");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(sync(&source, &dest, &SyncOpts::default(), &cancel).await);
    assert!(matches!(err, BackupError::Cancelled));
    assert_eq!(dest.count("orders").await, 0);
}
