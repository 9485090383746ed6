//! Full-replace seeding from record-set files.

use std::path::Path;

use bson::{doc, Document};
use mongo_backup::seed::seed_dir;
use mongo_backup::{BackupError, MemoryStore, SyncOpts};
use mongo_backup_core::record::is_copied;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

fn unrelated_users() -> Vec<Document> {
    (100..110).map(|id| doc! {"_id": id, "name": format!("old-{id}")}).collect()
}

#[tokio::test]
async fn test_seed_replaces_existing_collection() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("users.json"),
        r#"[{"_id": 1, "name": "alice"}, {"_id": 2, "name": "bob"}]"#,
    );
    let dest = MemoryStore::new("dest")
        .with_collection("users", unrelated_users())
        .await;

    let report = assert_ok!(
        seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert!(report.is_success());
    let (_, seeded) = &report.succeeded[0];
    assert_eq!(seeded.collection, "users");
    assert_eq!(seeded.deleted, 10);
    assert_eq!(seeded.inserted, 2);

    let users = dest.records("users").await;
    assert_eq!(
        users,
        vec![
            doc! {"_id": 1, "name": "alice"},
            doc! {"_id": 2, "name": "bob"}
        ]
    );
    assert!(users.iter().all(|u| !is_copied(u)));
}

#[tokio::test]
async fn test_seed_walks_nested_directories() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a/orders.json"), r#"[{"_id": 1}]"#);
    write(&dir.path().join("a/b/items.json"), r#"[{"_id": 1}, {"_id": 2}]"#);
    write(&dir.path().join("notes.txt"), "not a record set");
    let dest = MemoryStore::new("dest");

    let report = assert_ok!(
        seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await
    );
    let names: Vec<_> = report.succeeded.iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, vec!["a/b/items.json", "a/orders.json"]);
    assert_eq!(dest.count("orders").await, 1);
    assert_eq!(dest.count("items").await, 2);
    assert_eq!(dest.count("notes").await, 0);
}

#[tokio::test]
async fn test_bad_file_keeps_collection_and_continues() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("broken.json"), "[{\"_id\": 1},");
    write(&dir.path().join("scalar.json"), "[1, 2]");
    write(&dir.path().join("users.json"), r#"[{"_id": 1}]"#);
    let dest = MemoryStore::new("dest")
        .with_collection("broken", vec![doc! {"_id": "keep"}])
        .await;

    let report = assert_ok!(
        seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .all(|(_, e)| matches!(e, BackupError::InvalidRecordSet { .. })));
    assert_eq!(report.succeeded.len(), 1);

    assert_eq!(dest.records("broken").await, vec![doc! {"_id": "keep"}]);
    assert_eq!(dest.count("users").await, 1);
    assert!(report.partial_failure().is_some());
}

#[tokio::test]
async fn test_extended_json_ids_survive() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("events.json"),
        r#"[{"_id": {"$oid": "65a1b2c3d4e5f60718293a4b"}, "at": {"$date": "2024-01-05T10:00:00Z"}}]"#,
    );
    let dest = MemoryStore::new("dest");

    assert_ok!(seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await);
    let events = dest.records("events").await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get_object_id("_id").unwrap().to_hex(),
        "65a1b2c3d4e5f60718293a4b"
    );
    assert!(events[0].get_datetime("at").is_ok());
}

#[tokio::test]
async fn test_missing_directory_is_not_found() {
    let dir = TempDir::new().unwrap();
    let dest = MemoryStore::new("dest");
    let err = assert_err!(
        seed_dir(
            &dest,
            &dir.path().join("nope"),
            &SyncOpts::default(),
            &CancellationToken::new()
        )
        .await
    );
    assert!(matches!(err, BackupError::NotFound(_)));
}

#[tokio::test]
async fn test_unreachable_destination_aborts_walk() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("a.json"), "[]");
    write(&dir.path().join("b.json"), "[]");
    let dest = MemoryStore::new("dest");
    dest.set_unreachable(true);

    let err = assert_err!(
        seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert!(matches!(err, BackupError::Connection(_)));
}

#[tokio::test]
async fn test_repeated_id_keeps_collection() {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("users.json"),
        r#"[{"_id": 1, "name": "alice"}, {"_id": 1, "name": "bob"}]"#,
    );
    let dest = MemoryStore::new("dest")
        .with_collection("users", unrelated_users())
        .await;

    let report = assert_ok!(
        seed_dir(&dest, dir.path(), &SyncOpts::default(), &CancellationToken::new()).await
    );
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        BackupError::InvalidRecordSet { .. }
    ));
    assert_eq!(dest.records("users").await, unrelated_users());
}

#[tokio::test]
async fn test_cancelled_seed_leaves_destination_untouched() {
    let dir = TempDir::new().unwrap();
    write(&dir.path().join("users.json"), r#"[{"_id": 1}]"#);
    let dest = MemoryStore::new("dest")
        .with_collection("users", unrelated_users())
        .await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(seed_dir(&dest, dir.path(), &SyncOpts::default(), &cancel).await);
    assert!(matches!(err, BackupError::Cancelled));
    assert_eq!(dest.records("users").await, unrelated_users());
}
