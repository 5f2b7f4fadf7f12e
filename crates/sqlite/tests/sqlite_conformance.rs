//! Runs the shared `VersionStore` conformance suite against SQLite, both
//! in-memory and file-backed, plus durability checks that only a file can show.

use promptgate_sqlite::SqliteVersionStore;
use promptgate_storage::conformance::run_conformance_suite;
use promptgate_storage::{ApprovalStatus, StorageError, VersionRecord, VersionStore};

#[tokio::test]
async fn in_memory_conformance() {
    let report = run_conformance_suite(|| async {
        SqliteVersionStore::open_in_memory().expect("open in-memory sqlite")
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_conformance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let path = dir.path().join(format!("conformance-{n}.db"));
        async move { SqliteVersionStore::open(&path).expect("open sqlite file") }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test]
async fn decisions_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gate.db");

    {
        let store = SqliteVersionStore::open(&path).unwrap();
        store
            .put(VersionRecord::pending("p1", "1", "v1 text"))
            .await
            .unwrap();
        store
            .update_status("p1", "1", ApprovalStatus::Approved)
            .await
            .unwrap();
    }

    let reopened = SqliteVersionStore::open(&path).unwrap();
    let rec = reopened.get("p1", "1").await.unwrap();
    assert_eq!(rec.status, ApprovalStatus::Approved);
    assert_eq!(rec.prompt_text, "v1 text");

    let err = reopened
        .update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
}

#[tokio::test]
async fn two_handles_on_one_file_share_conditional_update() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared.db");
    let a = SqliteVersionStore::open(&path).unwrap();
    let b = SqliteVersionStore::open(&path).unwrap();

    a.put(VersionRecord::pending("p1", "1", "t")).await.unwrap();
    let first = b
        .update_status("p1", "1", ApprovalStatus::Rejected)
        .await
        .unwrap();
    assert!(first.changed);

    let second = a.update_status("p1", "1", ApprovalStatus::Approved).await;
    assert!(matches!(second, Err(StorageError::Conflict { .. })));
}
