//! Integration tests for the JSON queue store

use chrono::{TimeZone, Utc};
use tern_core::QueueStore;
use tern_domain::{FailedPost, PostFailureKind, QueueSnapshot, QueuedPost, TernError};
use tern_infra::JsonQueueStore;
use uuid::Uuid;

fn queued(text: &str, attempts: u32) -> QueuedPost {
    let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    QueuedPost {
        id: Uuid::new_v4(),
        text: text.to_string(),
        created_at,
        attempt_count: attempts,
        last_error_kind: PostFailureKind::Network,
        next_retry_at: created_at + chrono::Duration::seconds(4),
    }
}

#[tokio::test]
async fn missing_file_loads_as_empty_queue() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonQueueStore::new(dir.path().join("queue.json"));

    assert_eq!(store.load().await.unwrap(), QueueSnapshot::default());
}

#[tokio::test]
async fn saved_queue_survives_a_new_store_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("queue.json");

    let failed_post = queued("too long", 1);
    let snapshot = QueueSnapshot {
        pending: vec![queued("first", 1), queued("second", 2)],
        failed: vec![FailedPost {
            failed_at: failed_post.created_at,
            reason: "text is too long".into(),
            post: QueuedPost { last_error_kind: PostFailureKind::InvalidContent, ..failed_post },
        }],
    };

    JsonQueueStore::new(&path).save(&snapshot).await.unwrap();
    assert!(!path.with_file_name("queue.json.tmp").exists(), "temp file renamed away");

    let reloaded = JsonQueueStore::new(&path).load().await.unwrap();
    assert_eq!(reloaded, snapshot);
}

#[tokio::test]
async fn document_is_versioned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    JsonQueueStore::new(&path).save(&QueueSnapshot::default()).await.unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert!(raw["pending"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(&path, r#"{"version": 99, "pending": [], "failed": []}"#).unwrap();

    let err = JsonQueueStore::new(&path).load().await.unwrap_err();
    assert!(matches!(err, TernError::Storage(msg) if msg.contains("99")));
}

#[tokio::test]
async fn corrupt_file_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(&path, "{ truncated").unwrap();

    let err = JsonQueueStore::new(&path).load().await.unwrap_err();
    assert!(matches!(err, TernError::Storage(_)));
}
