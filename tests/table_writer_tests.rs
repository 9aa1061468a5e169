mod common;

use archivedb::{ArchiveStorage, DbError, ErrorKind, MemoryByteStore, PersistStatus, StorageConfig};
use common::{recorder, snapshot_records};
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_failure_on_second_record_keeps_previous_rows() {
    let storage = ArchiveStorage::in_memory();
    let original = vec![
        json!({"id": 10, "title": "Lease A"}),
        json!({"id": 11, "title": "Lease B"}),
    ];
    storage.replace_table("contracts", &original, None).await.unwrap();

    let (callback, seen) = recorder();
    let conflicting = vec![
        json!({"id": 1, "title": "new"}),
        json!({"id": 1, "title": "duplicate"}),
        json!({"id": 2, "title": "never reached"}),
    ];
    let err = storage
        .replace_table("contracts", &conflicting, Some(callback))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::ConstraintViolation(_)));
    assert_eq!(err.kind(), ErrorKind::QueryError);
    assert_eq!(*seen.lock().unwrap(), vec![PersistStatus::Error]);
    assert_eq!(storage.load_table("contracts").await.unwrap(), original);

    let engine = storage.ensure_ready().await;
    assert!(!engine.with_engine(|db| db.in_transaction()).await);
}

#[tokio::test]
async fn test_bad_id_fails_without_touching_table() {
    let storage = ArchiveStorage::in_memory();
    storage
        .replace_table("users", &[json!({"id": 1})], None)
        .await
        .unwrap();

    let err = storage
        .replace_table("users", &[json!({"id": 2}), json!({"id": "not-a-number"})], None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch(_)));
    assert_eq!(storage.load_table("users").await.unwrap(), vec![json!({"id": 1})]);
}

#[tokio::test]
async fn test_failed_write_schedules_nothing() {
    let store = Arc::new(MemoryByteStore::new());
    let storage = ArchiveStorage::with_shared_store(store.clone(), StorageConfig::new());
    storage.ensure_ready().await;

    let result = storage
        .replace_table("audit_log", &[json!({"id": 5}), json!({"id": 5})], None)
        .await;
    assert!(result.is_err());
    assert_eq!(
        storage.scheduler().await.phase(),
        archivedb::SchedulerPhase::Idle
    );
}

#[tokio::test]
async fn test_thousand_synthesized_ids_are_unique() {
    let storage = ArchiveStorage::in_memory();
    let records: Vec<JsonValue> = (0..1000).map(|i| json!({"seq": i})).collect();

    let written = storage
        .replace_table("audit_log", &records, None)
        .await
        .unwrap();
    assert_eq!(written, 1000);

    let engine = storage.ensure_ready().await;
    let ids = engine.query("SELECT id FROM audit_log").await.unwrap();
    let unique: HashSet<i64> = ids
        .rows
        .iter()
        .map(|row| row[0].as_i64().unwrap())
        .collect();
    assert_eq!(unique.len(), 1000);

    // Payloads are stored exactly as given
    assert_eq!(storage.load_table("audit_log").await.unwrap(), records);
}

#[tokio::test]
async fn test_replace_is_not_an_upsert() {
    let storage = ArchiveStorage::in_memory();
    storage
        .replace_table("users", &[json!({"id": 1}), json!({"id": 2})], None)
        .await
        .unwrap();
    storage
        .replace_table("users", &[json!({"id": 3})], None)
        .await
        .unwrap();
    assert_eq!(storage.load_table("users").await.unwrap(), vec![json!({"id": 3})]);

    storage.replace_table("users", &[], None).await.unwrap();
    assert!(storage.load_table("users").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_writers_never_interleave() {
    let storage = Arc::new(ArchiveStorage::in_memory());
    storage.ensure_ready().await;

    let writers: Vec<_> = (0..8)
        .map(|writer| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                let records: Vec<JsonValue> = (0..50)
                    .map(|i| json!({"id": i + 1, "writer": writer}))
                    .collect();
                storage.replace_table("contracts", &records, None).await
            })
        })
        .collect();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move { storage.load_table("contracts").await })
        })
        .collect();

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    for reader in readers {
        let records = reader.await.unwrap().unwrap();
        assert!(records.is_empty() || records.len() == 50);
        if let Some(first) = records.first() {
            assert!(records.iter().all(|r| r["writer"] == first["writer"]));
        }
    }

    let last = storage.load_table("contracts").await.unwrap();
    assert_eq!(last.len(), 50);
}

#[tokio::test]
async fn test_typed_roundtrip_through_snapshot() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct ContractType {
        id: i64,
        label: String,
    }

    let store = Arc::new(MemoryByteStore::new());
    let storage = ArchiveStorage::with_shared_store(store.clone(), StorageConfig::new());
    let types = vec![
        ContractType { id: 1, label: "Lease".into() },
        ContractType { id: 2, label: "Sale".into() },
    ];

    storage
        .replace_table_with("contract_types", &types, None)
        .await
        .unwrap();
    storage.flush_now().await.unwrap();

    let persisted = snapshot_records(&*store, "contract_types").await;
    let decoded: Vec<ContractType> = persisted
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
    assert_eq!(decoded, types);
}

#[tokio::test]
async fn test_max_explicit_id_leaves_synthesized_ids_working() {
    let storage = ArchiveStorage::in_memory();
    storage
        .replace_table("users", &[json!({"id": i64::MAX})], None)
        .await
        .unwrap();

    let drafts = vec![json!({"title": "a"}), json!({"title": "b"}), json!({"title": "c"})];
    storage.replace_table("contracts", &drafts, None).await.unwrap();
    assert_eq!(storage.load_table("contracts").await.unwrap(), drafts);

    let mixed = vec![
        json!({"id": i64::MAX, "event": "imported"}),
        json!({"event": "x"}),
        json!({"event": "y"}),
    ];
    storage.replace_table("audit_log", &mixed, None).await.unwrap();
    assert_eq!(storage.load_table("audit_log").await.unwrap(), mixed);
}

#[tokio::test]
async fn test_failed_write_does_not_move_id_floor() {
    let storage = ArchiveStorage::in_memory();
    let engine = storage.ensure_ready().await;
    let hour_ahead = chrono::Utc::now().timestamp_millis() * 1000 + 3_600_000_000;

    // Rejected while encoding
    let bad_id = vec![json!({"id": hour_ahead}), json!({"id": "abc"})];
    assert!(storage.replace_table("users", &bad_id, None).await.is_err());
    // Rolled back by the engine
    let duplicate = vec![json!({"id": hour_ahead}), json!({"id": hour_ahead})];
    assert!(storage.replace_table("users", &duplicate, None).await.is_err());

    storage
        .replace_table("contracts", &[json!({"title": "a"})], None)
        .await
        .unwrap();
    let ids = engine.query("SELECT id FROM contracts").await.unwrap();
    let id = ids.rows[0][0].as_i64().unwrap();
    assert!(id < hour_ahead, "{} should stay below {}", id, hour_ahead);
}
