#![allow(dead_code)]

use archivedb::{ByteStore, DbError, InMemoryDB, MemoryByteStore, PersistStatus, Result, StatusCallback};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const KEY: &str = "sqlite_db_file";

/// Callback that records every status it receives.
pub fn recorder() -> (StatusCallback, Arc<Mutex<Vec<PersistStatus>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: StatusCallback = Arc::new(move |status: PersistStatus| {
        sink.lock().unwrap().push(status);
    });
    (callback, seen)
}

/// Decodes the snapshot held by `store` and returns the payloads of `table`.
pub async fn snapshot_records(store: &dyn ByteStore, table: &str) -> Vec<JsonValue> {
    let bytes = store
        .get(KEY)
        .await
        .unwrap()
        .expect("snapshot should exist");
    let db = InMemoryDB::from_snapshot(&bytes).unwrap();
    db.query(&format!("SELECT data FROM {}", table))
        .unwrap()
        .rows
        .iter()
        .map(|row| serde_json::from_str(row[0].as_str().unwrap()).unwrap())
        .collect()
}

/// Which operation of [`FailingStore`] errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Open,
    Get,
    Put,
}

/// Memory store with one operation broken.
pub struct FailingStore {
    pub inner: MemoryByteStore,
    pub fail_on: FailOn,
    pub armed: AtomicBool,
}

impl FailingStore {
    pub fn new(fail_on: FailOn) -> Self {
        Self {
            inner: MemoryByteStore::new(),
            fail_on,
            armed: AtomicBool::new(true),
        }
    }

    fn fails(&self, op: FailOn) -> bool {
        self.fail_on == op && self.armed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteStore for FailingStore {
    async fn open(&self) -> Result<()> {
        if self.fails(FailOn::Open) {
            return Err(DbError::StoreUnavailable("quota exceeded".into()));
        }
        self.inner.open().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fails(FailOn::Get) {
            return Err(DbError::IoFailure("read aborted".into()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.fails(FailOn::Put) {
            return Err(DbError::IoFailure("write aborted".into()));
        }
        self.inner.put(key, bytes).await
    }
}

/// Memory store whose writes block, while `hold` is set, until a permit
/// is released.
pub struct GatedStore {
    pub inner: MemoryByteStore,
    pub hold: AtomicBool,
    pub gate: Semaphore,
}

impl GatedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryByteStore::new(),
            hold: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ByteStore for GatedStore {
    async fn open(&self) -> Result<()> {
        self.inner.open().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.hold.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|err| DbError::IoFailure(err.to_string()))?;
            permit.forget();
        }
        self.inner.put(key, bytes).await
    }
}
