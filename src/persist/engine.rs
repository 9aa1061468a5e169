use crate::core::{Result, Value};
use crate::facade::InMemoryDB;
use crate::result::QueryResult;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to the single engine instance of a storage layer.
///
/// Every access goes through one async mutex, so a closure passed to
/// [`EngineHandle::with_engine`] is a critical section: no other reader or
/// writer observes the engine until it returns.
#[derive(Clone)]
pub struct EngineHandle {
    db: Arc<Mutex<InMemoryDB>>,
}

impl EngineHandle {
    pub fn new(db: InMemoryDB) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn shared_db(&self) -> Arc<Mutex<InMemoryDB>> {
        self.db.clone()
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.db.lock().await.execute(sql)
    }

    pub async fn execute_with_params(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.db.lock().await.execute_with_params(sql, params)
    }

    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.db.lock().await.query(sql)
    }

    pub async fn export_bytes(&self) -> Result<Vec<u8>> {
        self.db.lock().await.export_bytes()
    }

    pub async fn list_tables(&self) -> Vec<String> {
        self.db.lock().await.list_tables()
    }

    pub async fn with_engine<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut InMemoryDB) -> T,
    {
        let mut db = self.db.lock().await;
        f(&mut db)
    }

    pub fn ptr_eq(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.db, &other.db)
    }
}
