use super::byte_store::{ByteStore, MemoryByteStore};
use super::config::StorageConfig;
use super::engine::EngineHandle;
use super::ids::IdGenerator;
use super::scheduler::{PersistScheduler, StatusCallback};
use crate::core::Result;
use crate::facade::InMemoryDB;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{Instrument, Level, event, info_span};

/// Whether mutations can reach the durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    Durable,
    /// The store could not be opened or read. Nothing survives a restart.
    MemoryOnly { reason: String },
}

impl PersistenceMode {
    pub fn is_durable(&self) -> bool {
        matches!(self, PersistenceMode::Durable)
    }
}

pub(crate) struct ReadyState {
    pub(crate) engine: EngineHandle,
    pub(crate) scheduler: PersistScheduler,
    pub(crate) mode: PersistenceMode,
}

/// The storage layer: one engine, one scheduler, one snapshot slot.
///
/// Nothing touches the store until the first call that needs the engine.
/// That call runs the bootstrap; concurrent first callers all await the
/// same run and share its engine.
///
/// # Examples
///
/// ```
/// use archivedb::ArchiveStorage;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let storage = ArchiveStorage::in_memory();
/// storage
///     .replace_table("users", &[json!({"id": 1, "name": "Ana"})], None)
///     .await
///     .unwrap();
///
/// let users = storage.load_table("users").await.unwrap();
/// assert_eq!(users[0]["name"], "Ana");
/// # });
/// ```
pub struct ArchiveStorage {
    store: Arc<dyn ByteStore>,
    config: StorageConfig,
    ids: IdGenerator,
    ready: OnceCell<ReadyState>,
}

impl ArchiveStorage {
    pub fn new<S>(store: S, config: StorageConfig) -> Self
    where
        S: ByteStore + 'static,
    {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<dyn ByteStore>, config: StorageConfig) -> Self {
        Self {
            store,
            config,
            ids: IdGenerator::new(),
            ready: OnceCell::new(),
        }
    }

    /// Storage over a process-local store with default configuration.
    pub fn in_memory() -> Self {
        Self::new(MemoryByteStore::new(), StorageConfig::new())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ByteStore> {
        Arc::clone(&self.store)
    }

    pub(crate) fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.initialized()
    }

    /// Runs the bootstrap once and returns the shared engine.
    pub async fn ensure_ready(&self) -> EngineHandle {
        self.ready().await.engine.clone()
    }

    pub async fn mode(&self) -> PersistenceMode {
        self.ready().await.mode.clone()
    }

    pub async fn scheduler(&self) -> PersistScheduler {
        self.ready().await.scheduler.clone()
    }

    /// Debounced flush request; see [`PersistScheduler::schedule`].
    pub async fn schedule_persist(&self, callback: Option<StatusCallback>) {
        self.ready().await.scheduler.schedule(callback);
    }

    pub async fn flush_now(&self) -> Result<()> {
        self.ready().await.scheduler.flush_now().await
    }

    /// Resolves once no flush is pending or running.
    pub async fn wait_idle(&self) {
        self.ready().await.scheduler.wait_idle().await;
    }

    pub(crate) async fn ready(&self) -> &ReadyState {
        self.ready
            .get_or_init(|| {
                let span = info_span!(
                    "archivedb.bootstrap",
                    database = %self.config.identity.database,
                    key = %self.config.identity.key
                );
                self.bootstrap().instrument(span)
            })
            .await
    }

    async fn bootstrap(&self) -> ReadyState {
        let key = &self.config.identity.key;

        if let Err(err) = self.store.open().await {
            return self.memory_only(format!("open failed: {}", err));
        }

        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(err) => return self.memory_only(format!("read failed: {}", err)),
        };

        let Some(bytes) = bytes else {
            event!(Level::INFO, "no snapshot found, creating schema");
            return self.fresh_durable().await;
        };

        match InMemoryDB::from_snapshot(&bytes) {
            Ok(mut db) => {
                let created = self.apply_schema(&mut db);
                event!(
                    Level::INFO,
                    bytes = bytes.len(),
                    tables = db.list_tables().len(),
                    created,
                    "snapshot restored"
                );
                let ready = self.durable(db);
                if created > 0 {
                    self.initial_flush(&ready).await;
                }
                ready
            }
            Err(err) => {
                let quarantine = self.config.identity.quarantine_key();
                event!(
                    Level::WARN,
                    error = %err,
                    quarantine = %quarantine,
                    "snapshot unreadable, moving it aside"
                );
                match self.store.put(&quarantine, &bytes).await {
                    Ok(()) => self.fresh_durable().await,
                    Err(put_err) => self.memory_only(format!(
                        "snapshot corrupt ({}) and could not be quarantined: {}",
                        err, put_err
                    )),
                }
            }
        }
    }

    /// Creates the configured tables that are missing. Returns how many were created.
    fn apply_schema(&self, db: &mut InMemoryDB) -> usize {
        let mut created = 0;
        for table in &self.config.tables {
            if db.table_exists(table.as_str()) {
                continue;
            }
            match db.execute(&table.create_sql()) {
                Ok(_) => created += 1,
                Err(err) => {
                    event!(Level::ERROR, table = %table, error = %err, "schema creation failed");
                }
            }
        }
        created
    }

    fn durable(&self, db: InMemoryDB) -> ReadyState {
        let engine = EngineHandle::new(db);
        let scheduler = PersistScheduler::new(
            engine.clone(),
            Arc::clone(&self.store),
            self.config.identity.key.clone(),
            self.config.debounce,
        );
        ReadyState {
            engine,
            scheduler,
            mode: PersistenceMode::Durable,
        }
    }

    async fn fresh_durable(&self) -> ReadyState {
        let mut db = InMemoryDB::new();
        self.apply_schema(&mut db);
        let ready = self.durable(db);
        self.initial_flush(&ready).await;
        ready
    }

    async fn initial_flush(&self, ready: &ReadyState) {
        if let Err(err) = ready.scheduler.flush_now().await {
            event!(Level::ERROR, error = %err, "initial snapshot write failed");
        }
    }

    fn memory_only(&self, reason: String) -> ReadyState {
        event!(
            Level::WARN,
            reason = %reason,
            "byte store unusable, continuing in memory-only mode"
        );
        let mut db = InMemoryDB::new();
        self.apply_schema(&mut db);
        let engine = EngineHandle::new(db);
        ReadyState {
            scheduler: PersistScheduler::disabled(engine.clone(), reason.clone()),
            engine,
            mode: PersistenceMode::MemoryOnly { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbError;
    use crate::persist::byte_store::CountingStore;
    use async_trait::async_trait;

    struct UnopenableStore;

    #[async_trait]
    impl ByteStore for UnopenableStore {
        async fn open(&self) -> Result<()> {
            Err(DbError::StoreUnavailable("blocked".into()))
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(DbError::IoFailure("not open".into()))
        }

        async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(DbError::IoFailure("not open".into()))
        }
    }

    #[tokio::test]
    async fn test_cold_start_writes_snapshot() {
        let store = Arc::new(CountingStore::new(MemoryByteStore::new()));
        let storage = ArchiveStorage::with_shared_store(store.clone(), StorageConfig::new());
        assert!(!storage.is_initialized());

        let engine = storage.ensure_ready().await;
        assert_eq!(storage.mode().await, PersistenceMode::Durable);
        assert_eq!(engine.list_tables().await.len(), 4);
        assert_eq!(store.stats().puts(), 1);

        let bytes = store.inner().get("sqlite_db_file").await.unwrap().unwrap();
        let snapshot = InMemoryDB::from_snapshot(&bytes).unwrap();
        assert!(snapshot.table_exists("contract_types"));
    }

    #[tokio::test]
    async fn test_second_call_reuses_engine() {
        let storage = ArchiveStorage::in_memory();
        let first = storage.ensure_ready().await;
        let second = storage.ensure_ready().await;
        assert!(first.ptr_eq(&second));
    }

    #[tokio::test]
    async fn test_unopenable_store_degrades_to_memory_only() {
        let storage = ArchiveStorage::new(UnopenableStore, StorageConfig::new());
        let engine = storage.ensure_ready().await;

        assert!(matches!(
            storage.mode().await,
            PersistenceMode::MemoryOnly { .. }
        ));
        assert_eq!(engine.list_tables().await.len(), 4);
        assert!(storage.flush_now().await.is_err());
    }
}
