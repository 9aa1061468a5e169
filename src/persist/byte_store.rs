use super::config::{StoreIdentity, validate_store_name};
use crate::core::{DbError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::RwLock;

/// Durable keyed blob storage.
///
/// `open` must be idempotent: the first call creates whatever structure the
/// backend needs, later calls leave existing data alone.
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

#[async_trait]
impl<S: ByteStore + ?Sized> ByteStore for Arc<S> {
    async fn open(&self) -> Result<()> {
        (**self).open().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes).await
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryByteStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    opened: AtomicBool,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ByteStore for MemoryByteStore {
    async fn open(&self) -> Result<()> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// Directory-backed store: one file per key under
/// `<root>/<database>/<collection>/`.
#[derive(Debug, Clone)]
pub struct FileByteStore {
    dir: PathBuf,
}

impl FileByteStore {
    pub fn new(root: impl AsRef<Path>, identity: &StoreIdentity) -> Self {
        Self {
            dir: root
                .as_ref()
                .join(&identity.database)
                .join(&identity.collection),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`. Keys that are not a plain file name are rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_store_name("key", key)?;
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl ByteStore for FileByteStore {
    async fn open(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|err| {
            DbError::StoreUnavailable(format!(
                "Failed to create store directory '{}': {}",
                self.dir.display(),
                err
            ))
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DbError::IoFailure(format!(
                "Failed to read '{}': {}",
                path.display(),
                err
            ))),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.path_for(key)?;
        let bytes = bytes.to_vec();

        // Temp file in the target directory so the rename never crosses filesystems
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|err| {
                DbError::IoFailure(format!(
                    "Failed to create temp file in '{}': {}",
                    dir.display(),
                    err
                ))
            })?;
            tmp.write_all(&bytes)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|err| DbError::IoFailure(format!("Failed to write temp file: {}", err)))?;
            tmp.persist(&path).map_err(|err| {
                DbError::IoFailure(format!(
                    "Failed to rename temp file -> '{}': {}",
                    path.display(),
                    err.error
                ))
            })?;
            Ok(())
        })
        .await
        .map_err(|err| DbError::IoFailure(format!("Write task failed: {}", err)))?
    }
}

// ============================================================================
// Counting wrapper
// ============================================================================

/// Operation counters collected by [`CountingStore`].
#[derive(Debug, Default)]
pub struct StoreStats {
    opens: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
    failures: AtomicUsize,
}

impl StoreStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Passes every call through to `inner` and counts it.
pub struct CountingStore<S> {
    inner: S,
    stats: Arc<StoreStats>,
}

impl<S: ByteStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(StoreStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.stats.failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl<S: ByteStore> ByteStore for CountingStore<S> {
    async fn open(&self) -> Result<()> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.track(self.inner.open().await)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.stats.gets.fetch_add(1, Ordering::SeqCst);
        self.track(self.inner.get(key).await)
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.stats.puts.fetch_add(1, Ordering::SeqCst);
        self.track(self.inner.put(key, bytes).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryByteStore::new();
        store.open().await.unwrap();
        assert!(store.is_open());
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", b"v1").await.unwrap();
        store.put("k", b"v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.keys().await, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_open_is_idempotent() {
        let root = TempDir::new().unwrap();
        let store = FileByteStore::new(root.path(), &StoreIdentity::default());

        store.open().await.unwrap();
        store.put("sqlite_db_file", b"snapshot").await.unwrap();
        store.open().await.unwrap();

        assert_eq!(
            store.get("sqlite_db_file").await.unwrap(),
            Some(b"snapshot".to_vec())
        );
        assert_eq!(store.get("other").await.unwrap(), None);
        assert!(
            store
                .dir()
                .ends_with(Path::new("ArchivingSystemSQLite").join("sqlite_store"))
        );
    }

    #[tokio::test]
    async fn test_file_store_put_replaces_whole_blob() {
        let root = TempDir::new().unwrap();
        let store = FileByteStore::new(root.path(), &StoreIdentity::default());
        store.open().await.unwrap();

        store.put("k", b"a much longer first value").await.unwrap();
        store.put("k", b"short").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"short".to_vec()));

        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != "k")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_keys_outside_its_directory() {
        let root = TempDir::new().unwrap();
        let store = FileByteStore::new(root.path(), &StoreIdentity::default());
        store.open().await.unwrap();

        assert!(store.put("../escape", b"x").await.is_err());
        assert!(store.put("nested/key", b"x").await.is_err());
        assert!(store.get("../escape").await.is_err());
        assert!(!store.dir().join("../escape").exists());
        assert!(store.path_for("sqlite_db_file.corrupt").is_ok());
    }

    #[tokio::test]
    async fn test_file_store_unopened_put_fails_with_io() {
        let root = TempDir::new().unwrap();
        let store = FileByteStore::new(root.path().join("missing"), &StoreIdentity::default());
        let err = store.put("k", b"x").await.unwrap_err();
        assert!(matches!(err, DbError::IoFailure(_)));
    }

    #[tokio::test]
    async fn test_counting_store() {
        let store = CountingStore::new(MemoryByteStore::new());
        let stats = store.stats();

        store.open().await.unwrap();
        store.put("k", b"1").await.unwrap();
        store.put("k", b"2").await.unwrap();
        store.get("k").await.unwrap();

        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.puts(), 2);
        assert_eq!(stats.gets(), 1);
        assert_eq!(stats.failures(), 0);
    }
}
