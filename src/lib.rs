// ============================================================================
// ArchiveDB Library
// ============================================================================
//
// An embedded in-memory SQL engine whose whole state is mirrored, as one
// snapshot blob, into a durable byte store. Writes land in memory at once
// and reach the store through a debounced flush.

pub mod core;
pub mod facade;
pub mod persist;
pub mod prelude;
pub mod result;
pub mod storage;
mod evaluator;
mod executor;
mod parser;

// Re-export main types for convenience
pub use core::{DataType, DbError, ErrorKind, Result, Value};
pub use facade::{InMemoryDB, PreparedInsert};
pub use result::QueryResult;

pub use persist::{
    ArchiveStorage, BackupDocument, ByteStore, CountingStore, EngineHandle, FileByteStore,
    KNOWN_TABLES, MemoryByteStore, PersistScheduler, PersistStatus, PersistenceMode,
    RestoreReport, SchedulerPhase, StatusCallback, StorageConfig, StoreIdentity, StoreStats,
    TableName,
};
