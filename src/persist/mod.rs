//! Durability layer: keeps one in-memory engine and mirrors it, as a single
//! snapshot blob, into a byte store.

pub mod backup;
pub mod bootstrap;
pub mod byte_store;
pub mod config;
pub mod engine;
pub mod ids;
pub mod scheduler;
pub mod writer;

pub use backup::{BackupDocument, RestoreReport};
pub use bootstrap::{ArchiveStorage, PersistenceMode};
pub use byte_store::{ByteStore, CountingStore, FileByteStore, MemoryByteStore, StoreStats};
pub use config::{KNOWN_TABLES, StorageConfig, StoreIdentity, TableName};
pub use engine::EngineHandle;
pub use ids::IdGenerator;
pub use scheduler::{PersistScheduler, PersistStatus, SchedulerPhase, StatusCallback};
pub use writer::record_id;
