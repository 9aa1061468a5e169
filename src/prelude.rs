//! Everything an application needs to read and write archived tables.
//!
//! ```ignore
//! use archivedb::prelude::*;
//! ```

pub use crate::persist::{
    ArchiveStorage, BackupDocument, ByteStore, FileByteStore, MemoryByteStore, PersistStatus,
    PersistenceMode, RestoreReport, StatusCallback, StorageConfig, TableName,
};
pub use crate::{DbError, ErrorKind, Result};

pub mod advanced {
    //! Engine-level access for tooling and tests.
    pub use crate::facade::{InMemoryDB, PreparedInsert};
    pub use crate::persist::{
        CountingStore, EngineHandle, PersistScheduler, SchedulerPhase, StoreStats,
    };
    pub use crate::result::QueryResult;
}
