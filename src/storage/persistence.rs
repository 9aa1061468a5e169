//! Snapshot codec: the whole engine state as one self-describing byte blob

use crate::core::{DbError, Result};
use crate::storage::InMemoryStorage;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Leading bytes of every exported snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"ARCHVDB\x01";
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub storage: InMemoryStorage,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: i64,
    pub row_count: usize,
    pub table_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(storage: InMemoryStorage) -> Self {
        let row_count = storage.total_rows();
        let table_count = storage.table_names().len();

        Self {
            version: SNAPSHOT_VERSION,
            storage,
            metadata: SnapshotMetadata {
                created_at: Utc::now().timestamp_millis(),
                row_count,
                table_count,
            },
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = rmp_serde::to_vec(self)
            .map_err(|e| DbError::SerializationError(format!("Failed to serialize snapshot: {}", e)))?;
        let mut bytes = Vec::with_capacity(SNAPSHOT_MAGIC.len() + body.len());
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(SNAPSHOT_MAGIC.as_slice())
            .ok_or_else(|| DbError::CorruptSnapshot("missing snapshot header".into()))?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(body)
            .map_err(|e| DbError::CorruptSnapshot(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DbError::CorruptSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        snapshot.storage.check_integrity()?;
        Ok(snapshot)
    }
}
