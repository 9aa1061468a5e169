use super::bootstrap::ArchiveStorage;
use super::config::TableName;
use super::ids::IdGenerator;
use super::scheduler::{PersistStatus, StatusCallback};
use crate::core::{DbError, Result, Value};
use crate::facade::InMemoryDB;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{Level, event};

impl ArchiveStorage {
    /// Replaces every row of `table` with `records`, then schedules a flush.
    ///
    /// The delete and all inserts run in one engine transaction under the
    /// engine lock. On failure the table keeps its previous rows, `callback`
    /// receives `Error` and nothing is scheduled. Returns the number of rows
    /// written.
    pub async fn replace_table(
        &self,
        table: &str,
        records: &[JsonValue],
        callback: Option<StatusCallback>,
    ) -> Result<usize> {
        let result = self.replace_rows(table, records).await;
        match result {
            Ok(written) => {
                self.schedule_persist(callback).await;
                Ok(written)
            }
            Err(err) => {
                event!(Level::ERROR, table = %table, error = %err, "table replace rolled back");
                if let Some(callback) = callback {
                    callback(PersistStatus::Error);
                }
                Err(err)
            }
        }
    }

    /// Typed form of [`ArchiveStorage::replace_table`].
    pub async fn replace_table_with<T: Serialize>(
        &self,
        table: &str,
        records: &[T],
        callback: Option<StatusCallback>,
    ) -> Result<usize> {
        let encoded = match records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(encoded) => encoded,
            Err(err) => {
                if let Some(callback) = callback {
                    callback(PersistStatus::Error);
                }
                return Err(err.into());
            }
        };
        self.replace_table(table, &encoded, callback).await
    }

    /// Same transaction as `replace_table`, without scheduling.
    pub(crate) async fn replace_rows(&self, table: &str, records: &[JsonValue]) -> Result<usize> {
        let name = TableName::new(table)?;
        let batch = encode_rows(records, self.ids())?;
        let engine = self.ensure_ready().await;

        let written = engine
            .with_engine(|db| {
                ensure_table(db, &name)?;
                db.begin()?;
                match write_rows(db, &name, &batch.rows) {
                    Ok(written) => {
                        db.commit()?;
                        Ok(written)
                    }
                    Err(err) => {
                        db.rollback()?;
                        Err(err)
                    }
                }
            })
            .await?;

        for id in batch.explicit {
            self.ids().observe(id);
        }
        event!(Level::DEBUG, table = %name, rows = written, "table replaced");
        Ok(written)
    }

    /// All records of `table` in stored order. A missing table is created
    /// and reads as empty.
    pub async fn load_table(&self, table: &str) -> Result<Vec<JsonValue>> {
        let name = TableName::new(table)?;
        let engine = self.ensure_ready().await;
        engine.with_engine(|db| read_records(db, &name)).await
    }

    pub async fn load_table_as<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        self.load_table(table)
            .await?
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(DbError::from))
            .collect()
    }

    /// Records of `table`, or `default` when the table is empty or unreadable.
    pub async fn load_table_or_default<T: DeserializeOwned>(
        &self,
        table: &str,
        default: Vec<T>,
    ) -> Vec<T> {
        match self.load_table_as(table).await {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => default,
            Err(err) => {
                event!(Level::ERROR, table = %table, error = %err, "table load failed");
                default
            }
        }
    }
}

/// Decoded payloads of `name`, creating the table when it is missing.
pub(crate) fn read_records(db: &mut InMemoryDB, name: &TableName) -> Result<Vec<JsonValue>> {
    ensure_table(db, name)?;
    let result = db.query(&format!("SELECT data FROM {}", name))?;

    result
        .rows
        .iter()
        .map(|row| match row.first() {
            Some(Value::Text(text)) => {
                serde_json::from_str::<JsonValue>(text).map_err(DbError::from)
            }
            Some(Value::Null) | None => Ok(JsonValue::Null),
            Some(other) => Err(DbError::SerializationError(format!(
                "Payload in '{}' is {} not TEXT",
                name,
                other.type_name()
            ))),
        })
        .collect()
}

fn ensure_table(db: &mut InMemoryDB, name: &TableName) -> Result<()> {
    if !db.table_exists(name.as_str()) {
        db.execute(&name.create_sql())?;
        event!(Level::INFO, table = %name, "table created on demand");
    }
    Ok(())
}

fn write_rows(db: &mut InMemoryDB, name: &TableName, rows: &[(i64, String)]) -> Result<usize> {
    db.execute(&format!("DELETE FROM {}", name))?;

    let mut insert = db.prepare_insert(name.as_str(), &["id", "data"])?;
    for (id, payload) in rows {
        insert.run(&[Value::Integer(*id), Value::Text(payload.clone())])?;
    }
    Ok(insert.release())
}

/// Row values of one batch, plus the explicit ids it carries.
struct EncodedBatch {
    rows: Vec<(i64, String)>,
    explicit: Vec<i64>,
}

fn encode_rows(records: &[JsonValue], ids: &IdGenerator) -> Result<EncodedBatch> {
    let explicit = records
        .iter()
        .map(explicit_id)
        .collect::<Result<Vec<_>>>()?;
    let taken: HashSet<i64> = explicit.iter().flatten().copied().collect();

    let mut rows = Vec::with_capacity(records.len());
    for (record, id) in records.iter().zip(&explicit) {
        let id = match id {
            Some(id) => *id,
            None => fresh_id(ids, &taken)?,
        };
        rows.push((id, serde_json::to_string(record)?));
    }

    Ok(EncodedBatch {
        rows,
        explicit: taken.into_iter().collect(),
    })
}

fn fresh_id(ids: &IdGenerator, taken: &HashSet<i64>) -> Result<i64> {
    loop {
        let id = ids.next_id()?;
        if !taken.contains(&id) {
            return Ok(id);
        }
    }
}

/// The record's own `id` when it carries a usable one, else a fresh one.
///
/// Absent, null, `false`, `0` and `""` count as "no id".
pub fn record_id(record: &JsonValue, ids: &IdGenerator) -> Result<i64> {
    match explicit_id(record)? {
        Some(id) => Ok(id),
        None => ids.next_id(),
    }
}

fn explicit_id(record: &JsonValue) -> Result<Option<i64>> {
    let id = match record.get("id") {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
        Some(JsonValue::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            _ => return Err(mismatch(record)),
        },
        Some(JsonValue::String(s)) if s.is_empty() => None,
        Some(JsonValue::String(s)) => Some(s.trim().parse::<i64>().map_err(|_| mismatch(record))?),
        Some(_) => return Err(mismatch(record)),
    };
    Ok(id.filter(|id| *id != 0))
}

fn mismatch(record: &JsonValue) -> DbError {
    let id = record.get("id").map(|v| v.to_string()).unwrap_or_default();
    DbError::TypeMismatch(format!("Record id {} is not an integer", id))
}
