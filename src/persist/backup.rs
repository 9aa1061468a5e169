use super::bootstrap::ArchiveStorage;
use super::writer::read_records;
use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{Instrument, Level, event, info_span};

/// Portable dump: table name to its records, in stored order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupDocument {
    pub tables: BTreeMap<String, Vec<JsonValue>>,
}

impl BackupDocument {
    pub fn table(&self, name: &str) -> Option<&[JsonValue]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Per-table outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Tables fully replaced
    pub restored: Vec<String>,
    /// Tables absent or null in the document, left untouched
    pub skipped: Vec<String>,
    /// Tables whose transaction rolled back, with the error
    pub failed: Vec<(String, String)>,
    /// Whether the final snapshot write succeeded
    pub persisted: bool,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.persisted
    }
}

impl ArchiveStorage {
    /// Every configured table, read under one engine lock.
    pub async fn export_backup_document(&self) -> Result<BackupDocument> {
        let engine = self.ensure_ready().await;
        let tables = &self.config().tables;

        engine
            .with_engine(|db| {
                let mut document = BackupDocument::default();
                for table in tables {
                    document
                        .tables
                        .insert(table.to_string(), read_records(db, table)?);
                }
                Ok::<_, DbError>(document)
            })
            .await
    }

    /// Every configured table as one JSON object.
    pub async fn export_backup(&self) -> Result<String> {
        self.export_backup_document().await?.to_json()
    }

    /// Restores the tables present in `json`, each in its own transaction,
    /// then writes the snapshot immediately.
    ///
    /// The whole document is validated first: a malformed document fails
    /// with `SerializationError` and no table is touched. There is no
    /// atomicity across tables; check [`RestoreReport::failed`].
    pub async fn restore_backup(&self, json: &str) -> Result<RestoreReport> {
        let span = info_span!("archivedb.restore", bytes = json.len());
        self.restore_backup_inner(json).instrument(span).await
    }

    async fn restore_backup_inner(&self, json: &str) -> Result<RestoreReport> {
        let plan = self.plan_restore(json).map_err(|err| {
            event!(Level::ERROR, error = %err, "backup document rejected");
            err
        })?;

        let mut report = RestoreReport::default();
        for (table, records) in plan {
            let Some(records) = records else {
                report.skipped.push(table);
                continue;
            };

            match self.replace_rows(&table, &records).await {
                Ok(rows) => {
                    event!(Level::INFO, table = %table, rows, "table restored");
                    report.restored.push(table);
                }
                Err(err) => {
                    event!(Level::ERROR, table = %table, error = %err, "table restore rolled back");
                    report.failed.push((table, err.to_string()));
                }
            }
        }

        report.persisted = match self.flush_now().await {
            Ok(()) => true,
            Err(err) => {
                event!(Level::ERROR, error = %err, "restored state not persisted");
                false
            }
        };
        Ok(report)
    }

    /// Configured tables in order, each with the records to restore or
    /// `None` when the document leaves it out.
    fn plan_restore(&self, json: &str) -> Result<Vec<(String, Option<Vec<JsonValue>>)>> {
        let parsed: JsonValue = serde_json::from_str(json)?;
        let JsonValue::Object(mut entries) = parsed else {
            return Err(DbError::SerializationError(
                "backup document must be a JSON object".into(),
            ));
        };

        self.config()
            .tables
            .iter()
            .map(|table| {
                let records = match entries.remove(table.as_str()) {
                    None | Some(JsonValue::Null) => None,
                    Some(JsonValue::Array(records)) => Some(records),
                    Some(other) => {
                        return Err(DbError::SerializationError(format!(
                            "backup entry '{}' must be an array, found {}",
                            table,
                            json_kind(&other)
                        )));
                    }
                };
                Ok((table.to_string(), records))
            })
            .collect()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
