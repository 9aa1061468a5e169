use super::Table;
use crate::core::{DbError, Result, Schema};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Table map of the engine. Cloning is O(1) (structural sharing), which is
/// what transactions use for their rollback image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryStorage {
    tables: OrdMap<String, Table>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the table already existed and `if_not_exists` was set.
    pub fn create_table(&mut self, name: &str, schema: Schema, if_not_exists: bool) -> Result<bool> {
        let k = key(name);
        if self.tables.contains_key(&k) {
            if if_not_exists {
                return Ok(false);
            }
            return Err(DbError::TableExists(name.to_string()));
        }
        self.tables.insert(k, Table::new(name, schema));
        Ok(true)
    }

    pub fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<bool> {
        if self.tables.remove(&key(name)).is_none() {
            if if_exists {
                return Ok(false);
            }
            return Err(DbError::TableNotFound(name.to_string()));
        }
        Ok(true)
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&key(name))
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&key(name))
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&key(name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name().to_string()).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.get_table(name)?.row_count())
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Table::row_count).sum()
    }

    /// Structural check run on every decoded snapshot.
    pub fn check_integrity(&self) -> Result<()> {
        for (name, table) in self.tables.iter() {
            if *name != key(table.name()) {
                return Err(DbError::CorruptSnapshot(format!(
                    "table '{}' filed under '{}'",
                    table.name(),
                    name
                )));
            }
            table.check_integrity()?;
        }
        Ok(())
    }
}
