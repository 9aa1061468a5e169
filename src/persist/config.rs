use crate::core::{DbError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Tables every install carries.
pub const KNOWN_TABLES: [&str; 4] = ["contracts", "users", "audit_log", "contract_types"];

/// Tables whose identifier auto-increments when the caller omits it.
const AUTOINCREMENT_TABLES: [&str; 1] = ["contract_types"];

pub const DEFAULT_DATABASE: &str = "ArchivingSystemSQLite";
pub const DEFAULT_COLLECTION: &str = "sqlite_store";
pub const DEFAULT_KEY: &str = "sqlite_db_file";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

lazy_static! {
    static ref TABLE_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("table name pattern compiles");
    static ref STORE_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("store name pattern compiles");
}

/// A database, collection or key name must be a single path component
/// that does not start with a dot.
pub(crate) fn validate_store_name(kind: &str, name: &str) -> Result<()> {
    if STORE_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(DbError::ExecutionError(format!("Invalid store {} '{}'", kind, name)))
    }
}

/// A validated table identifier, safe to splice into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !TABLE_NAME_PATTERN.is_match(&name) {
            return Err(DbError::ExecutionError(format!(
                "Invalid table name '{}'",
                name
            )));
        }
        Ok(Self(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        KNOWN_TABLES.contains(&self.0.as_str())
    }

    pub fn autoincrements(&self) -> bool {
        AUTOINCREMENT_TABLES.contains(&self.0.as_str())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_sql(&self) -> String {
        let id = if self.autoincrements() {
            "id INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "id INTEGER PRIMARY KEY"
        };
        format!("CREATE TABLE IF NOT EXISTS {} ({}, data TEXT)", self.0, id)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where the single snapshot blob lives: one database, one collection, one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIdentity {
    pub database: String,
    pub collection: String,
    pub key: String,
}

impl Default for StoreIdentity {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            key: DEFAULT_KEY.to_string(),
        }
    }
}

impl StoreIdentity {
    /// Key a snapshot that failed to decode is moved to.
    pub fn quarantine_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    pub fn validate(&self) -> Result<()> {
        validate_store_name("database", &self.database)?;
        validate_store_name("collection", &self.collection)?;
        validate_store_name("key", &self.key)
    }
}

/// Storage layer configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Snapshot slot in the byte store
    pub identity: StoreIdentity,

    /// Quiet period before a scheduled flush writes
    pub debounce: Duration,

    /// Tables created at bootstrap
    pub tables: Vec<TableName>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self {
            identity: StoreIdentity::default(),
            debounce: DEFAULT_DEBOUNCE,
            tables: KNOWN_TABLES
                .iter()
                .map(|name| TableName(name.to_string()))
                .collect(),
        }
    }

    pub fn identity(mut self, identity: StoreIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn database(mut self, database: &str) -> Self {
        self.identity.database = database.to_string();
        self
    }

    pub fn collection(mut self, collection: &str) -> Self {
        self.identity.collection = collection.to_string();
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.identity.key = key.to_string();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Adds a table to the bootstrap schema. Duplicates are ignored.
    pub fn table(mut self, name: TableName) -> Self {
        if !self.tables.contains(&name) {
            self.tables.push(name);
        }
        self
    }

    /// Creation statements for every configured table, in order.
    pub fn schema_sql(&self) -> Vec<String> {
        self.tables.iter().map(TableName::create_sql).collect()
    }

    /// Defaults overridden by `ARCHIVEDB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup("ARCHIVEDB_DEBOUNCE_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                DbError::ExecutionError(format!("Invalid ARCHIVEDB_DEBOUNCE_MS '{}'", raw))
            })?;
            config.debounce = Duration::from_millis(millis);
        }
        if let Some(database) = lookup("ARCHIVEDB_DATABASE") {
            config.identity.database = database;
        }
        if let Some(collection) = lookup("ARCHIVEDB_COLLECTION") {
            config.identity.collection = collection;
        }
        if let Some(key) = lookup("ARCHIVEDB_KEY") {
            config.identity.key = key;
        }

        config.identity.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_table_name_validation() {
        assert_eq!(TableName::new("Contracts").unwrap().as_str(), "contracts");
        assert!(TableName::new("audit_log").unwrap().is_known());
        assert!(!TableName::new("notes").unwrap().is_known());
        assert!(TableName::new("").is_err());
        assert!(TableName::new("1abc").is_err());
        assert!(TableName::new("users; DROP TABLE users").is_err());
    }

    #[test]
    fn test_schema_sql_covers_known_tables() {
        let sql = StorageConfig::new().schema_sql();
        assert_eq!(sql.len(), 4);
        assert_eq!(
            sql[0],
            "CREATE TABLE IF NOT EXISTS contracts (id INTEGER PRIMARY KEY, data TEXT)"
        );
        assert!(sql[3].contains("AUTOINCREMENT"));
    }

    #[test]
    fn test_builder() {
        let config = StorageConfig::new()
            .database("db")
            .key("blob")
            .debounce(Duration::from_millis(50))
            .table(TableName::new("notes").unwrap())
            .table(TableName::new("users").unwrap());

        assert_eq!(config.identity.database, "db");
        assert_eq!(config.identity.collection, DEFAULT_COLLECTION);
        assert_eq!(config.identity.quarantine_key(), "blob.corrupt");
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.tables.len(), 5);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [("ARCHIVEDB_DEBOUNCE_MS", "250"), ("ARCHIVEDB_KEY", "snap")]
            .into_iter()
            .collect();
        let config =
            StorageConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.identity.key, "snap");
        assert_eq!(config.identity.database, DEFAULT_DATABASE);

        let bad = StorageConfig::from_lookup(|name| {
            (name == "ARCHIVEDB_DEBOUNCE_MS").then(|| "soon".to_string())
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_from_lookup_rejects_path_like_names() {
        for (var, value) in [
            ("ARCHIVEDB_KEY", "../x"),
            ("ARCHIVEDB_KEY", "a/b"),
            ("ARCHIVEDB_KEY", ".hidden"),
            ("ARCHIVEDB_KEY", ""),
            ("ARCHIVEDB_DATABASE", ".."),
            ("ARCHIVEDB_COLLECTION", "c:\\store"),
        ] {
            let config =
                StorageConfig::from_lookup(|name| (name == var).then(|| value.to_string()));
            assert!(config.is_err(), "{}={} accepted", var, value);
        }

        let config = StorageConfig::from_lookup(|name| {
            (name == "ARCHIVEDB_KEY").then(|| "install-b.v2".to_string())
        })
        .unwrap();
        assert!(config.identity.validate().is_ok());
    }
}
