use crate::core::{DbError, Result, Row, Schema, Value};
use im::{OrdSet, Vector};
use serde::{Deserialize, Serialize};

/// A table keeps rows in insertion order; the INTEGER PRIMARY KEY, when
/// present, is tracked in `keys` for uniqueness and auto-assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: Vector<Row>,
    keys: OrdSet<i64>,
    /// Highest key ever stored; AUTOINCREMENT never reuses below it.
    sequence: i64,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vector::new(),
            keys: OrdSet::new(),
            sequence: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Validates and stores one full-width row. Returns the row's key, or
    /// `None` when the table has no INTEGER PRIMARY KEY.
    pub fn insert(&mut self, row: Row) -> Result<Option<i64>> {
        let columns = self.schema.columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }

        let key_idx = self.schema.row_id_index();
        let mut stored = Vec::with_capacity(row.len());
        for (idx, (column, value)) in columns.iter().zip(row).enumerate() {
            if Some(idx) == key_idx && value.is_null() {
                stored.push(Value::Null);
                continue;
            }
            column.validate(&value)?;
            stored.push(column.data_type.coerce(value));
        }

        let key = match key_idx {
            Some(idx) => {
                let key = match stored[idx].as_i64() {
                    Some(explicit) => {
                        if self.keys.contains(&explicit) {
                            return Err(DbError::ConstraintViolation(format!(
                                "UNIQUE constraint failed: {}.{} = {}",
                                self.name,
                                columns[idx].name,
                                explicit
                            )));
                        }
                        explicit
                    }
                    None => self.next_key(columns[idx].autoincrement)?,
                };
                stored[idx] = Value::Integer(key);
                self.keys.insert(key);
                self.sequence = self.sequence.max(key);
                Some(key)
            }
            None => None,
        };

        self.rows.push_back(stored);
        Ok(key)
    }

    fn next_key(&self, autoincrement: bool) -> Result<i64> {
        let base = if autoincrement {
            self.sequence
        } else {
            self.keys.get_max().copied().unwrap_or(0)
        };
        base.checked_add(1).ok_or_else(|| {
            DbError::ConstraintViolation(format!("Key space exhausted in table '{}'", self.name))
        })
    }

    /// Removes every row for which `predicate` returns true. The predicate
    /// is evaluated for all rows before anything is removed, so an error
    /// leaves the table untouched.
    pub fn delete_where<F>(&mut self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let mut kept = Vector::new();
        let mut removed = Vec::new();
        for row in self.rows.iter() {
            if predicate(row)? {
                removed.push(row.clone());
            } else {
                kept.push_back(row.clone());
            }
        }

        if let Some(idx) = self.schema.row_id_index() {
            for row in &removed {
                if let Some(key) = row.get(idx).and_then(Value::as_i64) {
                    self.keys.remove(&key);
                }
            }
        }
        self.rows = kept;
        Ok(removed.len())
    }

    /// Checks that the rows fit the schema and that `keys` and `sequence`
    /// agree with the stored key column.
    pub fn check_integrity(&self) -> Result<()> {
        let corrupt =
            |detail: String| DbError::CorruptSnapshot(format!("table '{}': {}", self.name, detail));
        let width = self.schema.column_count();
        let key_idx = self.schema.row_id_index();
        let mut seen = OrdSet::new();

        for (position, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(corrupt(format!(
                    "row {} has {} values, schema has {} columns",
                    position,
                    row.len(),
                    width
                )));
            }
            if let Some(idx) = key_idx {
                let Some(key) = row[idx].as_i64() else {
                    return Err(corrupt(format!("row {} has no integer key", position)));
                };
                if seen.insert(key).is_some() {
                    return Err(corrupt(format!("duplicate key {}", key)));
                }
            }
        }

        if seen != self.keys {
            return Err(corrupt("key index does not match rows".into()));
        }
        if seen.get_max().is_some_and(|max| *max > self.sequence) {
            return Err(corrupt("sequence is behind the highest key".into()));
        }
        Ok(())
    }

    pub fn clear(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        self.keys.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn keyed_table(autoincrement: bool) -> Table {
        let mut id = Column::new("id", DataType::Integer).primary_key();
        if autoincrement {
            id = id.autoincrement();
        }
        Table::new(
            "t",
            Schema::new(vec![id, Column::new("data", DataType::Text)]),
        )
    }

    #[test]
    fn test_insert_preserves_order_and_rejects_duplicates() {
        let mut table = keyed_table(false);
        table.insert(vec![Value::Integer(9), "a".into()]).unwrap();
        table.insert(vec![Value::Integer(3), "b".into()]).unwrap();

        let err = table.insert(vec![Value::Integer(9), "c".into()]).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));

        let data: Vec<_> = table.scan().map(|r| r[1].clone()).collect();
        assert_eq!(data, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_null_key_is_assigned() {
        let mut table = keyed_table(false);
        table.insert(vec![Value::Integer(4), "a".into()]).unwrap();
        let key = table.insert(vec![Value::Null, "b".into()]).unwrap();
        assert_eq!(key, Some(5));
    }

    #[test]
    fn test_autoincrement_does_not_reuse_deleted_keys() {
        let mut table = keyed_table(true);
        table.insert(vec![Value::Null, "a".into()]).unwrap();
        table.insert(vec![Value::Null, "b".into()]).unwrap();
        assert_eq!(table.clear(), 2);

        let key = table.insert(vec![Value::Null, "c".into()]).unwrap();
        assert_eq!(key, Some(3));
    }

    #[test]
    fn test_delete_where_is_all_or_nothing() {
        let mut table = keyed_table(false);
        table.insert(vec![Value::Integer(1), "a".into()]).unwrap();
        table.insert(vec![Value::Integer(2), "b".into()]).unwrap();

        let mut seen = 0;
        let result = table.delete_where(|_| {
            seen += 1;
            if seen == 2 {
                Err(DbError::ExecutionError("boom".into()))
            } else {
                Ok(true)
            }
        });
        assert!(result.is_err());
        assert_eq!(table.row_count(), 2);

        let removed = table
            .delete_where(|row| Ok(row[0] == Value::Integer(1)))
            .unwrap();
        assert_eq!(removed, 1);
        // key 1 is free again
        table.insert(vec![Value::Integer(1), "c".into()]).unwrap();
    }

    #[test]
    fn test_integrity_check_catches_mismatched_rows() {
        let mut table = keyed_table(false);
        table.insert(vec![Value::Integer(1), "a".into()]).unwrap();
        table.check_integrity().unwrap();

        let mut short_row = table.clone();
        short_row.rows.push_back(vec![Value::Integer(2)]);
        assert!(matches!(
            short_row.check_integrity(),
            Err(DbError::CorruptSnapshot(_))
        ));

        let mut stale_keys = table.clone();
        stale_keys.keys.insert(7);
        assert!(stale_keys.check_integrity().is_err());

        let mut duplicate = table.clone();
        duplicate.rows.push_back(vec![Value::Integer(1), "b".into()]);
        assert!(duplicate.check_integrity().is_err());
    }
}
