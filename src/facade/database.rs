use crate::core::{DbError, Result, Value};
use crate::executor::{ExecutionContext, ExecutorPipeline};
use crate::parser::SqlParserAdapter;
use crate::parser::ast::{Expr, InsertStmt, Statement};
use crate::result::QueryResult;
use crate::storage::{DatabaseSnapshot, InMemoryStorage};

/// The embedded relational engine.
///
/// Every statement is atomic on its own: it runs against a structural copy
/// of the table map that replaces the live one only on success. `BEGIN`
/// keeps the pre-transaction map aside so `ROLLBACK` can restore it.
pub struct InMemoryDB {
    parser: SqlParserAdapter,
    executor_pipeline: ExecutorPipeline,
    storage: InMemoryStorage,
    /// Committed image while a transaction is open
    rollback_image: Option<InMemoryStorage>,
}

impl Default for InMemoryDB {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDB {
    pub fn new() -> Self {
        Self::with_storage(InMemoryStorage::new())
    }

    fn with_storage(storage: InMemoryStorage) -> Self {
        Self {
            parser: SqlParserAdapter::new(),
            executor_pipeline: ExecutorPipeline::with_default_executors(),
            storage,
            rollback_image: None,
        }
    }

    /// Rebuilds an engine from bytes produced by [`InMemoryDB::export_bytes`].
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let snapshot = DatabaseSnapshot::decode(bytes)?;
        Ok(Self::with_storage(snapshot.storage))
    }

    /// Serializes the committed state. An open transaction is not included.
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        let committed = self.rollback_image.as_ref().unwrap_or(&self.storage);
        DatabaseSnapshot::new(committed.clone()).encode()
    }

    /// Runs every statement in `sql`; returns the result of the last one.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.execute_with_params(sql, &[])
    }

    pub fn execute_with_params(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let statements = self.parser.parse(sql)?;
        if statements.is_empty() {
            return Err(DbError::ParseError("No statement found".into()));
        }

        let mut last = QueryResult::empty();
        for stmt in &statements {
            last = self.run_statement(stmt, params)?;
        }
        Ok(last)
    }

    /// Read-only entry point: rejects anything but SELECT.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.query_with_params(sql, &[])
    }

    pub fn query_with_params(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let statements = self.parser.parse(sql)?;
        let [stmt @ Statement::Query(_)] = statements.as_slice() else {
            return Err(DbError::UnsupportedOperation(
                "query() accepts exactly one SELECT statement".into(),
            ));
        };

        // Queries never write, the working copy is discarded
        let mut scratch = self.storage.clone();
        let mut ctx = ExecutionContext::new(&mut scratch, params);
        self.executor_pipeline.execute(stmt, &mut ctx)
    }

    fn run_statement(&mut self, stmt: &Statement, params: &[Value]) -> Result<QueryResult> {
        match stmt {
            Statement::Begin => self.begin().map(|_| QueryResult::empty()),
            Statement::Commit => self.commit().map(|_| QueryResult::empty()),
            Statement::Rollback => self.rollback().map(|_| QueryResult::empty()),
            _ => {
                let mut working = self.storage.clone();
                let result = {
                    let mut ctx = ExecutionContext::new(&mut working, params);
                    self.executor_pipeline.execute(stmt, &mut ctx)?
                };
                if stmt.is_mutation() {
                    self.storage = working;
                }
                Ok(result)
            }
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn begin(&mut self) -> Result<()> {
        if self.rollback_image.is_some() {
            return Err(DbError::ExecutionError(
                "cannot start a transaction within a transaction".into(),
            ));
        }
        self.rollback_image = Some(self.storage.clone());
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.rollback_image
            .take()
            .map(|_| ())
            .ok_or_else(|| DbError::ExecutionError("cannot commit - no transaction is active".into()))
    }

    pub fn rollback(&mut self) -> Result<()> {
        let image = self.rollback_image.take().ok_or_else(|| {
            DbError::ExecutionError("cannot rollback - no transaction is active".into())
        })?;
        self.storage = image;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.rollback_image.is_some()
    }

    // ------------------------------------------------------------------
    // Prepared inserts
    // ------------------------------------------------------------------

    /// Prepares `INSERT INTO <table> (<columns>) VALUES (?, ...)`.
    pub fn prepare_insert(&mut self, table: &str, columns: &[&str]) -> Result<PreparedInsert<'_>> {
        let schema = self.storage.get_table(table)?.schema();
        let columns: Vec<String> = if columns.is_empty() {
            schema.column_names()
        } else {
            for column in columns {
                if schema.find_column_index(column).is_none() {
                    return Err(DbError::ColumnNotFound(column.to_string(), table.to_string()));
                }
            }
            columns.iter().map(|c| c.to_string()).collect()
        };

        let values = vec![(0..columns.len()).map(Expr::Parameter).collect()];
        let statement = Statement::Insert(InsertStmt {
            table_name: table.to_string(),
            columns: Some(columns),
            values,
        });

        Ok(PreparedInsert {
            db: self,
            statement,
            executed: 0,
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn table_exists(&self, name: &str) -> bool {
        self.storage.table_exists(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.storage.table_names()
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.storage.row_count(table)
    }
}

/// A parsed INSERT bound to one engine; each `run` binds a full set of values.
pub struct PreparedInsert<'a> {
    db: &'a mut InMemoryDB,
    statement: Statement,
    executed: usize,
}

impl PreparedInsert<'_> {
    pub fn run(&mut self, values: &[Value]) -> Result<()> {
        self.db.run_statement(&self.statement, values)?;
        self.executed += 1;
        Ok(())
    }

    /// Releases the statement, returning how many rows it inserted.
    pub fn release(self) -> usize {
        self.executed
    }
}
