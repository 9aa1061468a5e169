use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification of [`DbError`] used by callers that only care
/// about which layer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The durable store could not be opened.
    StoreUnavailable,
    /// A read or write against an opened store failed.
    IoFailure,
    /// The relational engine rejected an operation.
    QueryError,
    /// A document or snapshot could not be encoded or decoded.
    SerializationError,
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            DbError::IoFailure(_) => ErrorKind::IoFailure,
            DbError::SerializationError(_) | DbError::CorruptSnapshot(_) => {
                ErrorKind::SerializationError
            }
            _ => ErrorKind::QueryError,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
