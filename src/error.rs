use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a caller-supplied row mapper or by a driver's native client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for relexec operations
#[derive(Debug, Error)]
pub enum RelExecError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No driver registered for invariant name '{0}'")]
    UnknownDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Query failed: {message}")]
    QueryFailed {
        message: String,
        /// Vendor error code (SQLSTATE for PostgreSQL), when the driver reports one.
        code: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Placeholder @{0} has no bound parameter")]
    UnboundParameter(String),

    #[error("Bound parameter @{0} is not referenced by the query")]
    UnreferencedParameter(String),

    #[error("Parameter @{0} is bound more than once")]
    DuplicateParameter(String),

    #[error("Parameter @{name} is not supported: {reason}")]
    UnsupportedParameter { name: String, reason: String },

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Type mismatch for {target}: expected {expected}, found {found}")]
    TypeMismatch {
        target: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Column {column} has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Row mapper failed on row {row} of result set {result_set}: {source}")]
    Mapping {
        result_set: usize,
        row: usize,
        #[source]
        source: BoxError,
    },

    #[error("Operation was cancelled")]
    Cancelled,
}

/// Coarse classification of a [`RelExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection could not be established or is unusable.
    Connection,
    /// The statement was rejected or failed, on the engine or while binding/decoding.
    Query,
    /// The caller's row mapper failed.
    Mapping,
    /// The caller cancelled the call.
    Cancelled,
}

impl RelExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelExecError::ConnectionFailed(_)
            | RelExecError::UnknownDriver(_)
            | RelExecError::InvalidConfig(_) => ErrorKind::Connection,
            RelExecError::Mapping { .. } => ErrorKind::Mapping,
            RelExecError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Query,
        }
    }

    /// Shorthand for a driver rejection without a native error attached.
    pub fn query(message: impl Into<String>) -> Self {
        RelExecError::QueryFailed {
            message: message.into(),
            code: None,
            source: None,
        }
    }
}

/// Result type alias for relexec operations
pub type Result<T> = std::result::Result<T, RelExecError>;
