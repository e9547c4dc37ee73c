/// dbhelper Error Module
///
/// This module defines the error taxonomy shared by the connection handle,
/// the query executor and the table helper.
use std::fmt;
use thiserror::Error;

/// Driver-reported failure detail, captured when a `rusqlite::Error` crosses
/// into this layer.
///
/// Mirrors the `(code, extended code, message)` triple a native client exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Primary SQLite result code name (e.g. `"ConstraintViolation"`), if any
    pub code: Option<String>,
    /// Extended SQLite result code, if any
    pub extended_code: Option<i32>,
    /// Human-readable driver message
    pub message: String,
}

impl ErrorDetail {
    /// Builds a detail that carries only a message.
    pub fn message(message: impl Into<String>) -> Self {
        ErrorDetail {
            code: None,
            extended_code: None,
            message: message.into(),
        }
    }
}

impl From<&rusqlite::Error> for ErrorDetail {
    fn from(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi, msg) => ErrorDetail {
                code: Some(format!("{:?}", ffi.code)),
                extended_code: Some(ffi.extended_code),
                message: msg.clone().unwrap_or_else(|| ffi.to_string()),
            },
            // prepare-time failures carry the offending SQL and offset
            rusqlite::Error::SqlInputError { error, .. } => ErrorDetail {
                code: Some(format!("{:?}", error.code)),
                extended_code: Some(error.extended_code),
                message: err.to_string(),
            },
            other => ErrorDetail::message(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ErrorDetail {
    fn from(err: rusqlite::Error) -> Self {
        ErrorDetail::from(&err)
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.extended_code) {
            (Some(code), Some(ext)) => write!(f, "{} ({code}/{ext})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Error type for every dbhelper operation.
///
/// - `Argument` is raised before any SQL reaches the driver
/// - `Query` carries the driver's failure detail, including the empty result
///   of a single-row or scalar fetch
/// - `Connection` forwards connection-time failures untouched
#[derive(Error, Debug)]
pub enum DbError {
    /// Structural precondition violations (empty table name, nested values, ...)
    #[error("Argument error: {0}")]
    Argument(String),

    /// Statement preparation, binding, execution or fetch failures
    #[error("Query error: {0}")]
    Query(ErrorDetail),

    /// Nested begin, or commit/rollback without an active transaction
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// Connection-time failures from the native client
    #[error(transparent)]
    Connection(rusqlite::Error),

    /// The executor's connection was closed
    #[error("Connection is closed")]
    Closed,

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Wraps a driver failure raised on the query path.
    pub fn query(err: rusqlite::Error) -> Self {
        DbError::Query(ErrorDetail::from(&err))
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        DbError::Argument(message.into())
    }

    /// Returns the driver detail for `Query` errors.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            DbError::Query(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
