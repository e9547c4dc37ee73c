/// Core Module for dbhelper
///
/// This module contains the value and row types, the error taxonomy and the
/// database layers built on top of them: the connection handle, the query
/// executor and the table helper.

pub mod db;
pub mod error;
pub mod row;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{DbError, ErrorDetail, Result};
pub use row::Row;
pub use value::{Args, InsertRows, Record, Value};
