// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod cli;
pub mod config;

pub use crate::core::db::{
    interpolate_params, interpolate_query, ConnectOptions, DataSource, DbConnection,
    QueryExecutor, RowKey, SqlLogger, TableHelper, TracingLogger, Transaction, TransactionState,
};
pub use crate::core::{Args, DbError, ErrorDetail, InsertRows, Record, Result, Row, Value};
