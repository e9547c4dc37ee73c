/// Query Execution Module
///
/// This module provides the four statement primitives (single row, all rows,
/// scalar, non-query execute), the transaction passthroughs, and the optional
/// SQL diagnostics written before each statement runs.

use crate::core::db::{DbConnection, TransactionState};
use crate::core::{Args, DbError, Result, Row, Value};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Rows, Statement};
use std::fmt;
use std::sync::Arc;
use tracing::info;

static POSITIONAL_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?").expect("static placeholder pattern"));

/// Receiver for SQL diagnostics.
pub trait SqlLogger: Send + Sync {
    /// Called once per statement with `SQL:{<interpolated sql>}`.
    fn info(&self, message: &str);
}

/// Logger that forwards diagnostics to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SqlLogger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "dbhelper::sql", "{}", message);
    }
}

/// Query execution service that owns a database connection
pub struct QueryExecutor {
    connection: Option<DbConnection>,
    logger: Option<Arc<dyn SqlLogger>>,
    debug: bool,
}

impl fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("connection", &self.connection)
            .field("has_logger", &self.logger.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

impl QueryExecutor {
    /// Creates a new QueryExecutor for the given connection, with diagnostics off
    pub fn new(connection: DbConnection) -> Self {
        QueryExecutor {
            connection: Some(connection),
            logger: None,
            debug: false,
        }
    }

    /// Creates a QueryExecutor that logs every statement when `debug` is set
    pub fn with_logger(connection: DbConnection, debug: bool, logger: Arc<dyn SqlLogger>) -> Self {
        QueryExecutor {
            connection: Some(connection),
            logger: Some(logger),
            debug,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_logger(&mut self, logger: Option<Arc<dyn SqlLogger>>) {
        self.logger = logger;
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// The wrapped connection handle.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Closed` after `close`.
    pub fn connection(&self) -> Result<&DbConnection> {
        self.connection.as_ref().ok_or(DbError::Closed)
    }

    fn connection_mut(&mut self) -> Result<&mut DbConnection> {
        self.connection.as_mut().ok_or(DbError::Closed)
    }

    /// Executes a query and returns its first row
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the statement fails, and also when the
    /// query matches no rows. The two cases share one error variant; the
    /// no-rows case reports "Query returned no rows".
    pub fn fetch_one_row(&self, sql: &str, args: &Args) -> Result<Row> {
        self.with_rows(sql, args, |mut rows, columns| match rows.next()? {
            Some(row) => Row::from_sqlite(columns, row),
            None => Err(rusqlite::Error::QueryReturnedNoRows),
        })
    }

    /// Executes a query and returns every row. Zero rows is an empty vector.
    pub fn fetch_all_rows(&self, sql: &str, args: &Args) -> Result<Vec<Row>> {
        self.with_rows(sql, args, |mut rows, columns| {
            let mut result = Vec::new();
            while let Some(row) = rows.next()? {
                result.push(Row::from_sqlite(columns, row)?);
            }
            Ok(result)
        })
    }

    /// Executes a query and returns the first column of its first row
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` on failure or when no row is produced.
    pub fn fetch_scalar(&self, sql: &str, args: &Args) -> Result<Value> {
        self.with_rows(sql, args, |mut rows, _| match rows.next()? {
            Some(row) => Ok(Value::from_value_ref(row.get_ref(0)?)),
            None => Err(rusqlite::Error::QueryReturnedNoRows),
        })
    }

    /// Executes a statement for its side effect and returns the affected row count.
    ///
    /// Row-returning statements (`... RETURNING`, pragmas) are stepped to
    /// completion and the number of rows they produced is reported.
    pub fn execute(&self, sql: &str, args: &Args) -> Result<usize> {
        self.write_log(sql, args);
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(DbError::query)?;
        if stmt.column_count() > 0 {
            let mut rows = query_with(&mut stmt, args).map_err(DbError::query)?;
            let mut count = 0;
            while rows.next().map_err(DbError::query)?.is_some() {
                count += 1;
            }
            return Ok(count);
        }
        execute_with(&mut stmt, args).map_err(DbError::query)
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.connection_mut()?.begin_transaction()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.connection_mut()?.commit()
    }

    pub fn roll_back(&mut self) -> Result<()> {
        self.connection_mut()?.roll_back()
    }

    /// Transaction state of the wrapped connection (`Idle` once closed).
    pub fn transaction_state(&self) -> TransactionState {
        self.connection
            .as_ref()
            .map(DbConnection::transaction_state)
            .unwrap_or_default()
    }

    pub fn last_insert_id(&self, name: Option<&str>) -> Result<String> {
        Ok(self.connection()?.last_insert_id(name))
    }

    /// Releases the connection. Later operations return `DbError::Closed`;
    /// closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    fn with_rows<T>(
        &self,
        sql: &str,
        args: &Args,
        read: impl FnOnce(Rows<'_>, &Arc<Vec<String>>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        self.write_log(sql, args);
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql).map_err(DbError::query)?;
        let columns: Arc<Vec<String>> =
            Arc::new(stmt.column_names().into_iter().map(String::from).collect());
        let rows = query_with(&mut stmt, args).map_err(DbError::query)?;
        read(rows, &columns).map_err(DbError::query)
    }

    fn write_log(&self, sql: &str, args: &Args) {
        if !self.debug {
            return;
        }
        if let Some(logger) = &self.logger {
            logger.info(&format!("SQL:{{{}}}", interpolate_query(sql, args)));
        }
    }
}

fn named_keys(pairs: &[(String, Value)]) -> Vec<String> {
    pairs.iter().map(|(key, _)| format!(":{key}")).collect()
}

fn query_with<'s>(stmt: &'s mut Statement<'_>, args: &Args) -> rusqlite::Result<Rows<'s>> {
    match args {
        Args::Positional(values) => stmt.query(params_from_iter(values.iter())),
        Args::Named(pairs) => {
            let keys = named_keys(pairs);
            let params: Vec<(&str, &dyn ToSql)> = keys
                .iter()
                .zip(pairs)
                .map(|(key, (_, value))| (key.as_str(), value as &dyn ToSql))
                .collect();
            stmt.query(params.as_slice())
        }
    }
}

fn execute_with(stmt: &mut Statement<'_>, args: &Args) -> rusqlite::Result<usize> {
    match args {
        Args::Positional(values) => stmt.execute(params_from_iter(values.iter())),
        Args::Named(pairs) => {
            let keys = named_keys(pairs);
            let params: Vec<(&str, &dyn ToSql)> = keys
                .iter()
                .zip(pairs)
                .map(|(key, (_, value))| (key.as_str(), value as &dyn ToSql))
                .collect();
            stmt.execute(params.as_slice())
        }
    }
}

/// Renders `sql` with its arguments substituted, for diagnostics only.
pub fn interpolate_query(sql: &str, args: &Args) -> String {
    interpolate_params(sql, args.entries())
}

/// Substitutes each entry into `sql`, left to right, one match per entry.
///
/// A named entry replaces the first `:name`, an unnamed one the first `?`.
/// Values are inserted in their literal form, unquoted. The output is for
/// humans and is never executed.
pub fn interpolate_params<'a, I>(sql: &str, entries: I) -> String
where
    I: IntoIterator<Item = (Option<&'a str>, &'a Value)>,
{
    let mut query = sql.to_string();
    for (name, value) in entries {
        let literal = value.to_sql_literal();
        query = match name {
            Some(name) => {
                let name = name.strip_prefix(':').unwrap_or(name);
                match Regex::new(&format!(r":{}\b", regex::escape(name))) {
                    Ok(pattern) => pattern.replacen(&query, 1, NoExpand(&literal)).into_owned(),
                    Err(_) => query,
                }
            }
            None => POSITIONAL_PLACEHOLDER
                .replacen(&query, 1, NoExpand(&literal))
                .into_owned(),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CaptureLogger {
        lines: Mutex<Vec<String>>,
    }

    impl SqlLogger for CaptureLogger {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    fn setup_executor() -> QueryExecutor {
        let conn = DbConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE test (
                id INTEGER PRIMARY KEY,
                name TEXT,
                value REAL,
                active BOOLEAN DEFAULT 1
            );
            INSERT INTO test (name, value) VALUES ('Alice', 123.45);
            INSERT INTO test (name, value) VALUES ('Bob', 678.90);
            INSERT INTO test (name, value) VALUES (NULL, NULL);
        ",
        )
        .unwrap();
        QueryExecutor::new(conn)
    }

    #[test]
    fn test_fetch_one_row_named() {
        let executor = setup_executor();
        let row = executor
            .fetch_one_row("SELECT * FROM test WHERE name = :name", &Args::named([("name", "Bob")]))
            .unwrap();
        assert_eq!(row.columns(), ["id", "name", "value", "active"]);
        assert_eq!(row.get("id"), Some(&Value::Integer(2)));
        assert_eq!(row.get("value"), Some(&Value::Real(678.90)));
    }

    #[test]
    fn test_fetch_all_rows() {
        let executor = setup_executor();
        let rows = executor
            .fetch_all_rows("SELECT id, name FROM test ORDER BY id", &Args::none())
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("name"), Some(&Value::Null));

        let none = executor
            .fetch_all_rows("SELECT id FROM test WHERE id > ?", &Args::positional([10]))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_fetch_scalar() {
        let executor = setup_executor();
        let count = executor.fetch_scalar("SELECT COUNT(*) FROM test", &Args::none()).unwrap();
        assert_eq!(count, Value::Integer(3));
    }

    #[test]
    fn test_empty_result_and_bad_sql_share_error_variant() {
        let executor = setup_executor();

        let no_rows = executor
            .fetch_one_row("SELECT * FROM test WHERE id = ?", &Args::positional([99]))
            .unwrap_err();
        let bad_sql = executor
            .fetch_one_row("SELECT * FROM nonexistent_table", &Args::none())
            .unwrap_err();

        assert!(matches!(no_rows, DbError::Query(_)));
        assert!(matches!(bad_sql, DbError::Query(_)));
        assert!(no_rows.to_string().contains("no rows"));
        assert!(bad_sql.to_string().contains("no such table"));

        let scalar = executor
            .fetch_scalar("SELECT name FROM test WHERE id = 99", &Args::none())
            .unwrap_err();
        assert!(matches!(scalar, DbError::Query(_)));
    }

    #[test]
    fn test_execute_returns_affected_rows() {
        let executor = setup_executor();
        let changed = executor
            .execute(
                "UPDATE test SET active = ? WHERE value IS NOT NULL",
                &Args::positional([false]),
            )
            .unwrap();
        assert_eq!(changed, 2);

        let err = executor
            .execute("INSERT INTO missing VALUES (1)", &Args::none())
            .unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[test]
    fn test_execute_row_returning_statement() {
        let executor = setup_executor();
        let deleted = executor
            .execute("DELETE FROM test WHERE name IS NOT NULL RETURNING id", &Args::none())
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn test_interpolate_mixed_placeholders() {
        let five = Value::Integer(5);
        let x = Value::from("x");
        let sql = interpolate_params(
            "SELECT * FROM t WHERE a=? AND b=:b",
            vec![(None, &five), (Some("b"), &x)],
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a=5 AND b=x");
    }

    #[test]
    fn test_interpolate_one_substitution_per_entry() {
        let sql = interpolate_query(
            "UPDATE t SET a = ?, b = ? WHERE c = ?",
            &Args::positional([Value::from(1), Value::from("two")]),
        );
        assert_eq!(sql, "UPDATE t SET a = 1, b = two WHERE c = ?");

        // `:id` must not match inside `:identity`
        let sql = interpolate_query(
            "SELECT :identity, :id",
            &Args::named([("id", 7), ("identity", 8)]),
        );
        assert_eq!(sql, "SELECT 8, 7");
    }

    #[test]
    fn test_debug_logging_through_logger() {
        let logger = Arc::new(CaptureLogger::default());
        let conn = DbConnection::open_in_memory().unwrap();
        let mut executor = QueryExecutor::with_logger(conn, true, logger.clone());

        executor.fetch_scalar("SELECT ? + ?", &Args::positional([1, 2])).unwrap();
        assert_eq!(logger.lines.lock().unwrap().as_slice(), ["SQL:{SELECT 1 + 2}"]);

        executor.set_debug(false);
        executor.fetch_scalar("SELECT 1", &Args::none()).unwrap();
        assert_eq!(logger.lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_close_then_use() {
        let mut executor = setup_executor();
        executor.close().unwrap();
        assert!(executor.is_closed());
        assert!(matches!(
            executor.fetch_scalar("SELECT 1", &Args::none()),
            Err(DbError::Closed)
        ));
        assert!(matches!(executor.begin_transaction(), Err(DbError::Closed)));
        executor.close().unwrap();
    }

    #[test]
    fn test_transaction_passthroughs() {
        let mut executor = setup_executor();
        executor.begin_transaction().unwrap();
        executor.execute("DELETE FROM test", &Args::none()).unwrap();
        executor.roll_back().unwrap();
        let count = executor.fetch_scalar("SELECT COUNT(*) FROM test", &Args::none()).unwrap();
        assert_eq!(count, Value::Integer(3));
        assert_eq!(executor.transaction_state(), TransactionState::RolledBack);

        executor
            .execute("INSERT INTO test (name) VALUES (:name)", &Args::named([("name", "Carol")]))
            .unwrap();
        assert_eq!(executor.last_insert_id(None).unwrap(), "4");
    }
}
