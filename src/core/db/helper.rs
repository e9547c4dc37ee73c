/// Table Helper Module
///
/// Table-oriented CRUD helpers and transaction scoping, built on the
/// `QueryExecutor` primitives. SQL text comes from `statement.rs`.

use crate::core::db::statement::{require_flat, require_table};
use crate::core::db::{
    count_statement, delete_statement, insert_statement, select_by_id_statement,
    update_all_statement, update_statement, QueryExecutor, RowKey, Statement,
};
use crate::core::{DbError, InsertRows, Record, Result, Row, Value};
use rusqlite::OptionalExtension;
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// CRUD helpers over one executor.
#[derive(Debug)]
pub struct TableHelper {
    executor: QueryExecutor,
}

impl TableHelper {
    pub fn new(executor: QueryExecutor) -> Self {
        TableHelper { executor }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut QueryExecutor {
        &mut self.executor
    }

    pub fn into_executor(self) -> QueryExecutor {
        self.executor
    }

    fn execute(&self, stmt: Statement) -> Result<usize> {
        self.executor.execute(&stmt.sql, &stmt.args)
    }

    /// Inserts one row or a batch, one statement per row.
    ///
    /// Returns the summed affected-row count. An empty batch issues nothing
    /// and returns 0. Every row is validated before the first statement runs.
    pub fn insert(&self, table: &str, rows: impl Into<InsertRows>) -> Result<usize> {
        require_table(table)?;
        let statements = rows
            .into()
            .into_records()
            .iter()
            .map(|row| insert_statement(table, row))
            .collect::<Result<Vec<_>>>()?;

        let mut row_count = 0;
        for stmt in statements {
            row_count += self.execute(stmt)?;
        }
        Ok(row_count)
    }

    /// Updates rows matching every `where_` field.
    pub fn update(
        &self,
        table: &str,
        data: impl Into<Record>,
        where_: impl Into<Record>,
    ) -> Result<usize> {
        self.execute(update_statement(table, &data.into(), &where_.into())?)
    }

    /// Updates every row of `table`.
    pub fn update_table_all_rows(&self, table: &str, data: impl Into<Record>) -> Result<usize> {
        self.execute(update_all_statement(table, &data.into())?)
    }

    /// Deletes at most `limit` matching rows; `limit <= 0` removes the bound.
    ///
    /// An empty `where_` matches every row. `WITHOUT ROWID` tables are bounded
    /// through their primary key.
    pub fn delete(&self, table: &str, where_: impl Into<Record>, limit: i64) -> Result<usize> {
        let where_ = where_.into();
        require_table(table)?;
        require_flat(&where_, "where")?;
        let key = if limit > 0 {
            self.row_key(table)?
        } else {
            RowKey::Rowid
        };
        self.execute(delete_statement(table, &where_, limit, &key)?)
    }

    /// Fetches the row whose `primary_key` equals `key_value`.
    ///
    /// # Errors
    ///
    /// `DbError::Argument` for an empty table or key name; `DbError::Query`
    /// when no row matches.
    pub fn get_by_id(
        &self,
        table: &str,
        primary_key: &str,
        key_value: impl Into<Value>,
    ) -> Result<Row> {
        let stmt = select_by_id_statement(table, primary_key, key_value.into())?;
        self.executor.fetch_one_row(&stmt.sql, &stmt.args)
    }

    /// Counts rows, optionally filtered by equality on every `where_` field.
    pub fn count(&self, table: &str, where_: impl Into<Record>) -> Result<i64> {
        let stmt = count_statement(table, &where_.into())?;
        let value = self.executor.fetch_scalar(&stmt.sql, &stmt.args)?;
        Ok(scalar_to_count(&value))
    }

    /// How rows of `table` are addressed in a bounded delete. Catalog reads
    /// bypass the SQL log. Unknown tables fall back to `rowid`.
    fn row_key(&self, table: &str) -> Result<RowKey> {
        let conn = self.executor.connection()?;
        let without_rowid = conn
            .prepare("SELECT wr FROM pragma_table_list WHERE name = ?1")
            .and_then(|mut stmt| {
                stmt.query_row([table], |row| row.get::<_, bool>(0))
                    .optional()
            })
            .map_err(DbError::query)?
            .unwrap_or(false);
        if !without_rowid {
            return Ok(RowKey::Rowid);
        }

        let columns = conn
            .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
            .and_then(|mut stmt| {
                let columns = stmt
                    .query_map([table], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>();
                columns
            })
            .map_err(DbError::query)?;
        Ok(RowKey::PrimaryKey(columns))
    }

    /// Starts a transaction scoped to the returned guard.
    ///
    /// The guard rolls back when dropped unless `commit` or `rollback` was
    /// called on it.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.executor.begin_transaction()?;
        Ok(Transaction {
            helper: self,
            finished: false,
        })
    }

    /// Runs `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok`. On `Err` the transaction is rolled
    /// back and the original error is returned unchanged; a failing rollback
    /// is logged and does not replace it. A panic in `work` rolls back while
    /// unwinding.
    pub fn trans<T, E, F>(&mut self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut TableHelper) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        let mut tx = self.transaction()?;
        match work(&mut *tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback after failed unit of work also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Interprets a `count(*)` scalar. Non-numeric values count as 0.
fn scalar_to_count(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Real(f) => *f as i64,
        Value::Bool(b) => i64::from(*b),
        Value::Text(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// An open transaction on a `TableHelper`.
///
/// Derefs to the helper so table operations run inside the transaction.
#[derive(Debug)]
pub struct Transaction<'a> {
    helper: &'a mut TableHelper,
    finished: bool,
}

impl Transaction<'_> {
    /// Commits. If `COMMIT` fails the guard still rolls back on drop.
    pub fn commit(mut self) -> Result<()> {
        let result = self.helper.executor.commit();
        self.finished = result.is_ok();
        result
    }

    /// Rolls back. If `ROLLBACK` fails the guard retries on drop.
    pub fn rollback(mut self) -> Result<()> {
        let result = self.helper.executor.roll_back();
        self.finished = result.is_ok();
        result
    }
}

impl Deref for Transaction<'_> {
    type Target = TableHelper;

    fn deref(&self) -> &TableHelper {
        &*self.helper
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut TableHelper {
        &mut *self.helper
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.helper.executor.transaction_state().is_active() {
            return;
        }
        if let Err(err) = self.helper.executor.roll_back() {
            warn!("Rollback of abandoned transaction failed: {}", err);
        }
    }
}
