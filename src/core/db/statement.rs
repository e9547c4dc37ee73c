//! SQL assembly for the table helper.
//!
//! Every builder validates its inputs first and returns `DbError::Argument`
//! before producing any SQL. Table and field names are inserted verbatim;
//! values always travel as bound parameters.

use crate::core::{Args, DbError, Record, Result, Value};

/// A SQL template plus the arguments bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Args,
}

/// Columns that identify a row when a `DELETE` is bounded by a limit.
///
/// SQLite is built without `DELETE ... LIMIT`, so a bounded delete selects
/// its victims by key in a subquery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowKey {
    /// The implicit `rowid`
    #[default]
    Rowid,
    /// Primary-key columns of a `WITHOUT ROWID` table, in key order
    PrimaryKey(Vec<String>),
}

impl RowKey {
    /// `rowid`, `k` or `(a,b)`
    fn target(&self) -> String {
        match self {
            RowKey::PrimaryKey(columns) if columns.len() > 1 => {
                format!("({})", columns.join(","))
            }
            _ => self.select_list(),
        }
    }

    fn select_list(&self) -> String {
        match self {
            RowKey::Rowid => "rowid".to_string(),
            RowKey::PrimaryKey(columns) => columns.join(","),
        }
    }
}

pub(crate) fn require_table(table: &str) -> Result<()> {
    if table.trim().is_empty() {
        return Err(DbError::argument("Table name can not be empty"));
    }
    Ok(())
}

fn require_non_empty(record: &Record, what: &str) -> Result<()> {
    if record.is_empty() {
        return Err(DbError::argument(format!("{what} argument can not be empty")));
    }
    Ok(())
}

pub(crate) fn require_flat(record: &Record, what: &str) -> Result<()> {
    if record.is_multi_dimensional() {
        return Err(DbError::argument(format!(
            "{what}: The parameter must be one-dimensional"
        )));
    }
    Ok(())
}

/// `a = :a AND b = :b`
fn named_conditions(record: &Record) -> String {
    record
        .keys()
        .map(|key| format!("{key} = :{key}"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `INSERT INTO t (a,b) VALUES (:a,:b);`
pub fn insert_statement(table: &str, row: &Record) -> Result<Statement> {
    require_table(table)?;
    require_non_empty(row, "row")?;
    require_flat(row, "row")?;

    let fields = row.keys().collect::<Vec<_>>();
    let placeholders = fields
        .iter()
        .map(|field| format!(":{field}"))
        .collect::<Vec<_>>();
    Ok(Statement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({});",
            fields.join(","),
            placeholders.join(",")
        ),
        args: row.to_named_args(),
    })
}

/// `UPDATE t SET a = ?,b = ? WHERE c = ? AND d = ?;`
///
/// Arguments are the data values followed by the where values, each in
/// record order.
pub fn update_statement(table: &str, data: &Record, where_: &Record) -> Result<Statement> {
    require_table(table)?;
    require_non_empty(data, "data")?;
    require_non_empty(where_, "where")?;
    require_flat(data, "data")?;
    require_flat(where_, "where")?;

    let set = data
        .keys()
        .map(|key| format!("{key} = ?"))
        .collect::<Vec<_>>()
        .join(",");
    let conditions = where_
        .keys()
        .map(|key| format!("{key} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let args: Vec<Value> = data.values().chain(where_.values()).cloned().collect();
    Ok(Statement {
        sql: format!("UPDATE {table} SET {set} WHERE {conditions};"),
        args: Args::Positional(args),
    })
}

/// `UPDATE t SET a = :a,b = :b;`
pub fn update_all_statement(table: &str, data: &Record) -> Result<Statement> {
    require_table(table)?;
    require_non_empty(data, "data")?;
    require_flat(data, "data")?;

    let set = data
        .keys()
        .map(|key| format!("{key} = :{key}"))
        .collect::<Vec<_>>()
        .join(",");
    Ok(Statement {
        sql: format!("UPDATE {table} SET {set};"),
        args: data.to_named_args(),
    })
}

/// `DELETE FROM t WHERE a = :a ...` bounded by `limit` when it is positive.
///
/// An empty `where_` renders no WHERE clause at all. A bounded delete reads
/// `DELETE FROM t WHERE <key> IN (SELECT <key> FROM t WHERE ... LIMIT n);`.
pub fn delete_statement(
    table: &str,
    where_: &Record,
    limit: i64,
    key: &RowKey,
) -> Result<Statement> {
    require_table(table)?;
    require_flat(where_, "where")?;
    if matches!(key, RowKey::PrimaryKey(columns) if columns.is_empty()) {
        return Err(DbError::argument("Row key needs at least one column"));
    }

    let filter = if where_.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", named_conditions(where_))
    };
    let sql = if limit <= 0 {
        format!("DELETE FROM {table}{filter};")
    } else {
        format!(
            "DELETE FROM {table} WHERE {} IN (SELECT {} FROM {table}{filter} LIMIT {limit});",
            key.target(),
            key.select_list()
        )
    };
    Ok(Statement {
        sql,
        args: where_.to_named_args(),
    })
}

/// `SELECT * FROM t WHERE pk = :pk;`
pub fn select_by_id_statement(
    table: &str,
    primary_key: &str,
    key_value: Value,
) -> Result<Statement> {
    require_table(table)?;
    if primary_key.trim().is_empty() {
        return Err(DbError::argument("Primary key name can not be empty"));
    }
    Ok(Statement {
        sql: format!("SELECT * FROM {table} WHERE {primary_key} = :{primary_key};"),
        args: Args::Named(vec![(primary_key.to_string(), key_value)]),
    })
}

/// `SELECT count(*) FROM t [WHERE a = :a ...];`
pub fn count_statement(table: &str, where_: &Record) -> Result<Statement> {
    require_table(table)?;
    require_flat(where_, "where")?;

    let sql = if where_.is_empty() {
        format!("SELECT count(*) FROM {table};")
    } else {
        format!(
            "SELECT count(*) FROM {table} WHERE {};",
            named_conditions(where_)
        )
    };
    Ok(Statement {
        sql,
        args: where_.to_named_args(),
    })
}
