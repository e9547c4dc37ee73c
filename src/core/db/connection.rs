/// Connection Handle Module
///
/// This module wraps a rusqlite connection, applies the construction-time
/// options, and tracks the connection's transaction state.

use crate::core::{DbError, Result};
use rusqlite::{Connection, OpenFlags, Statement};
use std::time::Duration;
use tracing::debug;

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction has been started (autocommit mode)
    #[default]
    Idle,
    /// Transaction in progress
    Active,
    /// The last transaction was committed
    Committed,
    /// The last transaction was rolled back
    RolledBack,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == TransactionState::Active
    }
}

/// How driver failures are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Failures are reported through sentinel return values
    #[default]
    Silent,
    /// Failures are raised as errors
    Raise,
}

/// Shape in which result rows are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Rows as positional sequences
    #[default]
    Positional,
    /// Rows keyed by column name
    Named,
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataSource {
    /// `:memory:`, a file path, `sqlite:<path>` or a `file:` URI
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DataSource {
    pub fn new(dsn: impl Into<String>) -> Self {
        DataSource {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// The path handed to SQLite, with any `sqlite:` DSN prefix removed.
    pub fn path(&self) -> &str {
        self.dsn.strip_prefix("sqlite:").unwrap_or(&self.dsn)
    }

    pub fn is_memory(&self) -> bool {
        self.path() == ":memory:"
    }
}

/// Caller-supplied connection options.
///
/// `error_mode` and `fetch_mode` are always overridden to `Raise` and `Named`
/// when the connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    pub error_mode: ErrorMode,
    pub fetch_mode: FetchMode,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Option<Duration>,
    pub read_only: bool,
    /// `PRAGMA name = value` statements run in order after open
    pub pragmas: Vec<(String, String)>,
}

impl ConnectOptions {
    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn pragma(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pragmas.push((name.into(), value.into()));
        self
    }

    /// Applies the two overrides every connection runs with.
    fn with_forced_modes(mut self) -> Self {
        self.error_mode = ErrorMode::Raise;
        self.fetch_mode = FetchMode::Named;
        self
    }

    fn open_flags(&self) -> OpenFlags {
        let base = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        base | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

/// A native SQLite connection plus the options it was opened with.
#[derive(Debug)]
pub struct DbConnection {
    conn: Connection,
    source: DataSource,
    options: ConnectOptions,
    transaction_state: TransactionState,
}

impl DbConnection {
    /// Opens a connection to `source`.
    ///
    /// # Errors
    ///
    /// Failures from the driver while opening or applying options are returned
    /// as `DbError::Connection`, untranslated. A malformed pragma name is a
    /// `DbError::Config`.
    pub fn open(source: DataSource, options: ConnectOptions) -> Result<Self> {
        let options = options.with_forced_modes();
        if source.username.is_some() || source.password.is_some() {
            debug!("SQLite ignores credentials for {}", source.path());
        }

        let conn = Connection::open_with_flags(source.path(), options.open_flags())
            .map_err(DbError::Connection)?;

        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout).map_err(DbError::Connection)?;
        }
        for (name, value) in &options.pragmas {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DbError::Config(format!("invalid pragma name: {name:?}")));
            }
            conn.execute_batch(&format!("PRAGMA {name} = {value};"))
                .map_err(DbError::Connection)?;
        }

        debug!("Opened database {}", source.path());
        Ok(DbConnection {
            conn,
            source,
            options,
            transaction_state: TransactionState::Idle,
        })
    }

    /// Opens a private in-memory database with default options.
    pub fn open_in_memory() -> Result<Self> {
        DbConnection::open(DataSource::new(":memory:"), ConnectOptions::default())
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Options in effect, after the forced overrides.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn prepare(&self, sql: &str) -> rusqlite::Result<Statement<'_>> {
        self.conn.prepare(sql)
    }

    pub fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    /// Row id of the most recent successful insert, as text.
    ///
    /// SQLite has no named sequences, so `_name` is accepted and ignored.
    pub fn last_insert_id(&self, _name: Option<&str>) -> String {
        self.conn.last_insert_rowid().to_string()
    }

    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// `DbError::TransactionState` if one is already active (no SQL is issued);
    /// `DbError::Query` if the driver rejects `BEGIN`.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction_state.is_active() {
            return Err(DbError::TransactionState(
                "Transaction already in progress".to_string(),
            ));
        }
        self.conn.execute_batch("BEGIN").map_err(DbError::query)?;
        self.transaction_state = TransactionState::Active;
        debug!("Transaction started");
        Ok(())
    }

    /// Commits the active transaction. A failed `COMMIT` leaves it active.
    pub fn commit(&mut self) -> Result<()> {
        self.require_active("commit")?;
        self.conn.execute_batch("COMMIT").map_err(DbError::query)?;
        self.transaction_state = TransactionState::Committed;
        debug!("Transaction committed");
        Ok(())
    }

    /// Rolls the active transaction back.
    pub fn roll_back(&mut self) -> Result<()> {
        self.require_active("roll back")?;
        let result = self.conn.execute_batch("ROLLBACK").map_err(DbError::query);
        // SQLite may already have rolled back on its own (e.g. after SQLITE_FULL)
        if result.is_ok() || self.conn.is_autocommit() {
            self.transaction_state = TransactionState::RolledBack;
            debug!("Transaction rolled back");
        }
        result
    }

    fn require_active(&self, action: &str) -> Result<()> {
        if self.transaction_state.is_active() {
            Ok(())
        } else {
            Err(DbError::TransactionState(format!(
                "No transaction in progress to {action}"
            )))
        }
    }

    /// Closes the native connection.
    pub fn close(self) -> Result<()> {
        let path = self.source.path().to_string();
        self.conn
            .close()
            .map_err(|(_, err)| DbError::Connection(err))?;
        debug!("Closed database {}", path);
        Ok(())
    }
}
