use crate::core::db::{
    ConnectOptions, DataSource, DbConnection, QueryExecutor, TableHelper, TracingLogger,
};
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
}

/// Connection settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub read_only: bool,
    /// Applied in key order after the connection opens
    pub pragmas: BTreeMap<String, toml::Value>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            dsn: ":memory:".to_string(),
            username: None,
            password: None,
            busy_timeout_ms: None,
            read_only: false,
            pragmas: BTreeMap::new(),
        }
    }
}

/// Query executor settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Log every statement with its arguments interpolated
    pub debug: bool,
}

impl DatabaseConfig {
    pub fn data_source(&self) -> DataSource {
        DataSource {
            dsn: self.dsn.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let mut options = ConnectOptions::default().read_only(self.read_only);
        if let Some(ms) = self.busy_timeout_ms {
            options = options.busy_timeout(Duration::from_millis(ms));
        }
        for (name, value) in &self.pragmas {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => (if *b { "ON" } else { "OFF" }).to_string(),
                other => {
                    return Err(DbError::Config(format!(
                        "pragma {name} has unsupported value {other}"
                    )))
                }
            };
            options = options.pragma(name, value);
        }
        Ok(options)
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DbError::Config(e.to_string()))
    }

    /// `<config dir>/dbhelper/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dbhelper").join("config.toml"))
    }

    /// Opens the configured database and wraps it in a table helper that
    /// logs through `tracing` when `executor.debug` is set.
    pub fn connect(&self) -> Result<TableHelper> {
        let conn = DbConnection::open(
            self.database.data_source(),
            self.database.connect_options()?,
        )?;
        let logger = Arc::new(TracingLogger);
        let executor = QueryExecutor::with_logger(conn, self.executor.debug, logger);
        Ok(TableHelper::new(executor))
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = dbhelper::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}
