//! Command-line front end: run one statement or count one table.
use crate::config::{load_config, Config};
use crate::core::{Args, Record, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

/// dbhelper - run one statement or count one table of a SQLite database
#[derive(Parser, Debug, Default, PartialEq)]
#[command(name = "dbhelper", version)]
#[command(about = "Run one statement or count one table of a SQLite database", long_about = None)]
pub struct CliOptions {
    /// Configuration file (default: <config dir>/dbhelper/config.toml)
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log every statement with its arguments interpolated
    #[arg(long = "debug")]
    pub debug: bool,

    /// Print the row count of TABLE after any statement
    #[arg(long = "count", value_name = "TABLE")]
    pub count: Option<String>,

    /// Data source, overriding the configured one (`:memory:`, a path or `sqlite:<path>`)
    #[arg(short = 'd', long = "dsn")]
    pub dsn: Option<String>,

    /// Statement to run
    #[arg(required_unless_present = "count")]
    pub sql: Option<String>,
}

/// Whether a statement produces a result set to print.
pub fn returns_rows(sql: &str) -> bool {
    let sql_upper = sql.trim_start().to_uppercase();
    ["SELECT", "WITH", "PRAGMA", "VALUES", "EXPLAIN"]
        .iter()
        .any(|keyword| sql_upper.starts_with(keyword))
        || sql_upper.contains(" RETURNING ")
}

fn resolve_config(options: &CliOptions) -> Result<Config> {
    let mut config = match &options.config {
        Some(path) => load_config(path)?,
        None => match Config::default_path() {
            Some(path) if path.exists() => load_config(path)?,
            _ => Config::default(),
        },
    };
    if let Some(dsn) = &options.dsn {
        config.database.dsn = dsn.clone();
    }
    config.executor.debug |= options.debug;
    Ok(config)
}

/// Executes what `options` asks for, writing results to `out`.
///
/// Rows print as one JSON object per line; other statements print the
/// affected-row count.
pub fn run<W: Write>(options: &CliOptions, out: &mut W) -> Result<()> {
    let config = resolve_config(options)?;
    let mut helper = config.connect()?;

    if let Some(sql) = &options.sql {
        if returns_rows(sql) {
            for row in helper.executor().fetch_all_rows(sql, &Args::none())? {
                writeln!(out, "{}", serde_json::to_string(&row)?)?;
            }
        } else {
            let affected = helper.executor().execute(sql, &Args::none())?;
            writeln!(out, "{affected}")?;
        }
    }
    if let Some(table) = &options.count {
        writeln!(out, "{}", helper.count(table, Record::new())?)?;
    }
    helper.executor_mut().close()
}
