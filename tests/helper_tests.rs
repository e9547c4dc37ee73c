//! End-to-end behaviour of the table helper over an in-memory database.

use dbhelper::{
    Args, DbConnection, DbError, QueryExecutor, Record, SqlLogger, TableHelper, Value,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl SqlLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// A caller's own error type, to check `trans` hands errors back untouched.
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(i64),
}

fn setup() -> (TableHelper, Arc<RecordingLogger>) {
    let conn = DbConnection::open_in_memory().unwrap();
    conn.execute_batch(
        "
        CREATE TABLE accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            balance INTEGER NOT NULL DEFAULT 0,
            frozen BOOLEAN NOT NULL DEFAULT 0
        );
    ",
    )
    .unwrap();
    let logger = Arc::new(RecordingLogger::default());
    let executor = QueryExecutor::with_logger(conn, true, logger.clone());
    (TableHelper::new(executor), logger)
}

fn account(owner: &str, balance: i64) -> Record {
    Record::new().set("owner", owner).set("balance", balance)
}

#[test]
fn test_insert_issues_one_statement_per_row() {
    let (helper, logger) = setup();
    let inserted = helper
        .insert(
            "accounts",
            vec![account("alice", 10), account("bob", 20), account("carol", 30)],
        )
        .unwrap();
    assert_eq!(inserted, 3);

    let lines = logger.lines();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "SQL:{INSERT INTO accounts (owner,balance) VALUES (alice,10);}"
    );
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 3);
}

#[test]
fn test_update_round_trip() {
    let (helper, logger) = setup();
    helper
        .insert("accounts", vec![account("alice", 10), account("bob", 20)])
        .unwrap();

    let changed = helper
        .update(
            "accounts",
            Record::new().set("balance", 99).set("frozen", true),
            Record::new().set("owner", "bob").set("balance", 20),
        )
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(
        logger.lines().last().unwrap(),
        "SQL:{UPDATE accounts SET balance = 99,frozen = 1 WHERE owner = bob AND balance = 20;}"
    );

    let bob = helper.get_by_id("accounts", "id", 2).unwrap();
    assert_eq!(bob.get("balance"), Some(&Value::Integer(99)));
    assert_eq!(bob.get("frozen"), Some(&Value::Integer(1)));
    assert_eq!(helper.count("accounts", [("frozen", true)]).unwrap(), 1);
}

#[test]
fn test_nested_arguments_issue_no_sql() {
    let (helper, logger) = setup();
    let nested = Record::from_json(json!({"owner": "x", "balance": {"amount": 1}})).unwrap();
    let filter = Record::new().set("id", 1);

    assert!(matches!(
        helper.update("accounts", nested.clone(), filter.clone()),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.update("accounts", filter.clone(), nested.clone()),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.update_table_all_rows("accounts", nested.clone()),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.delete("accounts", nested.clone(), 1),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.insert("accounts", nested),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.update("", filter.clone(), filter.clone()),
        Err(DbError::Argument(_))
    ));
    assert!(matches!(
        helper.update("accounts", Record::new(), filter),
        Err(DbError::Argument(_))
    ));

    assert!(logger.lines().is_empty(), "no statement may reach the executor");
}

#[test]
fn test_delete_limit_and_unbounded() {
    let (helper, _) = setup();
    let rows: Vec<Record> = (0..5).map(|i| account("same", i)).collect();
    helper.insert("accounts", rows).unwrap();

    assert_eq!(helper.delete("accounts", [("owner", "same")], 1).unwrap(), 1);
    assert_eq!(helper.delete("accounts", [("owner", "same")], 2).unwrap(), 2);
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 2);
    assert_eq!(helper.delete("accounts", [("owner", "same")], -1).unwrap(), 2);
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 0);
}

#[test]
fn test_delete_with_empty_where_is_bounded_by_limit() {
    let (helper, _) = setup();
    helper
        .insert("accounts", vec![account("a", 1), account("b", 2), account("c", 3)])
        .unwrap();
    assert_eq!(helper.delete("accounts", Record::new(), 1).unwrap(), 1);
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 2);
    assert_eq!(helper.delete("accounts", Record::new(), 0).unwrap(), 2);
}

#[test]
fn test_count_filtered_and_total() {
    let (helper, _) = setup();
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 0);
    helper
        .insert(
            "accounts",
            vec![account("alice", 5), account("alice", 7), account("bob", 5)],
        )
        .unwrap();
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 3);
    assert_eq!(helper.count("accounts", [("owner", "alice")]).unwrap(), 2);
    assert_eq!(
        helper
            .count("accounts", Record::new().set("owner", "alice").set("balance", 5))
            .unwrap(),
        1
    );
    assert_eq!(helper.count("accounts", [("owner", "nobody")]).unwrap(), 0);
}

#[test]
fn test_trans_failure_leaves_state_unchanged() {
    let (mut helper, _) = setup();
    helper.insert("accounts", account("alice", 50)).unwrap();

    let result = helper.trans(|db| -> Result<(), AppError> {
        db.update("accounts", [("balance", 0)], [("owner", "alice")])?;
        db.insert("accounts", account("bob", 50))?;
        Err(AppError::InsufficientFunds(50))
    });

    match result {
        Err(AppError::InsufficientFunds(amount)) => assert_eq!(amount, 50),
        other => panic!("Expected the unit of work's own error, got {other:?}"),
    }
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 1);
    let alice = helper.get_by_id("accounts", "owner", "alice").unwrap();
    assert_eq!(alice.get("balance"), Some(&Value::Integer(50)));
}

#[test]
fn test_trans_success_is_visible_afterwards() {
    let (mut helper, _) = setup();
    let id = helper
        .trans(|db| -> Result<String, AppError> {
            db.insert("accounts", account("dana", 1))?;
            Ok(db.executor().last_insert_id(None)?)
        })
        .unwrap();
    assert_eq!(id, "1");
    assert_eq!(helper.count("accounts", [("owner", "dana")]).unwrap(), 1);
}

#[test]
fn test_panicking_unit_of_work_rolls_back() {
    let (mut helper, _) = setup();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = helper.trans(|db| -> Result<(), DbError> {
            db.insert("accounts", account("eve", 1))?;
            panic!("unit of work blew up");
        });
    }));
    assert!(outcome.is_err());
    assert_eq!(helper.count("accounts", Record::new()).unwrap(), 0);
}

#[test]
fn test_fetch_one_row_no_match_matches_malformed_query_error() {
    // Pinned: zero rows and a broken statement are the same error variant.
    let (helper, _) = setup();
    let executor = helper.executor();

    let missing = executor
        .fetch_one_row("SELECT * FROM accounts WHERE id = ?", &Args::positional([1]))
        .unwrap_err();
    let malformed = executor
        .fetch_one_row("SELEC * FROM accounts", &Args::none())
        .unwrap_err();

    assert_eq!(
        std::mem::discriminant(&missing),
        std::mem::discriminant(&malformed)
    );
    assert!(matches!(missing, DbError::Query(_)));
    let detail = malformed.detail().unwrap();
    assert!(detail.code.is_some());
    assert_eq!(detail.extended_code, Some(1));
}

#[test]
fn test_closed_executor_rejects_operations() {
    let (mut helper, _) = setup();
    helper.executor_mut().close().unwrap();
    assert!(matches!(
        helper.count("accounts", Record::new()),
        Err(DbError::Closed)
    ));
}
