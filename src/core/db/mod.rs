/// Database Module
///
/// The access layer is split into four concerns, leaf first:
/// - **Connection Handle** (`connection.rs`): wraps the rusqlite connection, forces the
///   error and fetch modes, and tracks transaction state
/// - **Query Executor** (`query.rs`): the fetch/execute primitives and SQL diagnostics
/// - **Statement Assembly** (`statement.rs`): builds parameterized SQL for table operations
/// - **Table Helper** (`helper.rs`): CRUD helpers and transaction scoping
///
/// ## Error Handling
///
/// All operations return the shared `DbError` type. Driver failures are translated
/// into `DbError::Query` at the executor boundary.
pub mod connection;
pub mod helper;
pub mod query;
pub mod statement;

pub use connection::*;
pub use helper::*;
pub use query::*;
pub use statement::*;
