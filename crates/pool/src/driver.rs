//! Database driver seam
//!
//! The pool never speaks the MySQL protocol itself. A [`Connector`] dials
//! sessions and each [`Connection`] executes statement text. Driver failures
//! are reported as [`SqlError`] so their errno and SQLSTATE reach the caller.

use serde::{Deserialize, Serialize};
use tablet_core::SqlError;

/// Result of one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, empty when fields were not requested.
    pub fields: Vec<String>,
    /// Rows changed by a DML statement.
    pub rows_affected: u64,
    /// Auto-increment id generated by an insert.
    pub insert_id: u64,
    /// Row values, `None` for SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// A result carrying only an affected-row count.
    pub fn with_rows_affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// One live database session.
pub trait Connection: Send {
    /// Session identifier assigned by the server.
    fn id(&self) -> u64;

    /// Execute `sql` and return its result.
    fn execute(&mut self, sql: &str) -> Result<QueryResult, SqlError>;

    /// True once the session is unusable.
    fn is_closed(&self) -> bool;

    /// Close the session. Idempotent.
    fn close(&mut self);
}

/// Dials new sessions for the pool.
pub trait Connector: Send + Sync + 'static {
    /// Open a new session.
    fn connect(&self) -> Result<Box<dyn Connection>, SqlError>;
}
