//! Canonical SQL error
//!
//! `SqlError` is the (errno, SQLSTATE, message) triple reported to MySQL
//! clients. Its `Display` form is a wire contract: errors cross RPC
//! boundaries as plain strings and the classifier recovers the errno and
//! SQLSTATE by parsing that text, so the format must stay bit-exact:
//!
//! ```text
//! <message> (errno <N>) (sqlstate <SSSSS>)[ during query: <truncated query>]
//! ```

use crate::codes::SS_UNKNOWN_SQL_STATE;
use crate::truncate::truncate_for_log;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned by the database driver or produced by classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlError {
    num: u32,
    state: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
}

impl SqlError {
    /// Create a new error. An empty `state` defaults to `HY000`.
    pub fn new(num: u32, state: impl Into<String>, message: impl Into<String>) -> Self {
        let mut state = state.into();
        if state.is_empty() {
            state = SS_UNKNOWN_SQL_STATE.to_string();
        }
        Self {
            num,
            state,
            message: message.into(),
            query: None,
        }
    }

    /// Attach the query that caused the error.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// MySQL error number.
    pub fn number(&self) -> u32 {
        self.num
    }

    /// SQLSTATE value.
    pub fn sql_state(&self) -> &str {
        &self.state
    }

    /// Message without the errno/sqlstate suffix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending query, if one was attached.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (errno {}) (sqlstate {})",
            self.message, self.num, self.state
        )?;
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            write!(f, " during query: {}", truncate_for_log(query))?;
        }
        Ok(())
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;

    #[test]
    fn test_default_state() {
        let err = SqlError::new(ER_UNKNOWN_ERROR, "", "boom");
        assert_eq!(err.sql_state(), "HY000");
        assert_eq!(err.number(), 1105);
    }

    #[test]
    fn test_display_format() {
        let err = SqlError::new(ER_NO_DB, SS_NO_DB, "No database selected");
        assert_eq!(
            err.to_string(),
            "No database selected (errno 1046) (sqlstate 3D000)"
        );
    }

    #[test]
    fn test_display_with_query() {
        let err = SqlError::new(ER_BAD_FIELD_ERROR, SS_BAD_FIELD_ERROR, "Unknown column 'x'")
            .with_query("select x from t");
        assert_eq!(
            err.to_string(),
            "Unknown column 'x' (errno 1054) (sqlstate 42S22) during query: select x from t"
        );
        assert_eq!(err.query(), Some("select x from t"));
    }

    #[test]
    fn test_display_truncates_query() {
        let query = format!("select '{}'", "a".repeat(2000));
        let err = SqlError::new(ER_UNKNOWN_ERROR, "", "too long").with_query(query);
        let text = err.to_string();
        assert!(text.ends_with(" [TRUNCATED]"));
        assert!(text.len() < 700);
    }

    #[test]
    fn test_serde_roundtrip_preserves_identity() {
        let err = SqlError::new(ER_QUERY_INTERRUPTED, SS_QUERY_INTERRUPTED, "killed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("query"));
        let back: SqlError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
