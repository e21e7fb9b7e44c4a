//! Errors returned by the tablet to its RPC layer
//!
//! A `TabletError` pairs a coarse [`RpcCode`] with a message. Errors that
//! originate in the database driver keep the driver's [`SqlError`] so the
//! errno and SQLSTATE survive classification untouched.

use crate::codes::ER_QUERY_INTERRUPTED;
use crate::error::SqlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse status classification used by the RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcCode {
    /// Not an error.
    Ok,
    /// The operation was cancelled by the caller.
    Canceled,
    /// Unknown error.
    Unknown,
    /// Client specified an invalid argument.
    InvalidArgument,
    /// Deadline expired before the operation could complete.
    DeadlineExceeded,
    /// Some requested entity was not found.
    NotFound,
    /// The entity already exists.
    AlreadyExists,
    /// Caller lacks permission.
    PermissionDenied,
    /// Some resource has been exhausted.
    ResourceExhausted,
    /// The system is not in a state required for the operation.
    FailedPrecondition,
    /// The operation was aborted, typically by a concurrency issue.
    Aborted,
    /// Operation attempted past the valid range.
    OutOfRange,
    /// Operation is not implemented or supported.
    Unimplemented,
    /// Internal invariant broken.
    Internal,
    /// The service is currently unavailable.
    Unavailable,
    /// Unrecoverable data loss or corruption.
    DataLoss,
    /// Request lacks valid authentication credentials.
    Unauthenticated,
}

/// Structured error conditions raised by the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorState {
    /// Numeric value out of range.
    DataOutOfRange,
    /// No database selected.
    NoDb,
    /// Operands of a SELECT have a different number of columns.
    WrongNumberOfColumnsInSelect,
    /// Unknown column.
    BadFieldError,
}

const CONN_POOL_CLOSED: &str = "connection pool is closed";
const QUERY_KILLED: &str = "the query was killed either because it timed out or was canceled: ";

/// Error returned across the tablet's RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletError {
    code: RpcCode,
    state: Option<ErrorState>,
    message: String,
    sql: Option<SqlError>,
}

impl TabletError {
    /// Create an error with a code and message.
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            state: None,
            message: message.into(),
            sql: None,
        }
    }

    /// Wrap a driver error. The driver error's text becomes the message.
    pub fn from_sql(code: RpcCode, err: SqlError) -> Self {
        Self {
            code,
            state: None,
            message: err.to_string(),
            sql: Some(err),
        }
    }

    /// Attach a structured error condition.
    pub fn with_state(mut self, state: ErrorState) -> Self {
        self.state = Some(state);
        self
    }

    /// The sentinel returned by every operation on a closed pool.
    pub fn conn_pool_closed() -> Self {
        Self::new(RpcCode::Internal, CONN_POOL_CLOSED)
    }

    /// True if this is the closed-pool sentinel.
    pub fn is_conn_pool_closed(&self) -> bool {
        self.code == RpcCode::Internal && self.sql.is_none() && self.message == CONN_POOL_CLOSED
    }

    /// Coarse classification.
    pub fn code(&self) -> RpcCode {
        self.code
    }

    /// Structured condition, if any.
    pub fn state(&self) -> Option<ErrorState> {
        self.state
    }

    /// Message without the prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The driver error this was built from, if any.
    pub fn sql_error(&self) -> Option<&SqlError> {
        self.sql.as_ref()
    }

    /// Prefix prepended to the message in the text form.
    pub fn prefix(&self) -> String {
        let mut prefix = match self.code {
            RpcCode::Internal => "fatal: ",
            RpcCode::ResourceExhausted => "tx_pool_full: ",
            RpcCode::Aborted => "not_in_tx: ",
            RpcCode::FailedPrecondition | RpcCode::Unavailable => "retry: ",
            _ => "error: ",
        }
        .to_string();
        if self.sql.as_ref().map(SqlError::number) == Some(ER_QUERY_INTERRUPTED) {
            prefix.push_str(QUERY_KILLED);
        }
        prefix
    }
}

impl fmt::Display for TabletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.message)
    }
}

impl std::error::Error for TabletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.sql.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<SqlError> for TabletError {
    fn from(err: SqlError) -> Self {
        TabletError::from_sql(RpcCode::Unknown, err)
    }
}
