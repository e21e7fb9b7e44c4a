//! Connection pool errors

use tablet_core::{Classify, RpcCode, SqlError};
use thiserror::Error;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Why a connection could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool was closed.
    #[error("resource pool is closed")]
    Closed,

    /// No connection became available before the caller's deadline.
    #[error("resource pool timed out")]
    Exhausted,

    /// The caller cancelled the wait.
    #[error("resource pool wait cancelled")]
    Cancelled,

    /// Dialing a new session failed.
    #[error("{0}")]
    Connect(SqlError),
}

impl Classify for PoolError {
    fn as_sql_error(&self) -> Option<SqlError> {
        match self {
            PoolError::Connect(err) => Some(err.clone()),
            _ => None,
        }
    }

    fn rpc_code(&self) -> RpcCode {
        match self {
            PoolError::Closed => RpcCode::Internal,
            PoolError::Exhausted => RpcCode::ResourceExhausted,
            PoolError::Cancelled => RpcCode::Canceled,
            PoolError::Connect(_) => RpcCode::Unknown,
        }
    }
}
