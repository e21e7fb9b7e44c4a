//! Core types for the tablet transaction layer
//!
//! This crate defines what every other layer shares:
//! - SqlError: canonical (errno, SQLSTATE, message) error and its text form
//! - TabletError: RPC-facing error with a coarse status code
//! - classify: maps any error onto a SqlError
//! - CallContext: per-call deadline and cancellation
//! - TransactionId: handle naming an open transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod codes;
pub mod context;
pub mod error;
pub mod tablet_error;
pub mod truncate;
pub mod types;

pub use classify::{classify, classify_message, Classify};
pub use context::{CallContext, CancelHandle};
pub use error::SqlError;
pub use tablet_error::{ErrorState, RpcCode, TabletError};
pub use truncate::{truncate_for_log, truncate_query, MAX_QUERY_LOG_LEN};
pub use types::TransactionId;
