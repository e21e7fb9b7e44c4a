//! Error classification into canonical [`SqlError`] values
//!
//! Resolution order:
//! 1. the error already is (or carries) a `SqlError`
//! 2. a structured [`ErrorState`] maps to a fixed errno/SQLSTATE pair
//! 3. the text contains a rendered `(errno N) (sqlstate S)` pair
//! 4. the coarse [`RpcCode`] picks a generic errno/SQLSTATE
//!
//! Classification never fails: anything without a better signal becomes
//! `ER_UNKNOWN_ERROR` / `HY000` with the original text as message.

use crate::codes::*;
use crate::error::SqlError;
use crate::tablet_error::{ErrorState, RpcCode, TabletError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static ERR_EXTRACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*\(errno ([0-9]*)\) \(sqlstate ([0-9a-zA-Z]{5})\).*")
        .expect("errno extraction pattern is valid")
});

static GRPC_OVERFLOW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*grpc: received message larger than max \(\d+ vs. \d+\)")
        .expect("grpc overflow pattern is valid")
});

/// An error the classifier knows how to inspect.
///
/// Only `Display` is required; the other hooks default to "no signal".
pub trait Classify: fmt::Display {
    /// The canonical error this already is, if any.
    fn as_sql_error(&self) -> Option<SqlError> {
        None
    }

    /// Structured condition attached by the query layer.
    fn error_state(&self) -> Option<ErrorState> {
        None
    }

    /// Coarse status used when nothing more specific is known.
    fn rpc_code(&self) -> RpcCode {
        RpcCode::Unknown
    }
}

impl Classify for SqlError {
    fn as_sql_error(&self) -> Option<SqlError> {
        Some(self.clone())
    }
}

impl Classify for TabletError {
    fn as_sql_error(&self) -> Option<SqlError> {
        self.sql_error().map(|sql| {
            let err = SqlError::new(
                sql.number(),
                sql.sql_state(),
                format!("{}{}", self.prefix(), sql.message()),
            );
            match sql.query() {
                Some(query) => err.with_query(query),
                None => err,
            }
        })
    }

    fn error_state(&self) -> Option<ErrorState> {
        self.state()
    }

    fn rpc_code(&self) -> RpcCode {
        self.code()
    }
}

/// Classify an error into its canonical form.
pub fn classify<E: Classify + ?Sized>(err: &E) -> SqlError {
    if let Some(sql) = err.as_sql_error() {
        return sql;
    }
    if let Some(state) = err.error_state() {
        let (num, ss) = state_mapping(state);
        return SqlError::new(num, ss, err.to_string());
    }
    classify_message(&err.to_string(), err.rpc_code())
}

/// Classify already-rendered error text.
///
/// `code` is the status the text arrived with; it is only consulted when the
/// text carries no errno/sqlstate pair.
pub fn classify_message(msg: &str, code: RpcCode) -> SqlError {
    match ERR_EXTRACT.captures(msg) {
        Some(caps) => match caps[1].parse::<u32>() {
            Ok(num) => SqlError::new(num, &caps[2], msg),
            Err(_) => SqlError::new(ER_UNKNOWN_ERROR, SS_UNKNOWN_SQL_STATE, msg),
        },
        None => {
            let (num, ss) = code_mapping(code, msg);
            SqlError::new(num, ss, msg)
        }
    }
}

fn state_mapping(state: ErrorState) -> (u32, &'static str) {
    match state {
        ErrorState::DataOutOfRange => (ER_DATA_OUT_OF_RANGE, SS_DATA_OUT_OF_RANGE),
        ErrorState::NoDb => (ER_NO_DB, SS_NO_DB),
        ErrorState::WrongNumberOfColumnsInSelect => {
            (ER_WRONG_NUMBER_OF_COLUMNS_IN_SELECT, SS_WRONG_NUMBER_OF_COLUMNS)
        }
        ErrorState::BadFieldError => (ER_BAD_FIELD_ERROR, SS_BAD_FIELD_ERROR),
    }
}

fn code_mapping(code: RpcCode, msg: &str) -> (u32, &'static str) {
    match code {
        RpcCode::Canceled | RpcCode::DeadlineExceeded | RpcCode::Aborted => {
            (ER_QUERY_INTERRUPTED, SS_QUERY_INTERRUPTED)
        }
        RpcCode::PermissionDenied | RpcCode::Unauthenticated => {
            (ER_ACCESS_DENIED_ERROR, SS_ACCESS_DENIED_ERROR)
        }
        RpcCode::ResourceExhausted => (
            demux_resource_exhausted(msg),
            SS_SYNTAX_ERROR_OR_ACCESS_VIOLATION,
        ),
        RpcCode::Unimplemented => (ER_NOT_SUPPORTED_YET, SS_SYNTAX_ERROR_OR_ACCESS_VIOLATION),
        RpcCode::Internal => (ER_INTERNAL_ERROR, SS_UNKNOWN_SQL_STATE),
        RpcCode::Ok
        | RpcCode::Unknown
        | RpcCode::InvalidArgument
        | RpcCode::NotFound
        | RpcCode::AlreadyExists
        | RpcCode::FailedPrecondition
        | RpcCode::OutOfRange
        | RpcCode::Unavailable
        | RpcCode::DataLoss => (ER_UNKNOWN_ERROR, SS_UNKNOWN_SQL_STATE),
    }
}

// Matches the transport's wording; revisit if the transport rewords it.
fn demux_resource_exhausted(msg: &str) -> u32 {
    if GRPC_OVERFLOW.is_match(msg) {
        ER_NET_PACKET_TOO_LARGE
    } else {
        ER_TOO_MANY_USER_CONNECTIONS
    }
}
