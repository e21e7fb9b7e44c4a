//! MySQL error numbers and SQLSTATE values
//!
//! Only the codes the tablet produces or recognizes are listed. Numbers follow
//! the MySQL server (`ER_*`) and client (`CR_*`) error tables.

// ============================================================================
// Server error numbers
// ============================================================================

/// Access denied for user.
pub const ER_ACCESS_DENIED_ERROR: u32 = 1045;
/// No database selected.
pub const ER_NO_DB: u32 = 1046;
/// Unknown column.
pub const ER_BAD_FIELD_ERROR: u32 = 1054;
/// Unknown error.
pub const ER_UNKNOWN_ERROR: u32 = 1105;
/// Packet bigger than the allowed maximum.
pub const ER_NET_PACKET_TOO_LARGE: u32 = 1153;
/// User has too many active connections.
pub const ER_TOO_MANY_USER_CONNECTIONS: u32 = 1203;
/// Operands of a SELECT have a different number of columns.
pub const ER_WRONG_NUMBER_OF_COLUMNS_IN_SELECT: u32 = 1222;
/// Feature not supported yet.
pub const ER_NOT_SUPPORTED_YET: u32 = 1235;
/// Query execution was interrupted.
pub const ER_QUERY_INTERRUPTED: u32 = 1317;
/// Value out of range.
pub const ER_DATA_OUT_OF_RANGE: u32 = 1690;
/// Internal error.
pub const ER_INTERNAL_ERROR: u32 = 1815;

// ============================================================================
// Client error numbers
// ============================================================================

/// Can't connect to local server through socket.
pub const CR_CONNECTION_ERROR: u32 = 2002;
/// Can't connect to server on host.
pub const CR_CONN_HOST_ERROR: u32 = 2003;
/// Server has gone away.
pub const CR_SERVER_GONE: u32 = 2006;
/// Lost connection to server during query.
pub const CR_SERVER_LOST: u32 = 2013;

// ============================================================================
// SQLSTATE values
// ============================================================================

/// General error, used when no better state is known.
pub const SS_UNKNOWN_SQL_STATE: &str = "HY000";
/// Invalid authorization specification.
pub const SS_ACCESS_DENIED_ERROR: &str = "28000";
/// Syntax error or access rule violation.
pub const SS_SYNTAX_ERROR_OR_ACCESS_VIOLATION: &str = "42000";
/// Query interrupted.
pub const SS_QUERY_INTERRUPTED: &str = "70100";
/// Numeric value out of range.
pub const SS_DATA_OUT_OF_RANGE: &str = "22003";
/// Invalid catalog name.
pub const SS_NO_DB: &str = "3D000";
/// Cardinality violation.
pub const SS_WRONG_NUMBER_OF_COLUMNS: &str = "21000";
/// Column not found.
pub const SS_BAD_FIELD_ERROR: &str = "42S22";

/// Returns true if `num` is a client-side error meaning the session to the
/// server is unusable.
pub fn is_conn_err(num: u32) -> bool {
    matches!(
        num,
        CR_CONNECTION_ERROR | CR_CONN_HOST_ERROR | CR_SERVER_GONE | CR_SERVER_LOST
    )
}
