//! Canonical errors at the server boundary

use crate::*;
use tablet::codes::*;
use tablet::{classify_message, CallContext, RpcCode, TransactionId};

#[test]
fn unknown_transaction() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();

    let err = server
        .execute(&ctx, TransactionId::new(12345), SELECT, 0)
        .unwrap_err();
    assert_eq!(err.number(), ER_QUERY_INTERRUPTED);
    assert_eq!(err.sql_state(), SS_QUERY_INTERRUPTED);
    assert_eq!(err.message(), "not_in_tx: Transaction 12345: not found");
    server.shutdown();
}

#[test]
fn begin_after_shutdown() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    server.shutdown();

    let err = server.begin(&CallContext::background()).unwrap_err();
    assert_eq!(err.number(), ER_INTERNAL_ERROR);
    assert_eq!(err.message(), "fatal: connection pool is closed");
}

#[test]
fn driver_error_keeps_errno_and_state() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();
    let id = server.begin(&ctx).unwrap();

    let err = server
        .execute(&ctx, id, "select * from missing", 0)
        .unwrap_err();
    assert_eq!(err.number(), ER_UNKNOWN_ERROR);
    assert_eq!(err.sql_state(), SS_UNKNOWN_SQL_STATE);
    assert!(err.message().starts_with("error: query: "));

    // The rendered text re-classifies to the same pair.
    let again = classify_message(&err.to_string(), RpcCode::Unknown);
    assert_eq!(again.number(), err.number());
    assert_eq!(again.sql_state(), err.sql_state());

    server.rollback(&ctx, id).unwrap();
    server.shutdown();
}

#[test]
fn unreachable_database() {
    let db = scripted_db();
    db.close();
    let server = open_server(&db, 1);

    let err = server.begin(&CallContext::background()).unwrap_err();
    assert_eq!(err.number(), CR_CONN_HOST_ERROR);
    assert!(err.to_string().contains("errno 2003"));
    server.shutdown();
}

#[test]
fn pool_full() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();
    let held = server.begin(&ctx).unwrap();

    let err = server.begin(&ctx).unwrap_err();
    assert_eq!(err.number(), ER_TOO_MANY_USER_CONNECTIONS);
    assert_eq!(err.sql_state(), SS_SYNTAX_ERROR_OR_ACCESS_VIOLATION);

    server.commit(&ctx, held).unwrap();
    server.shutdown();
}

#[test]
fn row_limit() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();
    let id = server.begin(&ctx).unwrap();

    let err = server.execute(&ctx, id, SELECT, 1).unwrap_err();
    assert_eq!(err.message(), "tx_pool_full: Row count exceeded 1");
    assert_eq!(err.number(), ER_TOO_MANY_USER_CONNECTIONS);

    server.rollback(&ctx, id).unwrap();
    server.shutdown();
}
