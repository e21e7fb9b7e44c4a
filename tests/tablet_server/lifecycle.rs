//! Transaction lifecycle through the server facade

use crate::*;
use std::thread;
use std::time::Duration;
use tablet::{CallContext, Conclusion};

#[test]
fn begin_execute_commit() {
    let db = scripted_db();
    let server = open_server(&db, 2);
    let ctx = CallContext::background();

    let id = server.begin(&ctx).unwrap();
    let result = server.execute(&ctx, id, INSERT, 0).unwrap();
    assert_eq!(result.rows_affected, 1);
    let result = server.execute(&ctx, id, SELECT, 10).unwrap();
    assert_eq!(result.fields, vec!["id", "balance"]);
    assert_eq!(result.rows[1][1], None);

    let tx = server.tx_pool().get(id, "for inspection").unwrap();
    assert_eq!(tx.queries(), vec![INSERT, SELECT]);
    tx.recycle();

    server.commit(&ctx, id).unwrap();
    assert_eq!(tx.conclusion(), Some(Conclusion::Commit));
    assert_eq!(db.query_log(), vec!["begin", INSERT, SELECT, "commit"]);
    server.shutdown();
}

#[test]
fn rollback_returns_connection_once() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();

    for _ in 0..5 {
        let id = server.begin(&ctx).unwrap();
        server.execute(&ctx, id, INSERT, 0).unwrap();
        server.rollback(&ctx, id).unwrap();
        assert_eq!(server.tx_pool().available(), 1);
    }
    assert_eq!(db.open_connections(), 1);
    assert_eq!(server.metrics().total_rolled_back, 5);
    server.shutdown();
}

#[test]
fn shutdown_rolls_back_idle_transactions() {
    let db = scripted_db();
    let server = open_server(&db, 3);
    let ctx = CallContext::background();

    server.begin(&ctx).unwrap();
    server.begin(&ctx).unwrap();
    server.shutdown();

    let metrics = server.metrics();
    assert_eq!(metrics.total_rolled_back, 2);
    assert_eq!(metrics.stray_transactions, 0);
    assert_eq!(metrics.open_transactions, 0);
    assert_eq!(db.open_connections(), 0);
}

#[test]
fn idle_transaction_is_reaped() {
    let db = scripted_db();
    let server = open_server(&db, 1);
    let ctx = CallContext::background();

    let id = server.begin(&ctx).unwrap();
    server.tx_pool().set_timeout(Duration::from_millis(5));
    server.tx_pool().wait_for_empty();

    assert_eq!(server.metrics().total_killed, 1);
    assert!(server.commit(&ctx, id).is_err());

    // The killed transaction's slot is free again.
    server.tx_pool().set_timeout(Duration::from_secs(30));
    let next = server.begin(&ctx).unwrap();
    server.commit(&ctx, next).unwrap();
    server.shutdown();
}

#[test]
fn concurrent_clients_share_capacity() {
    let db = scripted_db();
    let server = open_server(&db, 2);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let ctx = CallContext::background().with_timeout(Duration::from_secs(10));
                for _ in 0..10 {
                    // Retry while the pool is full; the pool itself never retries.
                    let id = loop {
                        match server.begin(&ctx) {
                            Ok(id) => break id,
                            Err(e) if e.number() == tablet::codes::ER_TOO_MANY_USER_CONNECTIONS => {
                                thread::yield_now()
                            }
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    };
                    server.execute(&ctx, id, INSERT, 0).unwrap();
                    server.commit(&ctx, id).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(server.metrics().total_committed, 60);
    assert!(db.open_connections() <= 2);
    server.shutdown();
}
