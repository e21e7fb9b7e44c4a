//! Tablet Server Test Suite
//!
//! End-to-end tests through the `TabletServer` facade: every error observed
//! here has already crossed the classifier.
//!
//! ## Modules
//!
//! - `lifecycle`: begin / execute / commit / rollback and shutdown
//! - `errors`: canonical errno and SQLSTATE at the boundary
//! - `config`: loading the pool configuration from `txpool.toml`
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test tablet_server
//! cargo test --test tablet_server errors::
//! ```

use std::sync::Arc;

use tablet::{FakeDb, QueryResult, TabletServer, TxPoolConfig};

mod config;
mod errors;
mod lifecycle;

pub const INSERT: &str = "insert into accounts values (1, 100)";
pub const SELECT: &str = "select id, balance from accounts";

/// A fake server that knows the statements used across the suite.
pub fn scripted_db() -> FakeDb {
    let db = FakeDb::new("tabletdb");
    db.add_query(INSERT, QueryResult::with_rows_affected(1));
    db.add_query(
        SELECT,
        QueryResult {
            fields: vec!["id".to_string(), "balance".to_string()],
            rows: vec![
                vec![Some("1".to_string()), Some("100".to_string())],
                vec![Some("2".to_string()), None],
            ],
            ..QueryResult::default()
        },
    );
    db
}

/// An open server with `capacity` connections.
pub fn open_server(db: &FakeDb, capacity: usize) -> Arc<TabletServer> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let server = TabletServer::builder()
        .config(TxPoolConfig {
            name: "SuitePool".to_string(),
            capacity,
            transaction_timeout_ms: 30_000,
            idle_timeout_ms: 0,
            pool_timeout_ms: 50,
        })
        .build()
        .unwrap();
    server.open(db.connector()).unwrap();
    Arc::new(server)
}
