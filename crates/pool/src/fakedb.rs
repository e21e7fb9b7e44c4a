//! In-memory fake database for tests
//!
//! `FakeDb` answers registered statements with canned results and everything
//! else with an error, like a MySQL server that only knows a fixed script.
//! It can be shut down (new dials fail with errno 2003) or switched into a
//! failing mode where every statement drops the session (errno 2013).

use crate::driver::{Connection, Connector, QueryResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablet_core::codes::{CR_CONN_HOST_ERROR, CR_SERVER_GONE, CR_SERVER_LOST, ER_UNKNOWN_ERROR};
use tablet_core::SqlError;

#[derive(Clone)]
struct Canned {
    result: QueryResult,
    delay: Option<Duration>,
}

struct FakeDbInner {
    name: String,
    queries: Mutex<HashMap<String, Canned>>,
    rejected: Mutex<HashMap<String, String>>,
    query_log: Mutex<Vec<String>>,
    closed: AtomicBool,
    conn_fail: AtomicBool,
    open_conns: AtomicUsize,
    next_conn_id: AtomicU64,
}

fn normalize(sql: &str) -> String {
    sql.trim().to_lowercase()
}

/// Scripted fake database server.
#[derive(Clone)]
pub struct FakeDb {
    inner: Arc<FakeDbInner>,
}

impl FakeDb {
    /// New server with an empty script. `begin`, `commit` and `rollback`
    /// are always accepted.
    pub fn new(name: impl Into<String>) -> Self {
        let db = Self {
            inner: Arc::new(FakeDbInner {
                name: name.into(),
                queries: Mutex::new(HashMap::new()),
                rejected: Mutex::new(HashMap::new()),
                query_log: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                conn_fail: AtomicBool::new(false),
                open_conns: AtomicUsize::new(0),
                next_conn_id: AtomicU64::new(1),
            }),
        };
        for sql in ["begin", "commit", "rollback"] {
            db.add_query(sql, QueryResult::default());
        }
        db
    }

    /// Server name, used in error messages.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Answer `sql` with `result`.
    pub fn add_query(&self, sql: &str, result: QueryResult) {
        self.inner.queries.lock().insert(
            normalize(sql),
            Canned {
                result,
                delay: None,
            },
        );
    }

    /// Answer `sql` with `result` after sleeping for `delay`.
    pub fn add_query_with_delay(&self, sql: &str, result: QueryResult, delay: Duration) {
        self.inner.queries.lock().insert(
            normalize(sql),
            Canned {
                result,
                delay: Some(delay),
            },
        );
    }

    /// Fail `sql` with errno 1105 and `message`.
    pub fn add_rejected_query(&self, sql: &str, message: impl Into<String>) {
        let key = normalize(sql);
        self.inner.queries.lock().remove(&key);
        self.inner.rejected.lock().insert(key, message.into());
    }

    /// Forget `sql`, whether accepted or rejected.
    pub fn delete_query(&self, sql: &str) {
        let key = normalize(sql);
        self.inner.queries.lock().remove(&key);
        self.inner.rejected.lock().remove(&key);
    }

    /// Stop accepting new connections.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Accept new connections again.
    pub fn reopen(&self) {
        self.inner.closed.store(false, Ordering::SeqCst);
    }

    /// Make every statement drop its session.
    pub fn enable_conn_fail(&self) {
        self.inner.conn_fail.store(true, Ordering::SeqCst);
    }

    /// Undo [`enable_conn_fail`](Self::enable_conn_fail).
    pub fn disable_conn_fail(&self) {
        self.inner.conn_fail.store(false, Ordering::SeqCst);
    }

    /// Sessions currently open against this server.
    pub fn open_connections(&self) -> usize {
        self.inner.open_conns.load(Ordering::SeqCst)
    }

    /// Every statement received, in arrival order.
    pub fn query_log(&self) -> Vec<String> {
        self.inner.query_log.lock().clone()
    }

    /// Clear the statement log.
    pub fn clear_query_log(&self) {
        self.inner.query_log.lock().clear();
    }

    /// A connector that dials this server.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

impl Connector for FakeDb {
    fn connect(&self) -> Result<Box<dyn Connection>, SqlError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SqlError::new(
                CR_CONN_HOST_ERROR,
                "",
                format!("Can't connect to MySQL server on '{}'", self.inner.name),
            ));
        }
        self.inner.open_conns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            id: self.inner.next_conn_id.fetch_add(1, Ordering::SeqCst),
            db: Arc::clone(&self.inner),
            closed: false,
        }))
    }
}

struct FakeConnection {
    id: u64,
    db: Arc<FakeDbInner>,
    closed: bool,
}

impl Connection for FakeConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn execute(&mut self, sql: &str) -> Result<QueryResult, SqlError> {
        if self.closed {
            return Err(SqlError::new(CR_SERVER_GONE, "", "MySQL server has gone away").with_query(sql));
        }
        self.db.query_log.lock().push(sql.to_string());

        if self.db.conn_fail.load(Ordering::SeqCst) {
            self.close();
            return Err(
                SqlError::new(CR_SERVER_LOST, "", "Lost connection to MySQL server during query")
                    .with_query(sql),
            );
        }

        let key = normalize(sql);
        if let Some(message) = self.db.rejected.lock().get(&key) {
            return Err(SqlError::new(ER_UNKNOWN_ERROR, "", message.clone()).with_query(sql));
        }
        let canned = self.db.queries.lock().get(&key).cloned();
        match canned {
            Some(canned) => {
                if let Some(delay) = canned.delay {
                    std::thread::sleep(delay);
                }
                Ok(canned.result)
            }
            None => Err(SqlError::new(
                ER_UNKNOWN_ERROR,
                "",
                format!("query: '{}' is not supported on {}", sql, self.db.name),
            )),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.db.open_conns.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_queries() {
        let db = FakeDb::new("fakedb");
        db.add_query("select 1", QueryResult::with_rows_affected(1));
        let mut conn = db.connect().unwrap();

        assert_eq!(conn.execute("  SELECT 1 ").unwrap().rows_affected, 1);
        assert!(conn.execute("begin").is_ok());

        let err = conn.execute("select 2").unwrap_err();
        assert_eq!(err.number(), ER_UNKNOWN_ERROR);
        assert!(err.message().contains("is not supported on fakedb"));
        assert_eq!(db.query_log(), vec!["  SELECT 1 ", "begin", "select 2"]);
    }

    #[test]
    fn test_rejected_query() {
        let db = FakeDb::new("fakedb");
        db.add_rejected_query("begin", "rejected");
        let mut conn = db.connect().unwrap();
        let err = conn.execute("begin").unwrap_err();
        assert_eq!(err.message(), "rejected");
        assert_eq!(err.query(), Some("begin"));

        db.delete_query("begin");
        assert!(conn.execute("begin").is_err());
    }

    #[test]
    fn test_closed_server_refuses_dial() {
        let db = FakeDb::new("fakedb");
        db.close();
        let err = db.connect().err().unwrap();
        assert_eq!(err.number(), CR_CONN_HOST_ERROR);
        db.reopen();
        assert!(db.connect().is_ok());
    }

    #[test]
    fn test_conn_fail_drops_session() {
        let db = FakeDb::new("fakedb");
        let mut conn = db.connect().unwrap();
        assert_eq!(db.open_connections(), 1);

        db.enable_conn_fail();
        let err = conn.execute("begin").unwrap_err();
        assert_eq!(err.number(), CR_SERVER_LOST);
        assert!(conn.is_closed());
        assert_eq!(db.open_connections(), 0);

        db.disable_conn_fail();
        assert_eq!(conn.execute("begin").unwrap_err().number(), CR_SERVER_GONE);
    }

    #[test]
    fn test_drop_counts_once() {
        let db = FakeDb::new("fakedb");
        let mut conn = db.connect().unwrap();
        conn.close();
        drop(conn);
        assert_eq!(db.open_connections(), 0);
    }
}
