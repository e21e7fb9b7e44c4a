//! A database session bound to one open transaction
//!
//! A `TxConnection` is created by Begin, handed out by id through the
//! [`ActivePool`](crate::ActivePool), and concluded exactly once: by commit,
//! rollback, the reaper, or pool shutdown. Concluding unregisters the id and
//! returns the session to the connection pool.

use crate::metrics::Conclusion;
use crate::tx_pool::TxShared;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tablet_core::codes::is_conn_err;
use tablet_core::{truncate_for_log, CallContext, RpcCode, TabletError, TransactionId};
use tablet_pool::{PooledConnection, QueryResult};
use tracing::debug;

/// Purpose recorded while Begin owns the entry.
pub(crate) const PURPOSE_BEGIN: &str = "for begin";

/// An open transaction and the session it runs on.
pub struct TxConnection {
    id: TransactionId,
    conn: Mutex<Option<PooledConnection>>,
    queries: Mutex<Vec<String>>,
    started: Instant,
    start_time: DateTime<Utc>,
    busy: AtomicBool,
    purpose: Mutex<String>,
    conclusion: Mutex<Option<Conclusion>>,
    broken: AtomicBool,
    pool: Weak<TxShared>,
}

impl TxConnection {
    /// Bind `conn` to transaction `id`. The new entry starts busy, owned by Begin.
    pub(crate) fn new(id: TransactionId, conn: PooledConnection, pool: Weak<TxShared>) -> Self {
        Self {
            id,
            conn: Mutex::new(Some(conn)),
            queries: Mutex::new(Vec::new()),
            started: Instant::now(),
            start_time: Utc::now(),
            busy: AtomicBool::new(true),
            purpose: Mutex::new(PURPOSE_BEGIN.to_string()),
            conclusion: Mutex::new(None),
            broken: AtomicBool::new(false),
            pool,
        }
    }

    /// An entry with no session and no owning pool.
    #[cfg(test)]
    pub(crate) fn detached(id: TransactionId) -> Self {
        Self {
            id,
            conn: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            started: Instant::now(),
            start_time: Utc::now(),
            busy: AtomicBool::new(true),
            purpose: Mutex::new(PURPOSE_BEGIN.to_string()),
            conclusion: Mutex::new(None),
            broken: AtomicBool::new(false),
            pool: Weak::new(),
        }
    }

    /// Transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Monotonic start instant, used for timeout checks.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Wall-clock start time, used in logs.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Time since Begin.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// True while a caller holds the entry.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Purpose of the current (or most recent) use.
    pub fn purpose(&self) -> String {
        self.purpose.lock().clone()
    }

    /// How the transaction ended, once it has.
    pub fn conclusion(&self) -> Option<Conclusion> {
        *self.conclusion.lock()
    }

    /// Statements recorded so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Append `sql` to the statement log.
    pub fn record_query(&self, sql: &str) {
        self.queries.lock().push(sql.to_string());
    }

    pub(crate) fn try_claim(&self, purpose: &str) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.purpose.lock() = purpose.to_string();
            true
        } else {
            false
        }
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Execute `sql` inside the transaction.
    ///
    /// `max_rows` of zero means unlimited. Column names are dropped unless
    /// `want_fields` is set. A lost session is marked broken and reported as
    /// an `Internal` error; other driver failures are `Unknown`.
    pub fn exec(
        &self,
        ctx: &CallContext,
        sql: &str,
        max_rows: usize,
        want_fields: bool,
    ) -> Result<QueryResult, TabletError> {
        if ctx.is_cancelled() {
            return Err(TabletError::new(RpcCode::Canceled, "context canceled"));
        }
        if ctx.is_expired() {
            return Err(TabletError::new(
                RpcCode::DeadlineExceeded,
                "context deadline exceeded",
            ));
        }

        let mut guard = self.conn.lock();
        let conn = match guard.as_mut() {
            Some(conn) => conn,
            None => {
                let reason = self
                    .conclusion()
                    .map_or_else(|| "no connection".to_string(), |c| format!("concluded by {}", c));
                return Err(TabletError::new(
                    RpcCode::Internal,
                    format!("Transaction {}: {}", self.id, reason),
                ));
            }
        };

        debug!(target: "tablet::txpool", txid = %self.id, sql = %truncate_for_log(sql), "Executing in transaction");
        match conn.execute(sql) {
            Ok(mut result) => {
                if max_rows > 0 && result.rows.len() > max_rows {
                    return Err(TabletError::new(
                        RpcCode::ResourceExhausted,
                        format!("Row count exceeded {}", max_rows),
                    ));
                }
                if !want_fields {
                    result.fields.clear();
                }
                Ok(result)
            }
            Err(err) if is_conn_err(err.number()) || conn.is_closed() => {
                self.broken.store(true, Ordering::Release);
                conn.close();
                Err(TabletError::from_sql(RpcCode::Internal, err))
            }
            Err(err) => Err(TabletError::from_sql(RpcCode::Unknown, err)),
        }
    }

    /// True once the session is unusable or gone.
    pub fn is_closed(&self) -> bool {
        self.broken.load(Ordering::Acquire)
            || self.conn.lock().as_ref().map_or(true, PooledConnection::is_closed)
    }

    /// Close the session. The server rolls back whatever it had open.
    pub fn close(&self) {
        if let Some(conn) = self.conn.lock().as_mut() {
            conn.close();
        }
    }

    /// Give the entry back to the registry.
    ///
    /// A transaction whose session broke is concluded instead, so the dead
    /// session is never handed out again.
    pub fn recycle(&self) {
        if self.conclusion().is_some() {
            return;
        }
        if self.is_closed() {
            self.conclude(Conclusion::Close);
            return;
        }
        self.release();
        if let Some(pool) = self.pool.upgrade() {
            pool.active.notify();
        }
    }

    /// End the transaction: return the session, unregister the id, count it.
    ///
    /// Only the first call has any effect. Returns whether this call concluded.
    /// The entry stays busy afterwards so it can never be claimed again.
    pub(crate) fn conclude(&self, reason: Conclusion) -> bool {
        {
            let mut conclusion = self.conclusion.lock();
            if conclusion.is_some() {
                return false;
            }
            *conclusion = Some(reason);
        }

        // Dropping the session returns it to the connection pool.
        drop(self.conn.lock().take());

        if let Some(pool) = self.pool.upgrade() {
            pool.active.unregister(self.id);
            pool.counters.record_conclusion(reason);
        }
        debug!(target: "tablet::txpool", txid = %self.id, conclusion = %reason, "Transaction concluded");
        true
    }

    /// One tab-separated line describing the transaction, for kill and
    /// diagnostic logs.
    pub fn format(&self) -> String {
        let mut line = String::new();
        let conclusion = self
            .conclusion()
            .map_or("active", |c| c.as_str());
        let _ = write!(
            line,
            "{}\t'{}'\t{}\t{:.6}\t{}\t",
            self.id,
            self.purpose(),
            self.start_time.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.age().as_secs_f64(),
            conclusion,
        );
        let queries = self.queries.lock();
        for (i, q) in queries.iter().enumerate() {
            if i > 0 {
                line.push(';');
            }
            line.push_str(&truncate_for_log(q));
        }
        line
    }
}

impl std::fmt::Debug for TxConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxConnection")
            .field("id", &self.id)
            .field("busy", &self.is_busy())
            .field("purpose", &self.purpose())
            .field("conclusion", &self.conclusion())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_busy() {
        let tx = TxConnection::detached(TransactionId::new(7));
        assert!(tx.is_busy());
        assert_eq!(tx.purpose(), PURPOSE_BEGIN);
        assert!(!tx.try_claim("for query"));

        tx.release();
        assert!(tx.try_claim("for query"));
        assert_eq!(tx.purpose(), "for query");
    }

    #[test]
    fn test_record_query_order() {
        let tx = TxConnection::detached(TransactionId::new(1));
        tx.record_query("insert into t values (1)");
        tx.record_query("update t set a = 2");
        assert_eq!(
            tx.queries(),
            vec!["insert into t values (1)", "update t set a = 2"]
        );
    }

    #[test]
    fn test_format_line() {
        let tx = TxConnection::detached(TransactionId::new(42));
        tx.record_query("select 1");
        tx.record_query("select 2");
        let line = tx.format();
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], "42");
        assert_eq!(fields[1], "'for begin'");
        assert_eq!(fields[4], "active");
        assert_eq!(fields[5], "select 1;select 2");
    }

    #[test]
    fn test_conclude_once() {
        let tx = TxConnection::detached(TransactionId::new(3));
        assert!(tx.conclude(Conclusion::Rollback));
        assert!(!tx.conclude(Conclusion::Kill));
        assert_eq!(tx.conclusion(), Some(Conclusion::Rollback));
        assert!(tx.is_busy());
    }

    #[test]
    fn test_concluded_entry_cannot_be_claimed() {
        let tx = TxConnection::detached(TransactionId::new(8));
        tx.release();
        assert!(tx.try_claim("for commit"));
        assert!(tx.conclude(Conclusion::Commit));

        assert!(!tx.try_claim("for closing"));
        assert!(!tx.try_claim("for transaction killer"));
        assert_eq!(tx.purpose(), "for commit");
    }

    #[test]
    fn test_exec_after_conclusion_is_internal() {
        let tx = TxConnection::detached(TransactionId::new(5));
        tx.conclude(Conclusion::Commit);
        let err = tx
            .exec(&CallContext::background(), "select 1", 0, false)
            .unwrap_err();
        assert_eq!(err.code(), RpcCode::Internal);
        assert_eq!(err.to_string(), "fatal: Transaction 5: concluded by commit");
    }

    #[test]
    fn test_exec_honors_context() {
        let tx = TxConnection::detached(TransactionId::new(6));
        let (ctx, cancel) = CallContext::cancellable();
        cancel.cancel();
        let err = tx.exec(&ctx, "select 1", 0, false).unwrap_err();
        assert_eq!(err.code(), RpcCode::Canceled);

        let expired = CallContext::background().with_timeout(Duration::ZERO);
        let err = tx.exec(&expired, "select 1", 0, false).unwrap_err();
        assert_eq!(err.code(), RpcCode::DeadlineExceeded);
    }
}
