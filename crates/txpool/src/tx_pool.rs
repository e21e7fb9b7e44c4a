//! Transaction pool
//!
//! Multiplexes client transactions onto a bounded [`ConnectionPool`].
//!
//! ## Lifecycle
//!
//! `Closed -> Open -> Closing -> Closed`. Begin is only accepted while Open.
//! Close reclaims every outstanding transaction exactly once, even while
//! Begins are in flight: Begin registers its entry busy and re-checks the
//! state afterwards, rolling itself back if the pool started closing.
//!
//! ## Reaping
//!
//! A [`Ticker`] runs every `timeout / 10` and kills non-busy transactions
//! older than the timeout. Busy transactions are never touched; they are
//! reconsidered on a later tick once recycled.

use crate::active_pool::{ActiveError, ActivePool};
use crate::config::TxPoolConfig;
use crate::metrics::{Conclusion, Counters, TxPoolMetrics};
use crate::tx_connection::TxConnection;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablet_core::codes::is_conn_err;
use tablet_core::{CallContext, RpcCode, TabletError, TransactionId};
use tablet_pool::{ConnectionPool, Connector, PoolError, PoolStats, Ticker};
use tracing::{debug, info, warn};

/// Minimum spacing between two dumps of the active transactions.
const LOG_ACTIVE_INTERVAL: Duration = Duration::from_secs(60);

/// How long Close waits for a busy transaction before re-scanning.
const CLOSE_RESCAN_INTERVAL: Duration = Duration::from_millis(100);

const PURPOSE_COMMIT: &str = "for commit";
const PURPOSE_ROLLBACK: &str = "for rollback";
const PURPOSE_KILL: &str = "for transaction killer";
const PURPOSE_CLOSE: &str = "for closing";

/// Lifecycle state of a [`TxPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPoolState {
    /// Not accepting work. Initial and final state.
    Closed,
    /// Accepting Begin.
    Open,
    /// Close is reclaiming outstanding transactions.
    Closing,
}

/// State shared with transactions and the reaper thread.
pub(crate) struct TxShared {
    pub(crate) name: String,
    pub(crate) active: ActivePool,
    pub(crate) counters: Counters,
    timeout_ns: AtomicU64,
}

impl TxShared {
    fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_ns.load(Ordering::Relaxed))
    }

    /// Kill every idle transaction older than the timeout.
    fn reap(&self) -> usize {
        let timeout = self.timeout();
        let victims = self.active.claim_outdated(timeout, PURPOSE_KILL);
        let mut killed = 0;
        for tx in &victims {
            let line = tx.format();
            tx.close();
            if !tx.conclude(Conclusion::Kill) {
                continue;
            }
            killed += 1;
            warn!(
                target: "tablet::txpool",
                pool = %self.name,
                txid = %tx.id(),
                timeout_ms = timeout.as_millis() as u64,
                "Killing transaction (exceeded timeout): {}",
                line
            );
        }
        killed
    }
}

struct Lifecycle {
    state: TxPoolState,
    /// The current connection pool, or the last one after close. Replaced on open.
    conns: Option<Arc<ConnectionPool>>,
}

/// Pool of open transactions over a bounded connection pool.
pub struct TxPool {
    config: TxPoolConfig,
    shared: Arc<TxShared>,
    lifecycle: Mutex<Lifecycle>,
    reaper: Mutex<Option<Ticker>>,
    last_id: AtomicU64,
    pool_timeout_ns: AtomicU64,
    last_log_active: Mutex<Option<Instant>>,
}

fn not_in_tx(id: TransactionId, err: ActiveError) -> TabletError {
    TabletError::new(RpcCode::Aborted, format!("Transaction {}: {}", id, err))
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl TxPool {
    /// Create a closed pool. Call [`open`](Self::open) before use.
    pub fn new(config: TxPoolConfig) -> Self {
        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0) as u64;
        Self {
            shared: Arc::new(TxShared {
                name: config.name.clone(),
                active: ActivePool::new(),
                counters: Counters::default(),
                timeout_ns: AtomicU64::new(duration_ns(config.transaction_timeout())),
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: TxPoolState::Closed,
                conns: None,
            }),
            reaper: Mutex::new(None),
            last_id: AtomicU64::new(seed),
            pool_timeout_ns: AtomicU64::new(duration_ns(config.pool_timeout())),
            last_log_active: Mutex::new(None),
            config,
        }
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxPoolState {
        self.lifecycle.lock().state
    }

    /// Open the connection pool against `connector` and start the reaper.
    ///
    /// Does nothing unless the pool is Closed. Returns whether this call
    /// opened it.
    pub fn open(&self, connector: Arc<dyn Connector>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != TxPoolState::Closed {
            return false;
        }
        lifecycle.conns = Some(Arc::new(ConnectionPool::open(
            self.shared.name.clone(),
            connector,
            self.config.capacity,
            self.config.idle_timeout(),
        )));
        lifecycle.state = TxPoolState::Open;

        let shared = Arc::clone(&self.shared);
        *self.reaper.lock() = Some(Ticker::start(
            format!("{}-reaper", self.shared.name),
            self.timeout() / 10,
            move || {
                shared.reap();
            },
        ));
        info!(
            target: "tablet::txpool",
            pool = %self.shared.name,
            capacity = self.config.capacity,
            timeout_ms = self.timeout().as_millis() as u64,
            "Transaction pool opened"
        );
        true
    }

    fn open_conns(&self) -> Result<Arc<ConnectionPool>, TabletError> {
        let lifecycle = self.lifecycle.lock();
        match (&lifecycle.state, &lifecycle.conns) {
            (TxPoolState::Open, Some(conns)) => Ok(Arc::clone(conns)),
            _ => Err(TabletError::conn_pool_closed()),
        }
    }

    /// Start a transaction and return its id.
    ///
    /// Waits for a connection for at most the pool timeout, or less if `ctx`
    /// expires first.
    pub fn begin(&self, ctx: &CallContext) -> Result<TransactionId, TabletError> {
        let conns = self.open_conns()?;

        let pool_timeout = self.pool_timeout();
        let bounded = if pool_timeout.is_zero() {
            ctx.clone()
        } else {
            ctx.clone().with_timeout(pool_timeout)
        };
        let mut conn = match conns.get(&bounded) {
            Ok(conn) => conn,
            Err(PoolError::Closed) => return Err(TabletError::conn_pool_closed()),
            Err(PoolError::Exhausted) => {
                self.shared.counters.record_pool_full();
                self.log_active();
                return Err(TabletError::new(
                    RpcCode::ResourceExhausted,
                    "Transaction pool connection limit exceeded",
                ));
            }
            Err(PoolError::Cancelled) => {
                return Err(TabletError::new(
                    RpcCode::Canceled,
                    "transaction pool wait cancelled",
                ))
            }
            Err(PoolError::Connect(err)) => {
                return Err(TabletError::from_sql(RpcCode::Internal, err))
            }
        };

        if let Err(err) = conn.execute("begin") {
            let code = if is_conn_err(err.number()) {
                conn.close();
                RpcCode::Internal
            } else {
                RpcCode::Unknown
            };
            return Err(TabletError::from_sql(code, err));
        }

        let id = TransactionId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let tx = Arc::new(TxConnection::new(id, conn, Arc::downgrade(&self.shared)));
        if let Err(err) = self.shared.active.register(Arc::clone(&tx)) {
            tx.close();
            tx.conclude(Conclusion::Close);
            return Err(TabletError::new(
                RpcCode::Internal,
                format!("Transaction {}: {}", id, err),
            ));
        }

        // Close may have started while this Begin was waiting; it will not
        // reclaim a busy entry, so the entry reclaims itself.
        if self.state() != TxPoolState::Open {
            if let Err(err) = tx.exec(ctx, "rollback", 1, false) {
                debug!(target: "tablet::txpool", txid = %id, error = %err, "Rollback during close failed");
                tx.close();
            }
            tx.conclude(Conclusion::Close);
            return Err(TabletError::conn_pool_closed());
        }

        self.shared.counters.record_begin();
        tx.recycle();
        debug!(target: "tablet::txpool", txid = %id, "Transaction begun");
        Ok(id)
    }

    /// Claim transaction `id` for `purpose`.
    ///
    /// The caller must hand it back with [`TxConnection::recycle`] or end it
    /// with commit / rollback.
    pub fn get(&self, id: TransactionId, purpose: &str) -> Result<Arc<TxConnection>, TabletError> {
        self.shared
            .active
            .get(id, purpose)
            .map_err(|err| not_in_tx(id, err))
    }

    /// Commit transaction `id`.
    ///
    /// The transaction is concluded whether or not the commit statement
    /// succeeds.
    pub fn commit(&self, ctx: &CallContext, id: TransactionId) -> Result<(), TabletError> {
        let tx = self.get(id, PURPOSE_COMMIT)?;
        let result = tx.exec(ctx, "commit", 1, false);
        tx.conclude(Conclusion::Commit);
        result.map(|_| ())
    }

    /// Roll back transaction `id`.
    ///
    /// If the rollback statement fails the session is closed rather than
    /// returned with an open transaction.
    pub fn rollback(&self, ctx: &CallContext, id: TransactionId) -> Result<(), TabletError> {
        let tx = self.get(id, PURPOSE_ROLLBACK)?;
        Self::rollback_claimed(ctx, &tx)
    }

    fn rollback_claimed(ctx: &CallContext, tx: &TxConnection) -> Result<(), TabletError> {
        let result = tx.exec(ctx, "rollback", 1, false);
        if result.is_err() {
            tx.close();
        }
        tx.conclude(Conclusion::Rollback);
        result.map(|_| ())
    }

    /// Roll back every transaction not currently in use. Busy ones are left
    /// alone.
    pub fn rollback_non_busy(&self, ctx: &CallContext) {
        for tx in self.shared.active.claim_outdated(Duration::ZERO, PURPOSE_ROLLBACK) {
            if let Err(err) = Self::rollback_claimed(ctx, &tx) {
                warn!(target: "tablet::txpool", txid = %tx.id(), error = %err, "Rollback of idle transaction failed");
            }
        }
    }

    /// Kill expired transactions now instead of waiting for the next tick.
    pub fn reap(&self) -> usize {
        self.shared.reap()
    }

    /// Shut down.
    ///
    /// Every remaining transaction is closed and counted as stray; busy
    /// transactions are waited for. Returns once the connection pool is
    /// closed. A second call is a no-op.
    pub fn close(&self) {
        let conns = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != TxPoolState::Open {
                return;
            }
            lifecycle.state = TxPoolState::Closing;
            lifecycle.conns.clone()
        };
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.stop();
        }
        info!(target: "tablet::txpool", pool = %self.shared.name, "Transaction pool closing");

        loop {
            let seen = self.shared.active.generation();
            for tx in self.shared.active.claim_outdated(Duration::ZERO, PURPOSE_CLOSE) {
                let line = tx.format();
                tx.close();
                if !tx.conclude(Conclusion::Close) {
                    continue;
                }
                self.shared.counters.record_stray();
                warn!(
                    target: "tablet::txpool",
                    pool = %self.shared.name,
                    txid = %tx.id(),
                    "Rolling back stray transaction: {}",
                    line
                );
            }
            if self.shared.active.is_empty() {
                break;
            }
            self.shared.active.wait_changed(seen, CLOSE_RESCAN_INTERVAL);
        }

        if let Some(conns) = conns {
            conns.close();
        }
        self.lifecycle.lock().state = TxPoolState::Closed;
        info!(target: "tablet::txpool", pool = %self.shared.name, "Transaction pool closed");
    }

    /// Block until no transaction is open.
    pub fn wait_for_empty(&self) {
        self.shared.active.wait_for_empty();
    }

    /// Transaction timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    /// Change the transaction timeout and re-arm the reaper at `timeout / 10`.
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.timeout_ns.store(duration_ns(timeout), Ordering::Relaxed);
        if let Some(reaper) = self.reaper.lock().as_ref() {
            reaper.set_interval(timeout / 10);
        }
    }

    /// Longest Begin waits for a connection.
    pub fn pool_timeout(&self) -> Duration {
        Duration::from_nanos(self.pool_timeout_ns.load(Ordering::Relaxed))
    }

    /// Change how long Begin waits for a connection.
    pub fn set_pool_timeout(&self, timeout: Duration) {
        self.pool_timeout_ns.store(duration_ns(timeout), Ordering::Relaxed);
    }

    /// Connection pool capacity. Zero before the first open and after close.
    pub fn capacity(&self) -> usize {
        self.lifecycle
            .lock()
            .conns
            .as_ref()
            .map_or(0, |c| c.capacity())
    }

    /// Connections not checked out. Zero before the first open and after close.
    pub fn available(&self) -> usize {
        self.lifecycle
            .lock()
            .conns
            .as_ref()
            .map_or(0, |c| c.available())
    }

    /// Statistics of the current connection pool, or of the last one after
    /// close. `None` before the first open.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.lifecycle.lock().conns.as_ref().map(|c| c.stats())
    }

    /// Number of open transactions.
    pub fn active_count(&self) -> usize {
        self.shared.active.size()
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> TxPoolMetrics {
        self.shared
            .counters
            .snapshot(self.shared.active.size() as u64)
    }

    /// Log every open transaction, at most once per minute.
    pub fn log_active(&self) {
        {
            let mut last = self.last_log_active.lock();
            if last.map_or(false, |t| t.elapsed() < LOG_ACTIVE_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        let active = self.shared.active.snapshot();
        warn!(
            target: "tablet::txpool",
            pool = %self.shared.name,
            open = active.len(),
            "Transaction pool exhausted, open transactions follow"
        );
        for tx in active {
            warn!(target: "tablet::txpool", pool = %self.shared.name, "{}", tx.format());
        }
    }
}

impl Drop for TxPool {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.stop();
        }
    }
}
