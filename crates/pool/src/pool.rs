//! Fixed-capacity pool of database sessions
//!
//! Capacity is an explicit counter guarded by the same mutex as the idle set:
//! `in_use + idle.len() <= capacity` holds whenever the lock is released.
//! Connections checked out of the pool are owned by a [`PooledConnection`];
//! returning one is a move (or a drop), so a connection cannot be released
//! twice and cannot leak.

use crate::driver::{Connection, Connector, QueryResult};
use crate::error::{PoolError, Result};
use crate::ticker::Ticker;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablet_core::{CallContext, SqlError};
use tracing::{debug, info};

/// How often a cancellable wait re-checks its cancel flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct IdleConn {
    conn: Box<dyn Connection>,
    since: Instant,
}

struct PoolState {
    capacity: usize,
    in_use: usize,
    idle: VecDeque<IdleConn>,
    idle_timeout: Duration,
    closed: bool,
}

impl PoolState {
    fn is_expired(&self, idle: &IdleConn) -> bool {
        !self.idle_timeout.is_zero() && idle.since.elapsed() > self.idle_timeout
    }
}

pub(crate) struct PoolShared {
    name: String,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    returned: Condvar,
    wait_count: AtomicU64,
    wait_time_ns: AtomicU64,
    idle_closed: AtomicU64,
}

impl PoolShared {
    fn put_back(&self, conn: Box<dyn Connection>) {
        let discarded = {
            let mut state = self.state.lock();
            debug_assert!(state.in_use > 0, "connection returned to {} twice", self.name);
            state.in_use = state.in_use.saturating_sub(1);
            let over = state.in_use + state.idle.len() >= state.capacity;
            let discarded = if conn.is_closed() || over {
                Some(conn)
            } else {
                state.idle.push_back(IdleConn {
                    conn,
                    since: Instant::now(),
                });
                None
            };
            self.returned.notify_all();
            discarded
        };
        if let Some(mut conn) = discarded {
            conn.close();
        }
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);
        self.returned.notify_all();
    }

    fn close_expired_idle(&self) -> usize {
        let expired: Vec<IdleConn> = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            let mut i = 0;
            while i < state.idle.len() {
                if state.is_expired(&state.idle[i]) {
                    if let Some(idle) = state.idle.remove(i) {
                        expired.push(idle);
                    }
                } else {
                    i += 1;
                }
            }
            if !expired.is_empty() {
                self.returned.notify_all();
            }
            expired
        };
        let count = expired.len();
        close_all(expired.into_iter().map(|i| i.conn));
        self.idle_closed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

fn close_all(conns: impl IntoIterator<Item = Box<dyn Connection>>) {
    for mut conn in conns {
        conn.close();
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dropping it returns the session to the pool. A session that was closed
/// (by the caller or by the driver) is discarded on return and its slot freed.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolShared>,
}

impl PooledConnection {
    fn conn_mut(&mut self) -> &mut Box<dyn Connection> {
        // `conn` is only taken in Drop.
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("pooled connection used after return"))
    }

    /// Server-assigned session id.
    pub fn id(&self) -> u64 {
        self.conn.as_ref().map_or(0, |c| c.id())
    }

    /// Execute a statement on the session.
    pub fn execute(&mut self, sql: &str) -> std::result::Result<QueryResult, SqlError> {
        self.conn_mut().execute(sql)
    }

    /// True once the session is unusable.
    pub fn is_closed(&self) -> bool {
        self.conn.as_ref().map_or(true, |c| c.is_closed())
    }

    /// Close the session now. It is discarded when returned.
    pub fn close(&mut self) {
        self.conn_mut().close();
    }

    /// Name of the owning pool.
    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name)
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured maximum number of sessions.
    pub capacity: usize,
    /// Capacity not currently checked out.
    pub available: usize,
    /// Sessions checked out (including ones being dialed).
    pub in_use: usize,
    /// Open sessions waiting in the pool.
    pub idle: usize,
    /// Number of `get` calls that had to wait.
    pub wait_count: u64,
    /// Total time spent waiting.
    pub wait_time: Duration,
    /// Idle sessions closed for exceeding the idle timeout.
    pub idle_closed: u64,
}

/// Bounded pool of database sessions.
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    idle_sweeper: Mutex<Option<Ticker>>,
}

impl ConnectionPool {
    /// Open a pool of at most `capacity` sessions dialed by `connector`.
    ///
    /// Sessions are dialed lazily. An `idle_timeout` of zero keeps idle
    /// sessions forever; otherwise they are swept every `idle_timeout / 10`.
    pub fn open(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Self {
        let name = name.into();
        let shared = Arc::new(PoolShared {
            name: name.clone(),
            connector,
            state: Mutex::new(PoolState {
                capacity,
                in_use: 0,
                idle: VecDeque::with_capacity(capacity),
                idle_timeout,
                closed: false,
            }),
            returned: Condvar::new(),
            wait_count: AtomicU64::new(0),
            wait_time_ns: AtomicU64::new(0),
            idle_closed: AtomicU64::new(0),
        });

        let pool = Self {
            shared,
            idle_sweeper: Mutex::new(None),
        };
        pool.set_idle_timeout(idle_timeout);
        info!(target: "tablet::pool", pool = %name, capacity, "Connection pool opened");
        pool
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Check out a session, waiting for one to be returned if the pool is at
    /// capacity.
    ///
    /// The wait is bounded by `ctx`'s deadline ([`PoolError::Exhausted`]) and
    /// abandoned if `ctx` is cancelled ([`PoolError::Cancelled`]).
    pub fn get(&self, ctx: &CallContext) -> Result<PooledConnection> {
        let mut wait_started: Option<Instant> = None;
        let mut expired = Vec::new();
        let mut state = self.shared.state.lock();

        let outcome = loop {
            if state.closed {
                break Err(PoolError::Closed);
            }
            if ctx.is_cancelled() {
                break Err(PoolError::Cancelled);
            }

            let mut reused = None;
            while let Some(idle) = state.idle.pop_back() {
                if state.is_expired(&idle) {
                    expired.push(idle.conn);
                } else {
                    reused = Some(idle.conn);
                    break;
                }
            }
            if let Some(conn) = reused {
                state.in_use += 1;
                break Ok(Some(conn));
            }
            if state.in_use + state.idle.len() < state.capacity {
                state.in_use += 1;
                break Ok(None);
            }

            if ctx.is_expired() {
                break Err(PoolError::Exhausted);
            }
            if wait_started.is_none() {
                wait_started = Some(Instant::now());
                self.shared.wait_count.fetch_add(1, Ordering::Relaxed);
            }
            let poll = if ctx.is_cancellable() {
                Some(Instant::now() + CANCEL_POLL_INTERVAL)
            } else {
                None
            };
            match (ctx.deadline(), poll) {
                (Some(deadline), Some(poll)) => {
                    self.shared.returned.wait_until(&mut state, deadline.min(poll));
                }
                (Some(deadline), None) => {
                    self.shared.returned.wait_until(&mut state, deadline);
                }
                (None, Some(poll)) => {
                    self.shared.returned.wait_until(&mut state, poll);
                }
                (None, None) => self.shared.returned.wait(&mut state),
            }
        };
        drop(state);

        if let Some(started) = wait_started {
            self.shared
                .wait_time_ns
                .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        }
        if !expired.is_empty() {
            self.shared
                .idle_closed
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            close_all(expired);
        }

        let conn = match outcome? {
            Some(conn) => conn,
            None => match self.shared.connector.connect() {
                Ok(conn) => {
                    debug!(target: "tablet::pool", pool = %self.shared.name, conn_id = conn.id(), "Dialed new connection");
                    conn
                }
                Err(e) => {
                    self.shared.release_slot();
                    return Err(PoolError::Connect(e));
                }
            },
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.shared),
        })
    }

    /// Return a session to the pool. Equivalent to dropping it.
    pub fn put(&self, conn: PooledConnection) {
        debug_assert!(
            Arc::ptr_eq(&conn.pool, &self.shared),
            "connection returned to the wrong pool"
        );
        drop(conn);
    }

    /// Change the capacity, blocking until the pool fits inside it.
    ///
    /// Surplus idle sessions are closed immediately; checked-out sessions are
    /// closed as they come back.
    pub fn set_capacity(&self, capacity: usize) {
        let mut surplus = Vec::new();
        {
            let mut state = self.shared.state.lock();
            state.capacity = capacity;
            self.shared.returned.notify_all();
            loop {
                while state.in_use + state.idle.len() > state.capacity {
                    match state.idle.pop_front() {
                        Some(idle) => surplus.push(idle.conn),
                        None => break,
                    }
                }
                if state.in_use + state.idle.len() <= state.capacity {
                    break;
                }
                self.shared.returned.wait(&mut state);
            }
        }
        close_all(surplus);
    }

    /// Change the idle timeout and re-arm the idle sweeper.
    pub fn set_idle_timeout(&self, idle_timeout: Duration) {
        self.shared.state.lock().idle_timeout = idle_timeout;

        let mut sweeper = self.idle_sweeper.lock();
        if idle_timeout.is_zero() {
            if let Some(ticker) = sweeper.take() {
                ticker.stop();
            }
            return;
        }
        let interval = idle_timeout / 10;
        match sweeper.as_ref() {
            Some(ticker) => ticker.set_interval(interval),
            None => {
                let shared = Arc::clone(&self.shared);
                *sweeper = Some(Ticker::start(
                    format!("{}-idle", self.shared.name),
                    interval,
                    move || {
                        let closed = shared.close_expired_idle();
                        if closed > 0 {
                            debug!(target: "tablet::pool", pool = %shared.name, closed, "Closed idle connections");
                        }
                    },
                ));
            }
        }
    }

    /// Close idle sessions older than the idle timeout. Returns how many.
    pub fn close_idle(&self) -> usize {
        self.shared.close_expired_idle()
    }

    /// Close the pool.
    ///
    /// Further `get` calls fail with [`PoolError::Closed`]. Returns only after
    /// every checked-out session has been returned and every session closed;
    /// capacity is zero afterwards. Calling it again is a no-op.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            self.shared.returned.notify_all();
        }
        if let Some(ticker) = self.idle_sweeper.lock().take() {
            ticker.stop();
        }
        self.set_capacity(0);
        info!(target: "tablet::pool", pool = %self.shared.name, "Connection pool closed");
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Configured maximum number of sessions.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }

    /// Capacity not currently checked out.
    pub fn available(&self) -> usize {
        let state = self.shared.state.lock();
        state.capacity.saturating_sub(state.in_use)
    }

    /// Sessions currently checked out.
    pub fn in_use(&self) -> usize {
        self.shared.state.lock().in_use
    }

    /// Idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.shared.state.lock().idle_timeout
    }

    /// Snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            capacity: state.capacity,
            available: state.capacity.saturating_sub(state.in_use),
            in_use: state.in_use,
            idle: state.idle.len(),
            wait_count: self.shared.wait_count.load(Ordering::Relaxed),
            wait_time: Duration::from_nanos(self.shared.wait_time_ns.load(Ordering::Relaxed)),
            idle_closed: self.shared.idle_closed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(ticker) = self.idle_sweeper.get_mut().take() {
            ticker.stop();
        }
    }
}
