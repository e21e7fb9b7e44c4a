//! Transaction pool counters
//!
//! Counters use Relaxed ordering: they are observational only and do not
//! order any other memory access.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// Committed by the client.
    Commit,
    /// Rolled back by the client or by `rollback_non_busy`.
    Rollback,
    /// Killed by the reaper after exceeding the transaction timeout.
    Kill,
    /// Closed because the session broke or the pool shut down.
    Close,
}

impl Conclusion {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Conclusion::Commit => "commit",
            Conclusion::Rollback => "rollback",
            Conclusion::Kill => "kill",
            Conclusion::Close => "close",
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    killed: AtomicU64,
    closed: AtomicU64,
    stray: AtomicU64,
    pool_full: AtomicU64,
}

impl Counters {
    pub(crate) fn record_begin(&self) {
        self.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conclusion(&self, conclusion: Conclusion) {
        let counter = match conclusion {
            Conclusion::Commit => &self.committed,
            Conclusion::Rollback => &self.rolled_back,
            Conclusion::Kill => &self.killed,
            Conclusion::Close => &self.closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stray(&self) {
        self.stray.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_full(&self) {
        self.pool_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, open_transactions: u64) -> TxPoolMetrics {
        TxPoolMetrics {
            open_transactions,
            total_begun: self.begun.load(Ordering::Relaxed),
            total_committed: self.committed.load(Ordering::Relaxed),
            total_rolled_back: self.rolled_back.load(Ordering::Relaxed),
            total_killed: self.killed.load(Ordering::Relaxed),
            total_closed: self.closed.load(Ordering::Relaxed),
            stray_transactions: self.stray.load(Ordering::Relaxed),
            pool_full_errors: self.pool_full.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time transaction pool metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPoolMetrics {
    /// Transactions currently registered.
    pub open_transactions: u64,
    /// Transactions successfully begun.
    pub total_begun: u64,
    /// Transactions concluded by commit.
    pub total_committed: u64,
    /// Transactions concluded by rollback.
    pub total_rolled_back: u64,
    /// Transactions killed by the reaper.
    pub total_killed: u64,
    /// Transactions closed on a broken session or at shutdown.
    pub total_closed: u64,
    /// Transactions still open when the pool was closed.
    pub stray_transactions: u64,
    /// Begin calls that found no free connection in time.
    pub pool_full_errors: u64,
}

impl TxPoolMetrics {
    /// Transactions that have ended, by any route.
    pub fn total_concluded(&self) -> u64 {
        self.total_committed + self.total_rolled_back + self.total_killed + self.total_closed
    }
}
