//! Registry of open transactions
//!
//! Maps each [`TransactionId`] to its [`TxConnection`]. Lookups claim the
//! entry's busy flag with a compare-and-swap, so a transaction is used by at
//! most one caller at a time and the reaper never touches a transaction
//! that is executing.
//!
//! Entries live in a `DashMap`; a separate mutex/condvar pair carries
//! "something changed" notifications for waiters (`wait_for_empty`, pool
//! shutdown). The mutex guards only a generation counter.

use crate::tx_connection::TxConnection;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablet_core::TransactionId;
use thiserror::Error;

/// Why a registry operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActiveError {
    /// No entry under the id.
    #[error("not found")]
    NotFound,

    /// The entry is claimed by another caller.
    #[error("in use: {0}")]
    InUse(String),

    /// An entry already exists under the id.
    #[error("already present")]
    AlreadyPresent,
}

/// Open transactions keyed by id.
pub struct ActivePool {
    entries: DashMap<TransactionId, Arc<TxConnection>>,
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Default for ActivePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivePool {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    /// Add `tx` under its id. The entry keeps whatever busy state `tx` has.
    pub fn register(&self, tx: Arc<TxConnection>) -> Result<(), ActiveError> {
        match self.entries.entry(tx.id()) {
            Entry::Occupied(_) => Err(ActiveError::AlreadyPresent),
            Entry::Vacant(slot) => {
                slot.insert(tx);
                self.notify();
                Ok(())
            }
        }
    }

    /// Claim the entry under `id` for `purpose`.
    pub fn get(&self, id: TransactionId, purpose: &str) -> Result<Arc<TxConnection>, ActiveError> {
        let tx = self
            .entries
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(ActiveError::NotFound)?;
        if tx.try_claim(purpose) {
            Ok(tx)
        } else {
            Err(ActiveError::InUse(tx.purpose()))
        }
    }

    /// Remove the entry under `id`. Returns false if it was already gone.
    pub fn unregister(&self, id: TransactionId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            self.notify();
        }
        removed
    }

    /// Claim every non-busy entry at least `age` old for `purpose`.
    ///
    /// Entries that are busy, or become busy during the scan, are skipped.
    /// An `age` of zero claims every idle entry.
    pub fn claim_outdated(&self, age: Duration, purpose: &str) -> Vec<Arc<TxConnection>> {
        let now = Instant::now();
        let candidates: Vec<Arc<TxConnection>> = self
            .entries
            .iter()
            .filter(|e| now.saturating_duration_since(e.value().started()) >= age)
            .map(|e| Arc::clone(e.value()))
            .collect();
        candidates
            .into_iter()
            .filter(|tx| tx.try_claim(purpose))
            .collect()
    }

    /// Every entry, busy or not, without claiming any.
    pub fn snapshot(&self) -> Vec<Arc<TxConnection>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of open transactions.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// True when no transaction is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wake waiters after an entry was released or removed.
    pub(crate) fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Current change generation.
    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until the generation moves past `seen` or `timeout` elapses.
    pub(crate) fn wait_changed(&self, seen: u64, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        while *generation == seen {
            if self.changed.wait_until(&mut generation, deadline).timed_out() {
                return;
            }
        }
    }

    /// Block until no transaction is registered.
    pub fn wait_for_empty(&self) {
        let mut generation = self.generation.lock();
        while !self.entries.is_empty() {
            self.changed.wait(&mut generation);
        }
    }
}
