//! Per-call deadline and cancellation
//!
//! A `CallContext` travels with a request into blocking pool operations.
//! Waits are bounded by its deadline and abandoned once it is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline and cancellation signal for one call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

/// Cancels the contexts created alongside it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Signal cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl CallContext {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context paired with a handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = Self {
            deadline: None,
            cancelled: Some(Arc::clone(&flag)),
        };
        (ctx, CancelHandle { flag })
    }

    /// Same context, with its deadline tightened to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Same context, with its deadline tightened to `deadline`.
    ///
    /// A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// True once the paired [`CancelHandle`] fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    /// True if the context can ever be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.cancelled.is_some()
    }
}
