//! Periodic background work on a dedicated thread.
//!
//! A `Ticker` runs a closure every `interval` until stopped. The interval can
//! be changed while running; the change re-arms the next tick immediately.
//! Used for idle-connection sweeping and transaction reaping.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::error;

/// Shortest interval a ticker will run at.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

struct TickerState {
    interval: Duration,
    stopped: bool,
    rearmed: bool,
}

struct TickerInner {
    state: Mutex<TickerState>,
    wake: Condvar,
}

/// Runs a closure periodically on its own thread.
pub struct Ticker {
    inner: Arc<TickerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Spawn a ticker thread named `name` that calls `tick` every `interval`.
    ///
    /// The first call happens one interval after start.
    pub fn start(
        name: impl Into<String>,
        interval: Duration,
        tick: impl FnMut() + Send + 'static,
    ) -> Self {
        let inner = Arc::new(TickerInner {
            state: Mutex::new(TickerState {
                interval: interval.max(MIN_TICK_INTERVAL),
                stopped: false,
                rearmed: false,
            }),
            wake: Condvar::new(),
        });

        let inner_clone = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || tick_loop(&inner_clone, tick))
            .expect("failed to spawn ticker thread");

        Self {
            inner,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Current interval.
    pub fn interval(&self) -> Duration {
        self.inner.state.lock().interval
    }

    /// Change the interval. The next tick is scheduled one new interval from now.
    pub fn set_interval(&self, interval: Duration) {
        let mut state = self.inner.state.lock();
        state.interval = interval.max(MIN_TICK_INTERVAL);
        state.rearmed = true;
        self.inner.wake.notify_all();
    }

    /// Stop the ticker and join its thread. A tick in progress completes first.
    ///
    /// Calling `stop` more than once is harmless.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            self.inner.wake.notify_all();
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// True once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(inner: &TickerInner, mut tick: impl FnMut()) {
    let mut next = Instant::now() + inner.state.lock().interval;
    loop {
        {
            let mut state = inner.state.lock();
            loop {
                if state.stopped {
                    return;
                }
                if state.rearmed {
                    state.rearmed = false;
                    next = Instant::now() + state.interval;
                }
                if Instant::now() >= next {
                    break;
                }
                inner.wake.wait_until(&mut state, next);
            }
        }

        // A panicking tick must not kill the thread; the next tick still runs.
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(&mut tick)) {
            error!(
                target: "tablet::pool",
                "ticker callback panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }

        next = Instant::now() + inner.state.lock().interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wait_for(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn test_ticks_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::start("test-ticker", Duration::from_millis(2), move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert!(wait_for(Duration::from_secs(5), || count.load(Ordering::Relaxed) >= 3));
        ticker.stop();
    }

    #[test]
    fn test_stop_halts_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::start("test-ticker", Duration::from_millis(1), move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert!(wait_for(Duration::from_secs(5), || count.load(Ordering::Relaxed) >= 1));
        ticker.stop();
        assert!(ticker.is_stopped());
        let after_stop = count.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
        ticker.stop();
    }

    #[test]
    fn test_set_interval_rearms() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::start("test-ticker", Duration::from_secs(3600), move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::Relaxed), 0);

        ticker.set_interval(Duration::from_millis(1));
        assert_eq!(ticker.interval(), Duration::from_millis(1));
        assert!(wait_for(Duration::from_secs(5), || count.load(Ordering::Relaxed) >= 2));
    }

    #[test]
    fn test_interval_clamped() {
        let ticker = Ticker::start("test-ticker", Duration::ZERO, || {});
        assert_eq!(ticker.interval(), MIN_TICK_INTERVAL);
    }

    #[test]
    fn test_panicking_tick_keeps_running() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let ticker = Ticker::start("test-ticker", Duration::from_millis(1), move || {
            if c.fetch_add(1, Ordering::Relaxed) == 0 {
                panic!("first tick fails");
            }
        });
        assert!(wait_for(Duration::from_secs(5), || count.load(Ordering::Relaxed) >= 3));
        ticker.stop();
    }
}
