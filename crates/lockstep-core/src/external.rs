//! External time source seam
//!
//! Clocks never read the OS clock or sleep directly. They go through an
//! `ExternalClock` so tests can substitute virtual time, and every wait can be
//! cut short by a `StopSignal`.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Cancellation token for worker waits
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter
    pub fn raise(&self) {
        let mut raised = self.inner.raised.lock();
        *raised = true;
        self.inner.cond.notify_all();
    }

    /// Re-arm the signal before a worker is started again
    pub fn clear(&self) {
        *self.inner.raised.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.raised.lock()
    }

    /// Block until `deadline` or until raised. Returns true if raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut raised = self.inner.raised.lock();
        while !*raised {
            if self.inner.cond.wait_until(&mut raised, deadline).timed_out() {
                break;
            }
        }
        *raised
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// Source of wall time and cancellable waiting
pub trait ExternalClock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block until `deadline`, returning early once `stop` is raised
    fn wait_until(&self, deadline: Instant, stop: &StopSignal);

    /// Wake a waiter blocked on `stop`
    fn notify(&self, stop: &StopSignal) {
        stop.raise();
    }
}

/// Monotonic OS clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SteadyClock;

impl ExternalClock for SteadyClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant, stop: &StopSignal) {
        stop.wait_until(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_times_out() {
        let stop = StopSignal::new();
        let start = Instant::now();
        let raised = stop.wait_until(start + Duration::from_millis(20));

        assert!(!raised);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_raise_wakes_waiter() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let raised = waiter.wait_until(start + Duration::from_secs(30));
            (raised, start.elapsed())
        });

        thread::sleep(Duration::from_millis(10));
        SteadyClock.notify(&stop);

        let (raised, elapsed) = handle.join().unwrap();
        assert!(raised);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn test_clear_rearms() {
        let stop = StopSignal::new();
        stop.raise();
        assert!(stop.wait_until(Instant::now() + Duration::from_secs(30)));

        stop.clear();
        assert!(!stop.is_raised());
        assert!(!stop.wait_until(Instant::now()));
    }
}
