//! Virtual external clock
//!
//! Time only moves when a test calls `advance` or when a worker waits: a wait
//! jumps straight to its deadline and is recorded, so pacing can be asserted
//! without sleeping.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lockstep_core::{ExternalClock, StopSignal};
use parking_lot::Mutex;

pub struct VirtualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    waits: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(VirtualClock {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            waits: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Length of every wait performed so far, in order
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }
}

impl ExternalClock for VirtualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn wait_until(&self, deadline: Instant, stop: &StopSignal) {
        if stop.is_raised() {
            return;
        }
        {
            let mut elapsed = self.elapsed.lock();
            let now = self.origin + *elapsed;
            if deadline > now {
                let wait = deadline - now;
                self.waits.lock().push(wait);
                *elapsed += wait;
            }
        }
        thread::yield_now();
    }
}
