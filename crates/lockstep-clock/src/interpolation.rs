//! Extrapolation of remote time samples
//!
//! A slave pulls the master's time only every sync cycle. Between two samples
//! the local estimate advances with the external clock and never goes
//! backwards: a sample that lands behind the last returned value holds the
//! estimate until real time catches up.

use std::sync::Arc;
use std::time::Instant;

use lockstep_core::{Duration, ExternalClock, Timestamp};
use parking_lot::Mutex;

struct Anchor {
    time: Timestamp,
    /// `None` while frozen after a reset
    taken_at: Option<Instant>,
    last_returned: Timestamp,
    /// Count of resets so far
    epoch: u64,
}

pub struct InterpolationTime {
    external: Arc<dyn ExternalClock>,
    anchor: Mutex<Anchor>,
}

impl InterpolationTime {
    pub fn new(external: Arc<dyn ExternalClock>) -> Self {
        InterpolationTime {
            external,
            anchor: Mutex::new(Anchor {
                time: Timestamp::ZERO,
                taken_at: None,
                last_returned: Timestamp::ZERO,
                epoch: 0,
            }),
        }
    }

    /// Feed a master sample that took `round_trip` to fetch.
    ///
    /// The sample is assumed to have been taken halfway through the round trip.
    pub fn set_time(&self, sample: Timestamp, round_trip: Duration) {
        let epoch = self.epoch();
        self.set_time_in_epoch(epoch, sample, round_trip);
    }

    pub fn epoch(&self) -> u64 {
        self.anchor.lock().epoch
    }

    /// Like `set_time`, for a sample requested when `epoch()` was `epoch`.
    ///
    /// A reset since then makes the sample stale: it is dropped and false is
    /// returned.
    pub fn set_time_in_epoch(&self, epoch: u64, sample: Timestamp, round_trip: Duration) -> bool {
        let half = Duration(round_trip.as_nanos().max(0) / 2);
        let now = self.external.now();
        let mut anchor = self.anchor.lock();
        if anchor.epoch != epoch {
            return false;
        }
        anchor.time = sample.saturating_add(half);
        anchor.taken_at = Some(now);
        true
    }

    /// Current estimate, monotonic between resets
    pub fn time(&self) -> Timestamp {
        let now = self.external.now();
        let mut anchor = self.anchor.lock();
        let estimate = match anchor.taken_at {
            Some(taken_at) => anchor
                .time
                .saturating_add(Duration::from(now.saturating_duration_since(taken_at))),
            None => anchor.time,
        };
        let time = estimate.max(anchor.last_returned);
        anchor.last_returned = time;
        time
    }

    /// Restart at `new_time`; the estimate stays there until the next sample
    pub fn reset_time(&self, new_time: Timestamp) {
        let mut anchor = self.anchor.lock();
        anchor.time = new_time;
        anchor.taken_at = None;
        anchor.last_returned = new_time;
        anchor.epoch = anchor.epoch.wrapping_add(1);
    }
}

impl std::fmt::Debug for InterpolationTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let anchor = self.anchor.lock();
        f.debug_struct("InterpolationTime")
            .field("anchor", &anchor.time)
            .field("last_returned", &anchor.last_returned)
            .finish()
    }
}
