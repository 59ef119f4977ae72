//! Buffering of master resets that arrive before the slave clock started

use lockstep_core::Timestamp;
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
struct ResetState {
    started: bool,
    pending: Option<Timestamp>,
}

/// Holds a timing master reset until the slave clock is started.
///
/// The master may start, and reset its slaves, before a slave's clock is
/// running. The latest such reset is kept and applied on `start`.
#[derive(Default)]
pub struct SystemClockClientReset {
    state: Mutex<ResetState>,
}

impl SystemClockClientReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `new_time` now if started, otherwise keep it for `start`
    pub fn reset(&self, new_time: Timestamp, apply: impl FnOnce(Timestamp)) {
        let started = {
            let mut state = self.state.lock();
            if !state.started {
                state.pending = Some(new_time);
            }
            state.started
        };
        if started {
            apply(new_time);
        } else {
            debug!(new_time = %new_time, "reset received before start, keeping it");
        }
    }

    /// Mark started and apply a kept reset. Returns true if one was applied.
    pub fn start(&self, apply: impl FnOnce(Timestamp)) -> bool {
        let pending = {
            let mut state = self.state.lock();
            state.started = true;
            state.pending.take()
        };
        match pending {
            Some(new_time) => {
                warn!(
                    new_time = %new_time,
                    "reset received before start; lower the start priority of the timing master"
                );
                apply(new_time);
                true
            }
            None => false,
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.started = false;
        state.pending = None;
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn pending(&self) -> Option<Timestamp> {
        self.state.lock().pending
    }
}
