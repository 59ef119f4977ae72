//! Event sequencing shared by every clock
//!
//! Each clock owns one `EventSequencer`. It keeps the clock's current time and
//! the subscription of the single sink the clock reports to, and turns "the time
//! is now X" into the right callback sequence:
//! - a reset (`time_reset_begin` / `time_reset_end`) on the first value after
//!   `attach` or whenever time would move backwards
//! - an update (`time_update_begin` / `time_updating` / `time_update_end`) otherwise
//!
//! Sinks are always called without the internal lock held. A sink that reenters
//! the sequencer while a sequence is in flight is ignored.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use lockstep_core::{EventSink, Timestamp};
use parking_lot::Mutex;

/// Handle of one `attach`, invalidated by `detach`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Sequence currently in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Resetting = 1,
    Updating = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            1 => Phase::Resetting,
            2 => Phase::Updating,
            _ => Phase::Idle,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    sink: Arc<dyn EventSink>,
}

struct State {
    current_time: Timestamp,
    subscription: Option<Subscription>,
    /// Set once the first reset after `attach` went through
    updated: bool,
}

impl State {
    fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(|sub| sub.id)
    }
}

/// Returns the phase to idle, also when a sink unwinds
struct PhaseGuard<'a>(&'a AtomicU8);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(Phase::Idle as u8, Ordering::Release);
    }
}

pub struct EventSequencer {
    state: Mutex<State>,
    phase: AtomicU8,
    next_id: AtomicU64,
}

impl EventSequencer {
    pub fn new(initial_time: Timestamp) -> Self {
        EventSequencer {
            state: Mutex::new(State {
                current_time: initial_time,
                subscription: None,
                updated: false,
            }),
            phase: AtomicU8::new(Phase::Idle as u8),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start reporting to `sink`. The next value seen will be a reset.
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        state.subscription = Some(Subscription { id, sink });
        state.updated = false;
        id
    }

    /// Like `attach`, rewinding the stored time to `start_time` first
    pub fn attach_at(&self, sink: Arc<dyn EventSink>, start_time: Timestamp) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        state.current_time = start_time;
        state.subscription = Some(Subscription { id, sink });
        state.updated = false;
        id
    }

    /// Drop the sink. Callbacks racing with this become no-ops.
    pub fn detach(&self) -> bool {
        let mut state = self.state.lock();
        state.updated = false;
        state.subscription.take().is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.state.lock().subscription_id()
    }

    pub fn current_time(&self) -> Timestamp {
        self.state.lock().current_time
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn enter(&self, phase: Phase) -> Option<PhaseGuard<'_>> {
        self.phase
            .compare_exchange(
                Phase::Idle as u8,
                phase as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| PhaseGuard(&self.phase))
    }

    fn sink_for(&self, id: SubscriptionId) -> Option<Arc<dyn EventSink>> {
        let state = self.state.lock();
        match &state.subscription {
            Some(sub) if sub.id == id => Some(Arc::clone(&sub.sink)),
            _ => None,
        }
    }

    fn deliver(&self, id: SubscriptionId, f: impl FnOnce(&dyn EventSink)) {
        if let Some(sink) = self.sink_for(id) {
            f(sink.as_ref());
        }
    }

    /// Store `new_time` if `id` is still the live subscription
    fn store(&self, id: SubscriptionId, new_time: Timestamp) -> bool {
        let mut state = self.state.lock();
        if state.subscription_id() != Some(id) {
            return false;
        }
        state.current_time = new_time;
        state.updated = true;
        true
    }

    /// Run a reset sequence to `new_time`.
    ///
    /// Returns false when no sink is attached or another sequence is in flight;
    /// in both cases nothing is emitted and the time is unchanged.
    pub fn reset_to(&self, new_time: Timestamp) -> bool {
        let Some(_guard) = self.enter(Phase::Resetting) else {
            return false;
        };
        let (id, old_time) = {
            let state = self.state.lock();
            match state.subscription_id() {
                Some(id) => (id, state.current_time),
                None => return false,
            }
        };

        self.deliver(id, |sink| sink.time_reset_begin(old_time, new_time));
        if !self.store(id, new_time) {
            return false;
        }
        self.deliver(id, |sink| sink.time_reset_end(new_time));
        true
    }

    /// Advance a discrete clock to `new_time`.
    ///
    /// Turns into a reset for the first value after `attach` and for backwards
    /// jumps. `emit_brackets` selects whether `time_update_begin` and
    /// `time_update_end` surround the `time_updating` callback.
    pub fn advance_to(
        &self,
        new_time: Timestamp,
        next_tick: Option<Timestamp>,
        emit_brackets: bool,
    ) -> bool {
        let guard = match self.enter(Phase::Updating) {
            Some(guard) => guard,
            None => return false,
        };
        let (id, old_time, updated) = {
            let state = self.state.lock();
            match state.subscription_id() {
                Some(id) => (id, state.current_time, state.updated),
                None => return false,
            }
        };

        if !updated || new_time < old_time {
            drop(guard);
            return self.reset_to(new_time);
        }

        if emit_brackets {
            self.deliver(id, |sink| sink.time_update_begin(old_time, new_time));
        }
        if !self.store(id, new_time) {
            return false;
        }
        self.deliver(id, |sink| sink.time_updating(new_time, next_tick));
        if emit_brackets {
            self.deliver(id, |sink| sink.time_update_end(new_time));
        }
        true
    }

    /// Feed a freshly read value of a continuous clock.
    ///
    /// The first value after `attach` is announced as a reset, later values are
    /// stored silently. Returns the clock's time after the call.
    pub fn observe(&self, new_time: Timestamp) -> Timestamp {
        let (id, current_time, updated) = {
            let state = self.state.lock();
            match state.subscription_id() {
                Some(id) => (id, state.current_time, state.updated),
                None => return state.current_time,
            }
        };

        if !updated {
            self.reset_to(new_time);
            return self.current_time();
        }
        if self.phase() != Phase::Idle {
            return current_time;
        }
        if self.store(id, new_time) {
            new_time
        } else {
            self.current_time()
        }
    }

    /// Deliver a single raw callback to the current sink
    pub fn notify(&self, f: impl FnOnce(&dyn EventSink)) -> bool {
        let sink = {
            let state = self.state.lock();
            state.subscription.as_ref().map(|sub| Arc::clone(&sub.sink))
        };
        match sink {
            Some(sink) => {
                f(sink.as_ref());
                true
            }
            None => false,
        }
    }
}

impl Default for EventSequencer {
    fn default() -> Self {
        Self::new(Timestamp::ZERO)
    }
}

impl std::fmt::Debug for EventSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventSequencer")
            .field("current_time", &state.current_time)
            .field("subscription", &state.subscription_id())
            .field("updated", &state.updated)
            .field("phase", &self.phase())
            .finish()
    }
}
