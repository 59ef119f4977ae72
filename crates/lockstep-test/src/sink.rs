//! Recording event sink

use std::sync::Arc;
use std::time::{Duration, Instant};

use lockstep_core::{EventSink, Timestamp};
use parking_lot::{Condvar, Mutex};

/// One callback received by a `RecordingSink`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    UpdateBegin { old: Timestamp, new: Timestamp },
    Updating { new: Timestamp, next: Option<Timestamp> },
    UpdateEnd { new: Timestamp },
    ResetBegin { old: Timestamp, new: Timestamp },
    ResetEnd { new: Timestamp },
}

impl SinkEvent {
    pub fn new_time(&self) -> Timestamp {
        match self {
            SinkEvent::UpdateBegin { new, .. }
            | SinkEvent::Updating { new, .. }
            | SinkEvent::UpdateEnd { new }
            | SinkEvent::ResetBegin { new, .. }
            | SinkEvent::ResetEnd { new } => *new,
        }
    }

    pub fn old_time(&self) -> Option<Timestamp> {
        match self {
            SinkEvent::UpdateBegin { old, .. } | SinkEvent::ResetBegin { old, .. } => Some(*old),
            _ => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, SinkEvent::ResetBegin { .. } | SinkEvent::ResetEnd { .. })
    }
}

/// Event sink that keeps every callback in order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: SinkEvent) {
        let mut events = self.events.lock();
        events.push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Block until the recorded events satisfy `condition` or `timeout` elapses
    pub fn wait_for(&self, condition: impl Fn(&[SinkEvent]) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !condition(&events) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return condition(&events);
            }
        }
        true
    }
}

impl EventSink for RecordingSink {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        self.push(SinkEvent::UpdateBegin {
            old: old_time,
            new: new_time,
        });
    }

    fn time_updating(&self, new_time: Timestamp, next_tick: Option<Timestamp>) {
        self.push(SinkEvent::Updating {
            new: new_time,
            next: next_tick,
        });
    }

    fn time_update_end(&self, new_time: Timestamp) {
        self.push(SinkEvent::UpdateEnd { new: new_time });
    }

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        self.push(SinkEvent::ResetBegin {
            old: old_time,
            new: new_time,
        });
    }

    fn time_reset_end(&self, new_time: Timestamp) {
        self.push(SinkEvent::ResetEnd { new: new_time });
    }
}
