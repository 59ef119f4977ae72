//! Discrete slave clock stepped by the timing master

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lockstep_clock::EventSequencer;
use lockstep_core::{
    Clock, ClockType, EventId, EventSink, Timestamp, SLAVE_MASTER_ON_DEMAND_DISCRETE,
};
use tracing::{debug, warn};

/// Discrete clock whose time only moves on events pushed by the timing master.
///
/// Without forwarded brackets every `time_updating` event is replayed as a
/// complete begin/updating/end sequence. With forwarded brackets the master's
/// `time_update_before` and `time_update_after` events become the begin and end
/// callbacks and `time_updating` only emits `time_updating`.
pub struct MasterOnDemandClockDiscrete {
    name: String,
    sequencer: EventSequencer,
    started: AtomicBool,
    reset_seen: AtomicBool,
    forward_brackets: bool,
}

impl MasterOnDemandClockDiscrete {
    pub fn new(forward_brackets: bool) -> Self {
        MasterOnDemandClockDiscrete {
            name: SLAVE_MASTER_ON_DEMAND_DISCRETE.to_string(),
            sequencer: EventSequencer::default(),
            started: AtomicBool::new(false),
            reset_seen: AtomicBool::new(false),
            forward_brackets,
        }
    }

    pub fn forwards_brackets(&self) -> bool {
        self.forward_brackets
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Apply one event pushed by the timing master and return the clock's time
    pub fn master_time_event(
        &self,
        event_id: EventId,
        new_time: Timestamp,
        _old_time: Timestamp,
        next_tick: Option<Timestamp>,
    ) -> Timestamp {
        if !self.is_started() {
            warn!(
                event = ?event_id,
                new_time = %new_time,
                "Received time event from timing master before the slave clock was started, dropping it"
            );
            return self.sequencer.current_time();
        }

        match event_id {
            EventId::TimeReset => {
                self.sequencer.reset_to(new_time);
                self.reset_seen.store(true, Ordering::Release);
            }
            EventId::TimeUpdating => {
                if !self.reset_seen.swap(true, Ordering::AcqRel) {
                    warn!(
                        new_time = %new_time,
                        "Received time update from timing master before any reset, resetting to the current time first"
                    );
                    self.sequencer.reset_to(self.sequencer.current_time());
                }
                self.sequencer
                    .advance_to(new_time, next_tick, !self.forward_brackets);
            }
            EventId::TimeUpdateBefore if self.forward_brackets => {
                if self.reset_seen.load(Ordering::Acquire) {
                    let old_time = self.sequencer.current_time();
                    self.sequencer
                        .notify(|sink| sink.time_update_begin(old_time, new_time));
                }
            }
            EventId::TimeUpdateAfter if self.forward_brackets => {
                if self.reset_seen.load(Ordering::Acquire) {
                    self.sequencer.notify(|sink| sink.time_update_end(new_time));
                }
            }
            EventId::TimeUpdateBefore | EventId::TimeUpdateAfter => {
                debug!(event = ?event_id, "ignoring bracket event, brackets are not forwarded");
            }
        }
        self.sequencer.current_time()
    }
}

impl Clock for MasterOnDemandClockDiscrete {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Discrete
    }

    fn time(&self) -> Timestamp {
        self.sequencer.current_time()
    }

    fn reset(&self, new_time: Timestamp) {
        warn!(
            clock = %self.name,
            new_time = %new_time,
            "only the timing master may reset this clock, ignoring local reset"
        );
    }

    fn start(&self, sink: Arc<dyn EventSink>) {
        self.sequencer.attach(sink);
        self.reset_seen.store(false, Ordering::Release);
        self.started.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.started.store(false, Ordering::Release);
        self.sequencer.detach();
    }
}
