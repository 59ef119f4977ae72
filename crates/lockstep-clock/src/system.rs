//! Continuous wall-clock time

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lockstep_core::{
    Clock, ClockType, Duration, EventSink, ExternalClock, SteadyClock, Timestamp,
    LOCAL_SYSTEM_REAL_CLOCK,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::EventSequencer;

/// Continuous clock following the external clock from a resettable origin
///
/// `time()` is `now - offset` once started and 0 before. `reset(t)` moves the
/// origin so that the clock reads `t` at the moment of the reset.
pub struct SystemClock {
    name: String,
    external: Arc<dyn ExternalClock>,
    epoch: Instant,
    /// Nanoseconds since `epoch` at which the clock read zero
    offset: Mutex<Duration>,
    started: AtomicBool,
    sequencer: EventSequencer,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_external_clock(Arc::new(SteadyClock))
    }

    pub fn with_external_clock(external: Arc<dyn ExternalClock>) -> Self {
        let epoch = external.now();
        SystemClock {
            name: LOCAL_SYSTEM_REAL_CLOCK.to_string(),
            external,
            epoch,
            offset: Mutex::new(Duration::ZERO),
            started: AtomicBool::new(false),
            sequencer: EventSequencer::default(),
        }
    }

    fn elapsed(&self) -> Duration {
        Duration::from(self.external.now().saturating_duration_since(self.epoch))
    }

    /// Current raw reading, before event sequencing
    pub fn new_time(&self) -> Timestamp {
        if !self.started.load(Ordering::Acquire) {
            return Timestamp::ZERO;
        }
        let offset = *self.offset.lock();
        Timestamp(self.elapsed().as_nanos().saturating_sub(offset.as_nanos()))
    }

    fn apply_offset(&self, new_time: Timestamp) {
        let elapsed = self.elapsed().as_nanos();
        *self.offset.lock() = Duration(elapsed.saturating_sub(new_time.as_nanos()));
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Continuous
    }

    fn time(&self) -> Timestamp {
        self.sequencer.observe(self.new_time())
    }

    fn reset(&self, new_time: Timestamp) {
        self.apply_offset(new_time);
        if self.started.load(Ordering::Acquire) {
            self.sequencer.reset_to(new_time);
        }
    }

    fn start(&self, sink: Arc<dyn EventSink>) {
        debug!(clock = %self.name, "starting clock");
        self.sequencer.attach(sink);
        self.started.store(true, Ordering::Release);
        self.reset(Timestamp::ZERO);
    }

    fn stop(&self) {
        if self.started.swap(false, Ordering::AcqRel) {
            debug!(clock = %self.name, "stopping clock");
        }
        self.sequencer.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_test::{RecordingSink, SinkEvent, VirtualClock};

    #[test]
    fn test_zero_before_start() {
        let external = VirtualClock::new();
        let clock = SystemClock::with_external_clock(external.clone());
        external.advance(std::time::Duration::from_millis(5));

        assert_eq!(clock.time(), Timestamp::ZERO);
        assert_eq!(clock.clock_type(), ClockType::Continuous);
        assert_eq!(clock.name(), LOCAL_SYSTEM_REAL_CLOCK);
    }

    #[test]
    fn test_start_resets_to_zero() {
        let external = VirtualClock::new();
        external.advance(std::time::Duration::from_secs(3));
        let clock = SystemClock::with_external_clock(external.clone());
        let sink = RecordingSink::new();

        clock.start(sink.clone());
        external.advance(std::time::Duration::from_millis(250));

        assert_eq!(clock.time(), Timestamp::from_millis(250));
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::ZERO },
                SinkEvent::ResetEnd { new: Timestamp::ZERO },
            ]
        );
    }

    #[test]
    fn test_reset_moves_origin() {
        let external = VirtualClock::new();
        let clock = SystemClock::with_external_clock(external.clone());
        let sink = RecordingSink::new();
        clock.start(sink.clone());
        external.advance(std::time::Duration::from_millis(10));
        sink.clear();

        clock.reset(Timestamp::from_secs(60));
        assert_eq!(clock.time(), Timestamp::from_secs(60));

        external.advance(std::time::Duration::from_millis(1));
        assert_eq!(clock.time(), Timestamp::from_millis(60_001));
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::ResetBegin {
                    old: Timestamp::ZERO,
                    new: Timestamp::from_secs(60),
                },
                SinkEvent::ResetEnd { new: Timestamp::from_secs(60) },
            ]
        );
    }

    #[test]
    fn test_stop_freezes_events() {
        let external = VirtualClock::new();
        let clock = SystemClock::with_external_clock(external.clone());
        let sink = RecordingSink::new();
        clock.start(sink.clone());
        clock.stop();
        clock.stop();
        sink.clear();

        clock.reset(Timestamp::from_secs(1));
        assert_eq!(clock.time(), Timestamp::ZERO);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_reset_announces_requested_time_on_steady_clock() {
        let clock = SystemClock::new();
        let sink = RecordingSink::new();
        clock.start(sink.clone());
        std::thread::sleep(std::time::Duration::from_millis(2));
        sink.clear();

        clock.reset(Timestamp::from_secs(1));
        std::thread::sleep(std::time::Duration::from_millis(2));

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::from_secs(1) },
                SinkEvent::ResetEnd { new: Timestamp::from_secs(1) },
            ]
        );
        assert!(clock.time() > Timestamp::from_secs(1));
        clock.stop();
    }
}
