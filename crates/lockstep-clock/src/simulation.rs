//! Rate-scaled discrete simulation time
//!
//! A worker thread advances simulated time by `step_size` per iteration and
//! paces iterations so that one step takes `step_size / time_factor` of wall
//! time. A time factor of 0 runs as fast as possible.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use lockstep_core::{
    Clock, ClockType, Duration, EventSink, ExternalClock, SteadyClock, StopSignal, Timestamp,
    LOCAL_SYSTEM_SIM_CLOCK,
};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{ClockError, EventSequencer};

/// Default simulated time per iteration: 100 ms
pub const DEFAULT_STEP_SIZE: Duration = Duration::from_millis(100);
/// Default pacing: simulated time runs at wall-clock speed
pub const DEFAULT_TIME_FACTOR: f64 = 1.0;
/// Time factor that disables pacing
pub const TIME_FACTOR_AFAP: f64 = 0.0;

#[inline]
fn is_afap(time_factor: f64) -> bool {
    time_factor == TIME_FACTOR_AFAP
}

struct Settings {
    step_size: Duration,
    time_factor: f64,
    simulation_time: Timestamp,
    /// Bumped by every reset so the worker does not step over it
    generation: u64,
    /// Reset requested while a step was in flight, announced by the worker
    pending_reset: Option<Timestamp>,
}

struct Shared {
    sequencer: EventSequencer,
    settings: Mutex<Settings>,
    /// Held by whoever drives the sequencer: the worker for one step, or `reset`
    step: Mutex<()>,
    stop: StopSignal,
    external: Arc<dyn ExternalClock>,
}

impl Shared {
    /// Caller must hold `step`
    fn announce_pending_reset(&self) {
        let pending = self.settings.lock().pending_reset.take();
        if let Some(new_time) = pending {
            self.sequencer.reset_to(new_time);
        }
    }

    fn run(&self) {
        debug!("simulation clock worker started");
        while !self.stop.is_raised() {
            let iteration_start = self.external.now();
            let step = self.step.lock();
            self.announce_pending_reset();
            let (now, step_size, time_factor, generation) = {
                let settings = self.settings.lock();
                (
                    settings.simulation_time,
                    settings.step_size,
                    settings.time_factor,
                    settings.generation,
                )
            };

            self.sequencer
                .advance_to(now, Some(now.saturating_add(step_size)), true);
            self.announce_pending_reset();
            drop(step);

            if !is_afap(time_factor) {
                let deadline = iteration_start + step_size.div_f64(time_factor).to_std();
                if deadline > self.external.now() {
                    self.external.wait_until(deadline, &self.stop);
                }
            }

            let mut settings = self.settings.lock();
            if settings.generation == generation {
                settings.simulation_time = now.saturating_add(step_size);
            }
        }
        debug!("simulation clock worker stopped");
    }
}

/// Discrete clock advanced by its own worker thread
pub struct SimulationClock {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self::with_external_clock(Arc::new(SteadyClock))
    }

    pub fn with_external_clock(external: Arc<dyn ExternalClock>) -> Self {
        SimulationClock {
            name: LOCAL_SYSTEM_SIM_CLOCK.to_string(),
            shared: Arc::new(Shared {
                sequencer: EventSequencer::default(),
                settings: Mutex::new(Settings {
                    step_size: DEFAULT_STEP_SIZE,
                    time_factor: DEFAULT_TIME_FACTOR,
                    simulation_time: Timestamp::ZERO,
                    generation: 0,
                    pending_reset: None,
                }),
                step: Mutex::new(()),
                stop: StopSignal::new(),
                external,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Change step size and pacing, effective from the next iteration
    pub fn update_configuration(
        &self,
        step_size: Duration,
        time_factor: f64,
    ) -> Result<(), ClockError> {
        if step_size <= Duration::ZERO {
            return Err(ClockError::InvalidStepSize(step_size));
        }
        if !time_factor.is_finite() || time_factor < 0.0 {
            return Err(ClockError::InvalidTimeFactor(time_factor));
        }
        let mut settings = self.shared.settings.lock();
        settings.step_size = step_size;
        settings.time_factor = time_factor;
        debug!(step_size = %step_size, time_factor, "simulation clock reconfigured");
        Ok(())
    }

    pub fn step_size(&self) -> Duration {
        self.shared.settings.lock().step_size
    }

    pub fn time_factor(&self) -> f64 {
        self.shared.settings.lock().time_factor
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn set_simulation_time(&self, new_time: Timestamp) {
        let mut settings = self.shared.settings.lock();
        settings.simulation_time = new_time;
        settings.generation = settings.generation.wrapping_add(1);
        settings.pending_reset = Some(new_time);
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulationClock {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Discrete
    }

    fn time(&self) -> Timestamp {
        self.shared.sequencer.current_time()
    }

    /// Announced right away unless a step is in flight; then the worker
    /// announces it as soon as that step has been delivered.
    fn reset(&self, new_time: Timestamp) {
        self.set_simulation_time(new_time);
        if let Some(_step) = self.shared.step.try_lock() {
            self.shared.announce_pending_reset();
        }
    }

    fn start(&self, sink: Arc<dyn EventSink>) {
        self.stop();

        self.shared.sequencer.attach_at(sink, Timestamp::ZERO);
        self.reset(Timestamp::ZERO);
        self.shared.stop.clear();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("simulation-clock".to_string())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(e) => error!(clock = %self.name, "Failed to spawn simulation clock worker: {}", e),
        }
    }

    fn stop(&self) {
        self.shared.stop.raise();
        self.shared.external.notify(&self.shared.stop);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!(clock = %self.name, "stop requested from the worker itself, not joining");
            } else if handle.join().is_err() {
                error!(clock = %self.name, "simulation clock worker panicked");
            }
        }
        self.shared.sequencer.detach();
    }
}

impl Drop for SimulationClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_test::{RecordingSink, SinkEvent, VirtualClock};
    use std::time::Duration as StdDuration;

    const WAIT: StdDuration = StdDuration::from_secs(10);

    /// Records like `RecordingSink` but lingers in `time_updating`
    struct SlowSink {
        events: Arc<RecordingSink>,
        delay: StdDuration,
    }

    impl EventSink for SlowSink {
        fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
            self.events.time_update_begin(old_time, new_time);
        }

        fn time_updating(&self, new_time: Timestamp, next_tick: Option<Timestamp>) {
            self.events.time_updating(new_time, next_tick);
            std::thread::sleep(self.delay);
        }

        fn time_update_end(&self, new_time: Timestamp) {
            self.events.time_update_end(new_time);
        }

        fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
            self.events.time_reset_begin(old_time, new_time);
        }

        fn time_reset_end(&self, new_time: Timestamp) {
            self.events.time_reset_end(new_time);
        }
    }

    #[test]
    fn test_defaults() {
        let clock = SimulationClock::new();
        assert_eq!(clock.step_size(), Duration::from_millis(100));
        assert_eq!(clock.time_factor(), 1.0);
        assert_eq!(clock.clock_type(), ClockType::Discrete);
        assert_eq!(clock.name(), LOCAL_SYSTEM_SIM_CLOCK);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let clock = SimulationClock::new();
        assert_eq!(
            clock.update_configuration(Duration::ZERO, 1.0),
            Err(ClockError::InvalidStepSize(Duration::ZERO))
        );
        assert!(clock.update_configuration(Duration(10), -1.0).is_err());
        assert!(clock.update_configuration(Duration(10), f64::NAN).is_err());
        assert_eq!(clock.step_size(), DEFAULT_STEP_SIZE);

        clock.update_configuration(Duration(10), 0.0).unwrap();
        assert_eq!(clock.step_size(), Duration(10));
        assert_eq!(clock.time_factor(), 0.0);
    }

    #[test]
    fn test_start_emits_reset_then_steps() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(100), 1.0).unwrap();
        let sink = RecordingSink::new();

        clock.start(sink.clone());
        assert!(sink.wait_for(|events| events.len() >= 14, WAIT));
        clock.stop();

        let events = sink.events();
        assert_eq!(
            events[..2],
            [
                SinkEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::ZERO },
                SinkEvent::ResetEnd { new: Timestamp::ZERO },
            ]
        );
        let observed: Vec<i64> = events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::ResetEnd { new } | SinkEvent::Updating { new, .. } => Some(new.0),
                _ => None,
            })
            .take(6)
            .collect();
        assert_eq!(observed, vec![0, 0, 100, 200, 300, 400]);

        assert_eq!(
            events[2..5],
            [
                SinkEvent::UpdateBegin { old: Timestamp(0), new: Timestamp(0) },
                SinkEvent::Updating { new: Timestamp(0), next: Some(Timestamp(100)) },
                SinkEvent::UpdateEnd { new: Timestamp(0) },
            ]
        );
    }

    #[test]
    fn test_paced_by_step_over_factor() {
        let external = VirtualClock::new();
        let clock = SimulationClock::with_external_clock(external.clone());
        clock.update_configuration(Duration::from_millis(100), 2.0).unwrap();
        let sink = RecordingSink::new();

        clock.start(sink.clone());
        assert!(sink.wait_for(|events| events.len() >= 20, WAIT));
        clock.stop();

        let waits = external.waits();
        assert!(!waits.is_empty());
        assert!(waits
            .iter()
            .all(|wait| *wait <= StdDuration::from_millis(50)));
        assert!(waits.contains(&StdDuration::from_millis(50)));
    }

    #[test]
    fn test_afap_never_waits() {
        let external = VirtualClock::new();
        let clock = SimulationClock::with_external_clock(external.clone());
        clock
            .update_configuration(Duration::from_secs(3600), TIME_FACTOR_AFAP)
            .unwrap();
        let sink = RecordingSink::new();

        clock.start(sink.clone());
        assert!(sink.wait_for(|events| events.len() >= 50, WAIT));
        clock.stop();

        assert!(external.waits().is_empty());
        assert!(clock.time() >= Timestamp::from_secs(3600 * 10));
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(1_000), 0.0).unwrap();
        clock.stop();

        for _ in 0..2 {
            let sink = RecordingSink::new();
            clock.start(sink.clone());
            assert!(clock.is_running());
            assert!(sink.wait_for(|events| events.len() >= 5, WAIT));
            clock.stop();
            clock.stop();
            assert!(!clock.is_running());

            let frozen = sink.len();
            std::thread::sleep(StdDuration::from_millis(5));
            assert_eq!(sink.len(), frozen);
            assert_eq!(
                sink.events()[0],
                SinkEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::ZERO }
            );
        }
    }

    #[test]
    fn test_reset_continues_from_new_time() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(10), 0.0).unwrap();
        let sink = RecordingSink::new();
        clock.start(sink.clone());
        assert!(sink.wait_for(|events| events.len() >= 10, WAIT));

        clock.reset(Timestamp(1_000_000));
        assert!(sink.wait_for(
            |events| events.iter().any(|event| matches!(
                event,
                SinkEvent::Updating { new, .. } if new.0 >= 1_000_020
            )),
            WAIT
        ));
        clock.stop();

        assert!(clock.time() >= Timestamp(1_000_020));
    }

    #[test]
    fn test_reset_while_stopped_restarts_from_zero() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(10), 0.0).unwrap();
        clock.reset(Timestamp(5_000));

        let sink = RecordingSink::new();
        clock.start(sink.clone());
        assert!(sink.wait_for(|events| events.len() >= 5, WAIT));
        clock.stop();

        assert_eq!(
            sink.events()[..5],
            [
                SinkEvent::ResetBegin { old: Timestamp::ZERO, new: Timestamp::ZERO },
                SinkEvent::ResetEnd { new: Timestamp::ZERO },
                SinkEvent::UpdateBegin { old: Timestamp::ZERO, new: Timestamp::ZERO },
                SinkEvent::Updating { new: Timestamp::ZERO, next: Some(Timestamp(10)) },
                SinkEvent::UpdateEnd { new: Timestamp::ZERO },
            ]
        );
    }

    #[test]
    fn test_reset_during_slow_step_is_announced() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(10), TIME_FACTOR_AFAP).unwrap();
        let events = RecordingSink::new();
        clock.start(Arc::new(SlowSink {
            events: events.clone(),
            delay: StdDuration::from_millis(50),
        }));
        assert!(events.wait_for(
            |events| events.iter().any(|event| matches!(event, SinkEvent::Updating { .. })),
            WAIT
        ));

        clock.reset(Timestamp(1_000_000));
        assert!(events.wait_for(
            |events| events.iter().any(|event| matches!(
                event,
                SinkEvent::Updating { new, .. } if new.0 >= 1_000_000
            )),
            WAIT
        ));
        clock.stop();

        let events = events.events();
        let first = events
            .iter()
            .position(|event| event.new_time() >= Timestamp(1_000_000))
            .unwrap();
        assert!(matches!(
            events[first],
            SinkEvent::ResetBegin { new, .. } if new == Timestamp(1_000_000)
        ));
        assert_eq!(events[first + 1], SinkEvent::ResetEnd { new: Timestamp(1_000_000) });
    }

    #[test]
    fn test_step_saturates_at_max() {
        let clock = SimulationClock::new();
        clock.update_configuration(Duration(10), TIME_FACTOR_AFAP).unwrap();
        let sink = RecordingSink::new();
        clock.start(sink.clone());
        clock.reset(Timestamp(i64::MAX - 15));

        assert!(sink.wait_for(
            |events| events
                .iter()
                .filter(|event| matches!(event, SinkEvent::Updating { new, .. } if *new == Timestamp::MAX))
                .count()
                >= 2,
            WAIT
        ));
        clock.stop();
    }
}
