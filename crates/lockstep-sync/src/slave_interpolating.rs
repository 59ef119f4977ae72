//! Continuous slave clock interpolating the timing master's time

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use lockstep_clock::{EventSequencer, InterpolationTime};
use lockstep_core::{
    Clock, ClockType, Duration, EventId, EventSink, ExternalClock, StopSignal, Timestamp,
    SLAVE_MASTER_ON_DEMAND,
};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::SystemClockClientReset;

/// Source of master time samples, `None` when no sample could be taken
pub type TimeUpdate = Box<dyn Fn() -> Option<Timestamp> + Send + Sync>;

struct Shared {
    sequencer: EventSequencer,
    interpolation: InterpolationTime,
    client_reset: SystemClockClientReset,
    time_update: TimeUpdate,
    sync_cycle: Duration,
    external: Arc<dyn ExternalClock>,
    stop: StopSignal,
}

impl Shared {
    fn apply_reset(&self, new_time: Timestamp) {
        self.interpolation.reset_time(new_time);
        self.sequencer.reset_to(new_time);
    }

    fn run(&self) {
        debug!("master on demand clock worker started");
        while !self.stop.is_raised() {
            let epoch = self.interpolation.epoch();
            let request_start = self.external.now();
            if let Some(master_time) = (self.time_update)() {
                let round_trip =
                    Duration::from(self.external.now().saturating_duration_since(request_start));
                if !self
                    .interpolation
                    .set_time_in_epoch(epoch, master_time, round_trip)
                {
                    debug!(master_time = %master_time, "sample requested before the last reset, dropped");
                }
            }
            if self.stop.is_raised() {
                break;
            }
            self.external
                .wait_until(request_start + self.sync_cycle.to_std(), &self.stop);
        }
        debug!("master on demand clock worker stopped");
    }
}

/// Continuous clock following a remote timing master.
///
/// A worker pulls the master time once per sync cycle; `time()` extrapolates
/// between samples. Resets are pushed by the master and are held back until the
/// clock is started.
pub struct MasterOnDemandClockInterpolating {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MasterOnDemandClockInterpolating {
    pub fn new(
        sync_cycle: Duration,
        external: Arc<dyn ExternalClock>,
        time_update: impl Fn() -> Option<Timestamp> + Send + Sync + 'static,
    ) -> Self {
        MasterOnDemandClockInterpolating {
            name: SLAVE_MASTER_ON_DEMAND.to_string(),
            shared: Arc::new(Shared {
                sequencer: EventSequencer::default(),
                interpolation: InterpolationTime::new(Arc::clone(&external)),
                client_reset: SystemClockClientReset::new(),
                time_update: Box::new(time_update),
                sync_cycle,
                external,
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn sync_cycle(&self) -> Duration {
        self.shared.sync_cycle
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Apply one event pushed by the timing master and return the clock's time.
    ///
    /// Only resets matter here, updates are pulled by the worker.
    pub fn master_time_event(
        &self,
        event_id: EventId,
        new_time: Timestamp,
        _old_time: Timestamp,
        _next_tick: Option<Timestamp>,
    ) -> Timestamp {
        if event_id == EventId::TimeReset {
            let shared = &self.shared;
            shared
                .client_reset
                .reset(new_time, |time| shared.apply_reset(time));
        }
        self.time()
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!(clock = %self.name, "stop requested from the worker itself, not joining");
            } else if handle.join().is_err() {
                error!(clock = %self.name, "master on demand clock worker panicked");
            }
        }
    }
}

impl Clock for MasterOnDemandClockInterpolating {
    fn name(&self) -> &str {
        &self.name
    }

    fn clock_type(&self) -> ClockType {
        ClockType::Continuous
    }

    fn time(&self) -> Timestamp {
        self.shared
            .sequencer
            .observe(self.shared.interpolation.time())
    }

    fn reset(&self, new_time: Timestamp) {
        warn!(
            clock = %self.name,
            new_time = %new_time,
            "only the timing master may reset this clock, ignoring local reset"
        );
    }

    fn start(&self, sink: Arc<dyn EventSink>) {
        self.shared.stop.raise();
        self.shared.external.notify(&self.shared.stop);
        self.join_worker();

        let shared = &self.shared;
        shared.sequencer.attach_at(sink, Timestamp::ZERO);
        if !shared.client_reset.start(|time| shared.apply_reset(time)) {
            shared.apply_reset(Timestamp::ZERO);
        }
        shared.stop.clear();

        let worker_shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("master-on-demand-clock".to_string())
            .spawn(move || worker_shared.run());
        match spawned {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(e) => error!(clock = %self.name, "Failed to spawn master on demand clock worker: {}", e),
        }
    }

    fn stop(&self) {
        self.shared.stop.raise();
        self.shared.external.notify(&self.shared.stop);
        self.join_worker();
        self.shared.client_reset.stop();
        self.shared.sequencer.detach();
    }
}

impl Drop for MasterOnDemandClockInterpolating {
    fn drop(&mut self) {
        self.stop();
    }
}
