//! Lockstep loopback demo
//!
//! Runs a timing master and two timing slaves on an in-process bus:
//! - "master": the configured main clock (simulation or real time)
//! - "follower": `slave_master_on_demand`, pulls and interpolates
//! - "stepper": `slave_master_on_demand_discrete`, stepped by pushes
//!
//! Usage: `loopback [config.toml]`. Log verbosity follows `RUST_LOG`.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use lockstep_clock::{SimulationClock, SystemClock};
use lockstep_core::{
    Clock, EventSink, Timestamp, LOCAL_SYSTEM_SIM_CLOCK, SLAVE_MASTER_ON_DEMAND,
    SLAVE_MASTER_ON_DEMAND_DISCRETE,
};
use lockstep_rpc::{LocalBus, ServiceBus};
use lockstep_sync::{
    ClockMainEventSink, ClockService, ClockSynchronizationService, Config, RpcClockSyncService,
    SyncError,
};
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MASTER: &str = "master";

/// Clock registry of one demo participant
struct DemoClocks {
    main_clock: String,
    clocks: Mutex<HashMap<String, Arc<dyn Clock>>>,
}

impl DemoClocks {
    fn new(main_clock: &str) -> Arc<Self> {
        Arc::new(DemoClocks {
            main_clock: main_clock.to_string(),
            clocks: Mutex::new(HashMap::new()),
        })
    }

    fn main_clock(&self) -> Option<Arc<dyn Clock>> {
        self.clocks.lock().get(&self.main_clock).cloned()
    }
}

impl ClockService for DemoClocks {
    fn main_clock_name(&self) -> String {
        self.main_clock.clone()
    }

    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<(), SyncError> {
        let name = clock.name().to_string();
        let mut clocks = self.clocks.lock();
        if clocks.contains_key(&name) {
            return Err(SyncError::ClockRegistration {
                name,
                reason: "a clock with this name is already registered".to_string(),
            });
        }
        clocks.insert(name, clock);
        Ok(())
    }

    fn unregister_clock(&self, name: &str) {
        self.clocks.lock().remove(name);
    }
}

/// Logs the events a slave clock emits
struct LoggingSink {
    participant: &'static str,
}

impl EventSink for LoggingSink {
    fn time_update_begin(&self, _old_time: Timestamp, _new_time: Timestamp) {}

    fn time_updating(&self, new_time: Timestamp, next_tick: Option<Timestamp>) {
        tracing::debug!(participant = self.participant, new_time = %new_time, next_tick = ?next_tick, "time update");
    }

    fn time_update_end(&self, _new_time: Timestamp) {}

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        info!(participant = self.participant, old_time = %old_time, new_time = %new_time, "time reset");
    }

    fn time_reset_end(&self, _new_time: Timestamp) {}
}

fn master_clock(config: &Config) -> Result<Arc<dyn Clock>, SyncError> {
    config.clock.validate()?;
    if config.clock.main_clock == LOCAL_SYSTEM_SIM_CLOCK {
        let clock = SimulationClock::new();
        clock.update_configuration(config.clock.step_size(), config.clock.time_factor)?;
        Ok(Arc::new(clock))
    } else {
        Ok(Arc::new(SystemClock::new()))
    }
}

fn slave(
    bus: &LocalBus,
    config: &Config,
    name: &'static str,
    main_clock: &str,
) -> Result<(ClockSynchronizationService, Arc<dyn Clock>), Box<dyn std::error::Error>> {
    let clocks = DemoClocks::new(main_clock);
    let mut sync_config = config.clock_synchronization.clone();
    sync_config.timing_master = MASTER.to_string();
    let service = ClockSynchronizationService::new(
        sync_config,
        Arc::clone(&clocks) as Arc<dyn ClockService>,
        bus.participant(name),
    );
    service.initialize()?;
    let clock = clocks
        .main_clock()
        .ok_or_else(|| format!("{name}: no slave clock was registered"))?;
    clock.start(Arc::new(LoggingSink { participant: name }));
    Ok((service, clock))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let bus = LocalBus::new();
    let master_participant = bus.participant(MASTER);
    let clock = master_clock(&config)?;
    let sink = Arc::new(
        ClockMainEventSink::from_bus(Arc::clone(&master_participant) as Arc<dyn ServiceBus>)
            .with_timeout(config.clock.time_update_timeout()),
    );
    let master = Arc::new(RpcClockSyncService::new(Arc::clone(&clock), Arc::clone(&sink)));
    master.serve(master_participant.as_ref())?;

    let (follower, follower_clock) = slave(&bus, &config, "follower", SLAVE_MASTER_ON_DEMAND)?;
    let (stepper, stepper_clock) =
        slave(&bus, &config, "stepper", SLAVE_MASTER_ON_DEMAND_DISCRETE)?;

    info!(clock = %clock.name(), slaves = sink.subscriptions().len(), "starting timing master");
    clock.start(Arc::clone(&sink) as Arc<dyn EventSink>);

    for _ in 0..10 {
        thread::sleep(StdDuration::from_millis(200));
        info!(
            master = %clock.time(),
            follower = %follower_clock.time(),
            stepper = %stepper_clock.time(),
            "clock readings"
        );
    }

    clock.stop();
    follower_clock.stop();
    stepper_clock.stop();
    follower.deinitialize();
    stepper.deinitialize();
    RpcClockSyncService::withdraw(master_participant.as_ref());
    Ok(())
}
