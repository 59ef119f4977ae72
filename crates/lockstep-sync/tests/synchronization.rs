//! Timing master and slaves wired over an in-process bus

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use lockstep_clock::{SimulationClock, SystemClock};
use lockstep_core::{
    Clock, Duration, EventIdFlags, EventSink, Timestamp, SLAVE_MASTER_ON_DEMAND,
    SLAVE_MASTER_ON_DEMAND_DISCRETE,
};
use lockstep_rpc::{LocalBus, LocalParticipant, ServiceBus};
use lockstep_sync::{
    ClockMainEventSink, ClockService, ClockSyncConfig, ClockSynchronizationService,
    RpcClockSyncService, SyncError,
};
use lockstep_test::{eventually, RecordingSink, SinkEvent};
use parking_lot::Mutex;

const WAIT: StdDuration = StdDuration::from_secs(10);

struct LocalClocks {
    main_clock: String,
    clocks: Mutex<HashMap<String, Arc<dyn Clock>>>,
}

impl LocalClocks {
    fn new(main_clock: &str) -> Arc<Self> {
        Arc::new(LocalClocks {
            main_clock: main_clock.to_string(),
            clocks: Mutex::new(HashMap::new()),
        })
    }

    fn main_clock(&self) -> Option<Arc<dyn Clock>> {
        self.clocks.lock().get(&self.main_clock).cloned()
    }
}

impl ClockService for LocalClocks {
    fn main_clock_name(&self) -> String {
        self.main_clock.clone()
    }

    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<(), SyncError> {
        self.clocks.lock().insert(clock.name().to_string(), clock);
        Ok(())
    }

    fn unregister_clock(&self, name: &str) {
        self.clocks.lock().remove(name);
    }
}

struct Master {
    participant: Arc<LocalParticipant>,
    clock: Arc<dyn Clock>,
    sink: Arc<ClockMainEventSink>,
}

impl Master {
    fn new(bus: &LocalBus, clock: Arc<dyn Clock>) -> Self {
        let participant = bus.participant("master");
        let sink = Arc::new(ClockMainEventSink::from_bus(
            Arc::clone(&participant) as Arc<dyn ServiceBus>
        ));
        let service = Arc::new(RpcClockSyncService::new(Arc::clone(&clock), Arc::clone(&sink)));
        service.serve(participant.as_ref()).unwrap();
        Master {
            participant,
            clock,
            sink,
        }
    }

    fn start(&self) {
        self.clock.start(Arc::clone(&self.sink) as Arc<dyn EventSink>);
    }
}

struct Slave {
    clocks: Arc<LocalClocks>,
    service: ClockSynchronizationService,
    events: Arc<RecordingSink>,
}

impl Slave {
    fn new(bus: &LocalBus, name: &str, main_clock: &str, config: ClockSyncConfig) -> Self {
        let clocks = LocalClocks::new(main_clock);
        let service = ClockSynchronizationService::new(
            config,
            Arc::clone(&clocks) as Arc<dyn ClockService>,
            bus.participant(name),
        );
        Slave {
            clocks,
            service,
            events: RecordingSink::new(),
        }
    }

    fn start(&self) -> Arc<dyn Clock> {
        self.service.initialize().unwrap();
        let clock = self.clocks.main_clock().unwrap();
        clock.start(Arc::clone(&self.events) as Arc<dyn EventSink>);
        clock
    }
}

fn slave_config(sync_cycle: Duration) -> ClockSyncConfig {
    ClockSyncConfig {
        timing_master: "master".to_string(),
        sync_cycle_time: sync_cycle.as_nanos(),
        forward_update_brackets: false,
    }
}

fn simulation_master(bus: &LocalBus) -> (Master, Arc<SimulationClock>) {
    let clock = Arc::new(SimulationClock::new());
    clock
        .update_configuration(Duration::from_millis(10), 1.0)
        .unwrap();
    let master = Master::new(bus, Arc::clone(&clock) as Arc<dyn Clock>);
    (master, clock)
}

#[test]
fn test_discrete_slave_follows_simulation_master() {
    let bus = LocalBus::new();
    let (master, _) = simulation_master(&bus);
    let slave = Slave::new(
        &bus,
        "slave",
        SLAVE_MASTER_ON_DEMAND_DISCRETE,
        slave_config(Duration::from_millis(100)),
    );
    let slave_clock = slave.start();

    master.start();
    assert!(slave.events.wait_for(
        |events| events
            .iter()
            .filter(|event| matches!(event, SinkEvent::Updating { .. }))
            .count()
            >= 5,
        WAIT
    ));
    master.clock.stop();

    let events = slave.events.events();
    assert_eq!(
        events[0],
        SinkEvent::ResetBegin {
            old: Timestamp::ZERO,
            new: Timestamp::ZERO
        }
    );
    let updates: Vec<Timestamp> = events
        .iter()
        .filter_map(|event| match event {
            SinkEvent::Updating { new, .. } => Some(*new),
            _ => None,
        })
        .collect();
    assert!(updates.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(slave_clock.time(), master.clock.time());
}

#[test]
fn test_interpolating_slave_follows_system_master() {
    let bus = LocalBus::new();
    let master = Master::new(&bus, Arc::new(SystemClock::new()));
    let slave = Slave::new(
        &bus,
        "slave",
        SLAVE_MASTER_ON_DEMAND,
        slave_config(Duration::from_millis(5)),
    );
    let slave_clock = slave.start();

    master.start();
    assert!(eventually(WAIT, || slave_clock.time() >= Timestamp::from_millis(30)));

    let mut last = slave_clock.time();
    for _ in 0..50 {
        let now = slave_clock.time();
        assert!(now >= last);
        last = now;
        std::thread::sleep(StdDuration::from_millis(1));
    }
    assert!(slave.events.events().iter().any(SinkEvent::is_reset));

    slave_clock.stop();
    master.clock.stop();
}

#[test]
fn test_unreachable_slave_does_not_block_others() {
    let bus = LocalBus::new();
    let (master, _) = simulation_master(&bus);
    let config = slave_config(Duration::from_millis(100));
    let lost = Slave::new(&bus, "lost", SLAVE_MASTER_ON_DEMAND_DISCRETE, config.clone());
    let kept = Slave::new(&bus, "kept", SLAVE_MASTER_ON_DEMAND_DISCRETE, config);
    lost.start();
    let kept_clock = kept.start();
    assert_eq!(master.sink.subscriptions().len(), 2);

    bus.set_reachable("lost", false);
    master.sink.time_reset_begin(Timestamp::ZERO, Timestamp(100));
    master.sink.time_updating(Timestamp(200), Some(Timestamp(300)));

    assert!(lost.events.is_empty());
    assert_eq!(kept_clock.time(), Timestamp(200));
    assert_eq!(kept.events.len(), 5);
}

#[test]
fn test_slow_slave_times_out() {
    let bus = LocalBus::new();
    let (master, _) = simulation_master(&bus);
    master.sink.update_timeout(Duration::from_millis(20));
    let config = slave_config(Duration::from_millis(100));
    let slow = Slave::new(&bus, "slow", SLAVE_MASTER_ON_DEMAND_DISCRETE, config.clone());
    let fast = Slave::new(&bus, "fast", SLAVE_MASTER_ON_DEMAND_DISCRETE, config);
    slow.start();
    let fast_clock = fast.start();

    bus.set_latency("slow", Duration::from_millis(50));
    master.sink.time_reset_begin(Timestamp::ZERO, Timestamp(7));

    assert!(slow.events.is_empty());
    assert_eq!(fast_clock.time(), Timestamp(7));
}

#[test]
fn test_reregistration_after_deinitialize() {
    let bus = LocalBus::new();
    let (master, _) = simulation_master(&bus);
    let slave = Slave::new(
        &bus,
        "slave",
        SLAVE_MASTER_ON_DEMAND_DISCRETE,
        ClockSyncConfig {
            forward_update_brackets: true,
            ..slave_config(Duration::from_millis(100))
        },
    );

    slave.start();
    assert_eq!(
        master.sink.subscription("slave").map(|s| s.flags),
        Some(EventIdFlags::ALL)
    );

    slave.service.deinitialize();
    assert!(master.sink.subscriptions().is_empty());

    slave.start();
    assert_eq!(master.sink.subscriptions().len(), 1);
    assert!(slave.service.is_slave());
    assert_eq!(master.participant.participant_name(), "master");
}

#[test]
fn test_slave_survives_master_outage() {
    let bus = LocalBus::new();
    let master = Master::new(&bus, Arc::new(SystemClock::new()));
    let slave = Slave::new(
        &bus,
        "slave",
        SLAVE_MASTER_ON_DEMAND,
        slave_config(Duration::from_millis(2)),
    );
    let slave_clock = slave.start();
    master.start();
    assert!(eventually(WAIT, || slave_clock.time() > Timestamp::ZERO));
    let updater = slave.service.updater().unwrap();

    bus.set_reachable("master", false);
    assert!(eventually(WAIT, || !updater.is_registered()));
    let before = slave_clock.time();
    std::thread::sleep(StdDuration::from_millis(10));
    assert!(slave_clock.time() >= before);

    bus.set_reachable("master", true);
    assert!(eventually(WAIT, || updater.is_registered()));

    slave_clock.stop();
    master.clock.stop();
}
