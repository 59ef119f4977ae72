//! Clock synchronization role of a participant
//!
//! When the configured main clock is one of the on-demand slave clocks, the
//! participant becomes a timing slave: `ClockSynchronizationService` builds the
//! slave clock and its `FarClockUpdater`, hands the clock to the clock service
//! and offers the updater as `clock_sync_slave`. Any other main clock leaves the
//! participant autonomous or timing master, and nothing is set up here.

use std::sync::{Arc, OnceLock, Weak};

use lockstep_core::{
    is_slave_clock, Clock, ExternalClock, SteadyClock, Timestamp, SLAVE_MASTER_ON_DEMAND,
    SLAVE_MASTER_ON_DEMAND_DISCRETE,
};
use lockstep_rpc::{RpcService, ServiceBus, SlaveService, CLOCK_SYNC_SLAVE_SERVICE};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    ClockServerEvent, ClockSyncConfig, FarClockUpdater, MasterOnDemandClockDiscrete,
    MasterOnDemandClockInterpolating, SyncError, SyncResult,
};

/// The participant's clock registry
pub trait ClockService: Send + Sync {
    /// Name of the configured main clock
    fn main_clock_name(&self) -> String;

    fn register_clock(&self, clock: Arc<dyn Clock>) -> Result<(), SyncError>;

    fn unregister_clock(&self, name: &str);
}

/// The slave clock built for the participant's main clock
#[derive(Clone)]
pub enum SlaveClock {
    Interpolating(Arc<MasterOnDemandClockInterpolating>),
    Discrete(Arc<MasterOnDemandClockDiscrete>),
}

impl SlaveClock {
    pub fn name(&self) -> &str {
        match self {
            SlaveClock::Interpolating(clock) => clock.name(),
            SlaveClock::Discrete(clock) => clock.name(),
        }
    }

    pub fn as_clock(&self) -> Arc<dyn Clock> {
        match self {
            SlaveClock::Interpolating(clock) => Arc::clone(clock) as Arc<dyn Clock>,
            SlaveClock::Discrete(clock) => Arc::clone(clock) as Arc<dyn Clock>,
        }
    }
}

impl std::fmt::Debug for SlaveClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlaveClock({})", self.name())
    }
}

struct SlaveRole {
    clock: SlaveClock,
    updater: Arc<FarClockUpdater>,
}

pub struct ClockSynchronizationService {
    config: Mutex<ClockSyncConfig>,
    clock_service: Arc<dyn ClockService>,
    bus: Arc<dyn ServiceBus>,
    external: Arc<dyn ExternalClock>,
    role: Mutex<Option<SlaveRole>>,
}

impl ClockSynchronizationService {
    pub fn new(
        config: ClockSyncConfig,
        clock_service: Arc<dyn ClockService>,
        bus: Arc<dyn ServiceBus>,
    ) -> Self {
        ClockSynchronizationService {
            config: Mutex::new(config),
            clock_service,
            bus,
            external: Arc::new(SteadyClock),
            role: Mutex::new(None),
        }
    }

    /// Time source for the interpolating slave clock
    pub fn with_external_clock(mut self, external: Arc<dyn ExternalClock>) -> Self {
        self.external = external;
        self
    }

    /// Takes effect on the next `initialize`
    pub fn set_configuration(&self, config: ClockSyncConfig) {
        *self.config.lock() = config;
    }

    pub fn configuration(&self) -> ClockSyncConfig {
        self.config.lock().clone()
    }

    pub fn is_slave(&self) -> bool {
        self.role.lock().is_some()
    }

    pub fn slave_clock(&self) -> Option<SlaveClock> {
        self.role.lock().as_ref().map(|role| role.clock.clone())
    }

    pub fn updater(&self) -> Option<Arc<FarClockUpdater>> {
        self.role.lock().as_ref().map(|role| Arc::clone(&role.updater))
    }

    /// Take up the timing slave role if the main clock asks for it
    pub fn initialize(&self) -> SyncResult<()> {
        self.deinitialize();

        let main_clock = self.clock_service.main_clock_name();
        if !is_slave_clock(&main_clock) {
            debug!(main_clock = %main_clock, "main clock is not a slave clock, no synchronization needed");
            return Ok(());
        }

        let config = self.configuration();
        config.validate()?;
        let forward_brackets =
            main_clock == SLAVE_MASTER_ON_DEMAND_DISCRETE && config.forward_update_brackets;

        let master = self
            .bus
            .master_requester(&config.timing_master)
            .ok_or_else(|| SyncError::RequesterNotFound(config.timing_master.clone()))?;
        let local_name = self.bus.participant_name();
        let flags = FarClockUpdater::event_flags_for(forward_brackets);

        let role = if main_clock == SLAVE_MASTER_ON_DEMAND {
            let slot: Arc<OnceLock<Weak<MasterOnDemandClockInterpolating>>> = Arc::default();
            let target = Arc::clone(&slot);
            let on_event: ClockServerEvent =
                Arc::new(move |event, new_time, old_time, next_tick| {
                    match target.get().and_then(Weak::upgrade) {
                        Some(clock) => clock.master_time_event(event, new_time, old_time, next_tick),
                        None => Timestamp::ZERO,
                    }
                });
            let updater = Arc::new(FarClockUpdater::new(master, local_name, flags, on_event));

            let puller = Arc::clone(&updater);
            let clock = Arc::new(MasterOnDemandClockInterpolating::new(
                config.sync_cycle_time(),
                Arc::clone(&self.external),
                move || puller.get_time_from_master(),
            ));
            let filled = slot.set(Arc::downgrade(&clock)).is_ok();
            debug_assert!(filled, "event target of a fresh updater is set once");
            SlaveRole {
                clock: SlaveClock::Interpolating(clock),
                updater,
            }
        } else {
            let clock = Arc::new(MasterOnDemandClockDiscrete::new(forward_brackets));
            let target = Arc::clone(&clock);
            let on_event: ClockServerEvent =
                Arc::new(move |event, new_time, old_time, next_tick| {
                    target.master_time_event(event, new_time, old_time, next_tick)
                });
            SlaveRole {
                clock: SlaveClock::Discrete(clock),
                updater: Arc::new(FarClockUpdater::new(master, local_name, flags, on_event)),
            }
        };

        self.clock_service.register_clock(role.clock.as_clock())?;
        let service = Arc::clone(&role.updater) as Arc<dyn SlaveService>;
        if let Err(e) = self.bus.register_service(RpcService::Slave(service)) {
            self.clock_service.unregister_clock(role.clock.name());
            return Err(e.into());
        }
        role.updater.start_rpc();

        info!(
            clock = %role.clock.name(),
            timing_master = %config.timing_master,
            "participant synchronizes its clock to the timing master"
        );
        *self.role.lock() = Some(role);
        Ok(())
    }

    /// Release the timing slave role, if taken
    pub fn deinitialize(&self) {
        let Some(role) = self.role.lock().take() else {
            return;
        };
        self.clock_service.unregister_clock(role.clock.name());
        role.updater.stop_rpc();
        self.bus.unregister_service(CLOCK_SYNC_SLAVE_SERVICE);
        role.clock.as_clock().stop();
        debug!(clock = %role.clock.name(), "timing slave role released");
    }
}

impl Drop for ClockSynchronizationService {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
