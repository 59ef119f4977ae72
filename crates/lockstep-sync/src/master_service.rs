//! `clock_sync_master` endpoint of the timing master

use std::sync::Arc;

use lockstep_core::{Clock, EventIdFlags};
use lockstep_rpc::{MasterService, RpcError, RpcService, ServiceBus, CLOCK_SYNC_MASTER_SERVICE};
use tracing::{debug, error};

use crate::ClockMainEventSink;

/// Answers slave time queries from the main clock and manages slave
/// subscriptions in the fan-out sink.
pub struct RpcClockSyncService {
    clock: Arc<dyn Clock>,
    sink: Arc<ClockMainEventSink>,
}

impl RpcClockSyncService {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<ClockMainEventSink>) -> Self {
        RpcClockSyncService { clock, sink }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn event_sink(&self) -> &Arc<ClockMainEventSink> {
        &self.sink
    }

    /// Offer this endpoint on `bus` as `clock_sync_master`
    pub fn serve(self: &Arc<Self>, bus: &dyn ServiceBus) -> Result<(), RpcError> {
        bus.register_service(RpcService::Master(Arc::clone(self) as Arc<dyn MasterService>))?;
        debug!(
            participant = %bus.participant_name(),
            clock = %self.clock.name(),
            "timing master service offered"
        );
        Ok(())
    }

    pub fn withdraw(bus: &dyn ServiceBus) {
        bus.unregister_service(CLOCK_SYNC_MASTER_SERVICE);
    }
}

impl MasterService for RpcClockSyncService {
    fn get_master_time(&self) -> String {
        self.clock.time().to_string()
    }

    fn get_master_type(&self) -> i32 {
        self.clock.clock_type().as_i32()
    }

    fn register_sync_slave(&self, event_id_flags: i32, slave_name: &str) -> i32 {
        match self
            .sink
            .register_client(slave_name, EventIdFlags::from_bits(event_id_flags))
        {
            Ok(()) => 0,
            Err(e) => {
                error!(slave = slave_name, "Failed to register timing slave: {}", e);
                -1
            }
        }
    }

    fn unregister_sync_slave(&self, slave_name: &str) -> i32 {
        match self.sink.unregister_client(slave_name) {
            Ok(()) => 0,
            Err(e) => {
                error!(slave = slave_name, "Failed to unregister timing slave: {}", e);
                -1
            }
        }
    }
}
