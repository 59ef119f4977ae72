//! Clock synchronization services
//!
//! Every participant can host two services:
//! - `clock_sync_master` on the timing master: time queries and slave registration
//! - `clock_sync_slave` on each timing slave: receives pushed time events
//!
//! Server traits are what a participant implements; requester traits are the
//! client side handed out by the transport and can fail.

use std::sync::Arc;

use lockstep_core::Duration;

use crate::RpcError;

pub const CLOCK_SYNC_MASTER_SERVICE: &str = "clock_sync_master";
pub const CLOCK_SYNC_SLAVE_SERVICE: &str = "clock_sync_slave";

/// Served by the timing master
pub trait MasterService: Send + Sync {
    /// Master clock time as decimal nanoseconds
    fn get_master_time(&self) -> String;

    /// Master clock type, 0 = continuous, 1 = discrete
    fn get_master_type(&self) -> i32;

    /// Subscribe `slave_name` to the events in `event_id_flags`; 0 on success
    fn register_sync_slave(&self, event_id_flags: i32, slave_name: &str) -> i32;

    fn unregister_sync_slave(&self, slave_name: &str) -> i32;
}

/// Client side of `MasterService`
pub trait MasterRequester: Send + Sync {
    fn get_master_time(&self) -> Result<String, RpcError>;

    fn get_master_type(&self) -> Result<i32, RpcError>;

    fn register_sync_slave(&self, event_id_flags: i32, slave_name: &str) -> Result<i32, RpcError>;

    fn unregister_sync_slave(&self, slave_name: &str) -> Result<i32, RpcError>;
}

/// Served by every timing slave
pub trait SlaveService: Send + Sync {
    /// Deliver one time event. `next_tick` is empty when there is no look-ahead.
    /// Returns the slave's resulting time as decimal nanoseconds.
    fn sync_time_event(&self, event_id: i32, new_time: &str, next_tick: &str, old_time: &str)
        -> String;
}

/// Client side of `SlaveService`
pub trait SlaveRequester: Send + Sync {
    fn sync_time_event(
        &self,
        event_id: i32,
        new_time: &str,
        next_tick: &str,
        old_time: &str,
        timeout: Duration,
    ) -> Result<String, RpcError>;
}

/// A service instance offered on the bus
#[derive(Clone)]
pub enum RpcService {
    Master(Arc<dyn MasterService>),
    Slave(Arc<dyn SlaveService>),
}

impl RpcService {
    pub fn name(&self) -> &'static str {
        match self {
            RpcService::Master(_) => CLOCK_SYNC_MASTER_SERVICE,
            RpcService::Slave(_) => CLOCK_SYNC_SLAVE_SERVICE,
        }
    }
}

impl std::fmt::Debug for RpcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RpcService({})", self.name())
    }
}

/// The participant's view of its RPC transport
pub trait ServiceBus: Send + Sync {
    fn participant_name(&self) -> String;

    /// Requester for the master service of `participant`, `None` if unknown
    fn master_requester(&self, participant: &str) -> Option<Arc<dyn MasterRequester>>;

    /// Requester for the slave service of `participant`, `None` if unknown
    fn slave_requester(&self, participant: &str) -> Option<Arc<dyn SlaveRequester>>;

    fn register_service(&self, service: RpcService) -> Result<(), RpcError>;

    fn unregister_service(&self, service_name: &str);
}
