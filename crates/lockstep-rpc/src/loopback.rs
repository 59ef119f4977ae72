//! In-process service bus
//!
//! Routes requests between participants living in the same process. Calls are
//! synchronous and resolve the target service at call time, so a participant
//! that unregisters its service is seen as gone by existing requesters.
//! Individual participants can be marked unreachable or given a latency to
//! exercise timeout and failure paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use lockstep_core::Duration;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    MasterRequester, MasterService, RpcError, RpcService, ServiceBus, SlaveRequester,
    SlaveService, CLOCK_SYNC_MASTER_SERVICE, CLOCK_SYNC_SLAVE_SERVICE,
};

#[derive(Default)]
struct Endpoint {
    master: Option<Arc<dyn MasterService>>,
    slave: Option<Arc<dyn SlaveService>>,
    unreachable: bool,
    latency: Duration,
}

/// Shared routing table of all in-process participants
#[derive(Clone, Default)]
pub struct LocalBus {
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the bus as `name`, creating the participant if needed
    pub fn participant(&self, name: &str) -> Arc<LocalParticipant> {
        self.endpoints.lock().entry(name.to_string()).or_default();
        Arc::new(LocalParticipant {
            bus: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn participants(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.lock().contains_key(name)
    }

    /// Make every request to `name` fail with a transport error
    pub fn set_reachable(&self, name: &str, reachable: bool) {
        if let Some(endpoint) = self.endpoints.lock().get_mut(name) {
            endpoint.unreachable = !reachable;
        }
    }

    /// Delay every request to `name`
    pub fn set_latency(&self, name: &str, latency: Duration) {
        if let Some(endpoint) = self.endpoints.lock().get_mut(name) {
            endpoint.latency = latency;
        }
    }

    fn route<S: ?Sized>(
        &self,
        target: &str,
        service_name: &str,
        select: impl FnOnce(&Endpoint) -> Option<Arc<S>>,
    ) -> Result<(Arc<S>, Duration), RpcError> {
        let endpoints = self.endpoints.lock();
        let endpoint = endpoints.get(target).ok_or_else(|| RpcError::Transport {
            participant: target.to_string(),
            reason: "participant left the bus".to_string(),
        })?;
        if endpoint.unreachable {
            return Err(RpcError::Transport {
                participant: target.to_string(),
                reason: "participant unreachable".to_string(),
            });
        }
        let service = select(endpoint).ok_or_else(|| RpcError::ServiceNotFound {
            participant: target.to_string(),
            service: service_name.to_string(),
        })?;
        Ok((service, endpoint.latency))
    }

    fn register(&self, participant: &str, service: RpcService) -> Result<(), RpcError> {
        let mut endpoints = self.endpoints.lock();
        let endpoint = endpoints.entry(participant.to_string()).or_default();
        let name = service.name();
        match service {
            RpcService::Master(master) => {
                if endpoint.master.is_some() {
                    return Err(RpcError::AlreadyRegistered(name.to_string()));
                }
                endpoint.master = Some(master);
            }
            RpcService::Slave(slave) => {
                if endpoint.slave.is_some() {
                    return Err(RpcError::AlreadyRegistered(name.to_string()));
                }
                endpoint.slave = Some(slave);
            }
        }
        debug!(participant, service = name, "service registered");
        Ok(())
    }

    fn unregister(&self, participant: &str, service_name: &str) {
        if let Some(endpoint) = self.endpoints.lock().get_mut(participant) {
            let removed = match service_name {
                CLOCK_SYNC_MASTER_SERVICE => endpoint.master.take().is_some(),
                CLOCK_SYNC_SLAVE_SERVICE => endpoint.slave.take().is_some(),
                _ => false,
            };
            if removed {
                debug!(participant, service = service_name, "service unregistered");
            }
        }
    }
}

/// One participant's handle on a `LocalBus`
pub struct LocalParticipant {
    bus: LocalBus,
    name: String,
}

impl LocalParticipant {
    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }
}

impl ServiceBus for LocalParticipant {
    fn participant_name(&self) -> String {
        self.name.clone()
    }

    fn master_requester(&self, participant: &str) -> Option<Arc<dyn MasterRequester>> {
        if !self.bus.contains(participant) {
            return None;
        }
        Some(Arc::new(LocalMasterRequester {
            bus: self.bus.clone(),
            target: participant.to_string(),
        }))
    }

    fn slave_requester(&self, participant: &str) -> Option<Arc<dyn SlaveRequester>> {
        if !self.bus.contains(participant) {
            return None;
        }
        Some(Arc::new(LocalSlaveRequester {
            bus: self.bus.clone(),
            target: participant.to_string(),
        }))
    }

    fn register_service(&self, service: RpcService) -> Result<(), RpcError> {
        self.bus.register(&self.name, service)
    }

    fn unregister_service(&self, service_name: &str) {
        self.bus.unregister(&self.name, service_name);
    }
}

struct LocalMasterRequester {
    bus: LocalBus,
    target: String,
}

impl LocalMasterRequester {
    fn call<T>(&self, f: impl FnOnce(&dyn MasterService) -> T) -> Result<T, RpcError> {
        let (master, latency) =
            self.bus
                .route(&self.target, CLOCK_SYNC_MASTER_SERVICE, |endpoint| endpoint.master.clone())?;
        if latency > Duration::ZERO {
            thread::sleep(latency.to_std());
        }
        Ok(f(master.as_ref()))
    }
}

impl MasterRequester for LocalMasterRequester {
    fn get_master_time(&self) -> Result<String, RpcError> {
        self.call(|master| master.get_master_time())
    }

    fn get_master_type(&self) -> Result<i32, RpcError> {
        self.call(|master| master.get_master_type())
    }

    fn register_sync_slave(&self, event_id_flags: i32, slave_name: &str) -> Result<i32, RpcError> {
        self.call(|master| master.register_sync_slave(event_id_flags, slave_name))
    }

    fn unregister_sync_slave(&self, slave_name: &str) -> Result<i32, RpcError> {
        self.call(|master| master.unregister_sync_slave(slave_name))
    }
}

struct LocalSlaveRequester {
    bus: LocalBus,
    target: String,
}

impl SlaveRequester for LocalSlaveRequester {
    fn sync_time_event(
        &self,
        event_id: i32,
        new_time: &str,
        next_tick: &str,
        old_time: &str,
        timeout: Duration,
    ) -> Result<String, RpcError> {
        let (slave, latency) =
            self.bus
                .route(&self.target, CLOCK_SYNC_SLAVE_SERVICE, |endpoint| endpoint.slave.clone())?;
        if latency >= timeout {
            thread::sleep(timeout.to_std());
            return Err(RpcError::Timeout {
                participant: self.target.clone(),
                timeout,
            });
        }
        if latency > Duration::ZERO {
            thread::sleep(latency.to_std());
        }
        Ok(slave.sync_time_event(event_id, new_time, next_tick, old_time))
    }
}
