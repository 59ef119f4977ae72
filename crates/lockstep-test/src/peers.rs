//! Scripted RPC peers

use std::sync::Arc;

use lockstep_core::{Duration, Timestamp};
use lockstep_rpc::{MasterRequester, RpcError, SlaveRequester};
use parking_lot::Mutex;

struct MasterScript {
    master_time: Timestamp,
    master_type: i32,
    register_status: i32,
    failing: bool,
    registrations: Vec<(i32, String)>,
    unregistrations: Vec<String>,
    time_requests: usize,
}

/// Timing master stand-in seen from a slave
pub struct ScriptedMaster {
    script: Mutex<MasterScript>,
}

impl ScriptedMaster {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedMaster {
            script: Mutex::new(MasterScript {
                master_time: Timestamp::ZERO,
                master_type: 0,
                register_status: 0,
                failing: false,
                registrations: Vec::new(),
                unregistrations: Vec::new(),
                time_requests: 0,
            }),
        })
    }

    pub fn set_master_time(&self, time: Timestamp) {
        self.script.lock().master_time = time;
    }

    pub fn set_master_type(&self, master_type: i32) {
        self.script.lock().master_type = master_type;
    }

    pub fn set_register_status(&self, status: i32) {
        self.script.lock().register_status = status;
    }

    /// Fail every request with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.script.lock().failing = failing;
    }

    pub fn registrations(&self) -> Vec<(i32, String)> {
        self.script.lock().registrations.clone()
    }

    pub fn unregistrations(&self) -> Vec<String> {
        self.script.lock().unregistrations.clone()
    }

    pub fn time_requests(&self) -> usize {
        self.script.lock().time_requests
    }

    fn check(&self, script: &MasterScript) -> Result<(), RpcError> {
        if script.failing {
            return Err(RpcError::Transport {
                participant: "master".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

impl MasterRequester for ScriptedMaster {
    fn get_master_time(&self) -> Result<String, RpcError> {
        let mut script = self.script.lock();
        script.time_requests += 1;
        self.check(&script)?;
        Ok(script.master_time.to_string())
    }

    fn get_master_type(&self) -> Result<i32, RpcError> {
        let script = self.script.lock();
        self.check(&script)?;
        Ok(script.master_type)
    }

    fn register_sync_slave(&self, event_id_flags: i32, slave_name: &str) -> Result<i32, RpcError> {
        let mut script = self.script.lock();
        self.check(&script)?;
        script.registrations.push((event_id_flags, slave_name.to_string()));
        Ok(script.register_status)
    }

    fn unregister_sync_slave(&self, slave_name: &str) -> Result<i32, RpcError> {
        let mut script = self.script.lock();
        self.check(&script)?;
        script.unregistrations.push(slave_name.to_string());
        Ok(0)
    }
}

/// One `sync_time_event` received by a `RecordingSlave`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlaveCall {
    pub event_id: i32,
    pub new_time: String,
    pub next_tick: String,
    pub old_time: String,
    pub timeout: Duration,
}

/// Timing slave stand-in seen from the master
pub struct RecordingSlave {
    name: String,
    calls: Mutex<Vec<SlaveCall>>,
    failure: Mutex<Option<RpcError>>,
}

impl RecordingSlave {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(RecordingSlave {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer every following call with `failure`, or normally with `None`
    pub fn set_failure(&self, failure: Option<RpcError>) {
        *self.failure.lock() = failure;
    }

    pub fn calls(&self) -> Vec<SlaveCall> {
        self.calls.lock().clone()
    }

    pub fn event_ids(&self) -> Vec<i32> {
        self.calls.lock().iter().map(|call| call.event_id).collect()
    }
}

impl SlaveRequester for RecordingSlave {
    fn sync_time_event(
        &self,
        event_id: i32,
        new_time: &str,
        next_tick: &str,
        old_time: &str,
        timeout: Duration,
    ) -> Result<String, RpcError> {
        self.calls.lock().push(SlaveCall {
            event_id,
            new_time: new_time.to_string(),
            next_tick: next_tick.to_string(),
            old_time: old_time.to_string(),
            timeout,
        });
        match self.failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(new_time.to_string()),
        }
    }
}
