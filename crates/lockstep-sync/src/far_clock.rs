//! Slave side of the timing master connection
//!
//! `FarClockUpdater` registers the local participant at the timing master,
//! receives the master's pushed time events through the `clock_sync_slave`
//! service and pulls the master time on demand. Transport failures never
//! propagate: they are logged and the registration is retried on the next pull.

use std::sync::Arc;

use lockstep_core::{ClockType, EventId, EventIdFlags, Timestamp};
use lockstep_rpc::{MasterRequester, SlaveService, SyncTimeEvent};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Handler for a master time event: `(event, new_time, old_time, next_tick)`,
/// returning the slave clock's resulting time
pub type ClockServerEvent =
    Arc<dyn Fn(EventId, Timestamp, Timestamp, Option<Timestamp>) -> Timestamp + Send + Sync>;

#[derive(Default)]
struct Link {
    connected: bool,
    registered: bool,
    master_type: Option<ClockType>,
}

pub struct FarClockUpdater {
    master: Arc<dyn MasterRequester>,
    local_name: String,
    event_flags: EventIdFlags,
    on_event: ClockServerEvent,
    link: Mutex<Link>,
}

impl FarClockUpdater {
    pub fn new(
        master: Arc<dyn MasterRequester>,
        local_name: impl Into<String>,
        event_flags: EventIdFlags,
        on_event: ClockServerEvent,
    ) -> Self {
        FarClockUpdater {
            master,
            local_name: local_name.into(),
            event_flags,
            on_event,
            link: Mutex::new(Link::default()),
        }
    }

    /// Events to subscribe to, with or without the before/after brackets
    pub fn event_flags_for(update_brackets: bool) -> EventIdFlags {
        if update_brackets {
            EventIdFlags::UPDATE_BEFORE
                | EventIdFlags::UPDATING
                | EventIdFlags::UPDATE_AFTER
                | EventIdFlags::RESET
        } else {
            EventIdFlags::UPDATING | EventIdFlags::RESET
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn event_flags(&self) -> EventIdFlags {
        self.event_flags
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().connected
    }

    pub fn is_registered(&self) -> bool {
        self.link.lock().registered
    }

    /// Clock type reported by the master at the last registration
    pub fn master_type(&self) -> Option<ClockType> {
        self.link.lock().master_type
    }

    pub fn start_rpc(&self) {
        self.link.lock().connected = true;
        self.register_to_master();
    }

    pub fn stop_rpc(&self) {
        let was_connected = std::mem::replace(&mut self.link.lock().connected, false);
        if !was_connected {
            return;
        }
        match self.master.unregister_sync_slave(&self.local_name) {
            Ok(0) => debug!(slave = %self.local_name, "unregistered from timing master"),
            Ok(status) => warn!(
                slave = %self.local_name,
                status,
                "Timing master refused to unregister timing slave"
            ),
            Err(e) => warn!(
                slave = %self.local_name,
                "Failure during unregistration as timing slave at the timing master: {}", e
            ),
        }
        self.link.lock().registered = false;
    }

    fn register_to_master(&self) -> bool {
        let master_type = match self.master.get_master_type() {
            Ok(value) => match ClockType::from_i32(value) {
                Ok(clock_type) => Some(clock_type),
                Err(e) => {
                    warn!("Timing master reported an unusable clock type: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failure retrieving the clock type of the timing master: {}", e);
                None
            }
        };

        let registered = match self
            .master
            .register_sync_slave(self.event_flags.bits(), &self.local_name)
        {
            Ok(0) => {
                debug!(slave = %self.local_name, flags = ?self.event_flags, "registered at timing master");
                true
            }
            Ok(status) => {
                warn!(
                    slave = %self.local_name,
                    status,
                    "Timing master refused the registration as timing slave"
                );
                false
            }
            Err(e) => {
                warn!(
                    slave = %self.local_name,
                    "Failure during registration as timing slave at the timing master: {}", e
                );
                false
            }
        };

        let mut link = self.link.lock();
        if master_type.is_some() {
            link.master_type = master_type;
        }
        link.registered = registered;
        registered
    }

    /// Pull the master time, `None` if it is not available right now.
    ///
    /// Only a continuous timing master is pulled; a discrete master drives its
    /// slaves through pushed events alone.
    pub fn get_time_from_master(&self) -> Option<Timestamp> {
        let (connected, registered) = {
            let link = self.link.lock();
            (link.connected, link.registered)
        };
        if !connected {
            debug!(slave = %self.local_name, "not connected to the timing master, skipping time request");
            return None;
        }
        if !registered {
            self.register_to_master();
        }
        if self.master_type() == Some(ClockType::Discrete) {
            return None;
        }

        debug!("Requesting master time to synchronize local time with timing master");
        let reply = match self.master.get_master_time() {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Failure during synchronization with timing master: {}", e);
                self.register_to_master();
                return None;
            }
        };
        match reply.parse::<Timestamp>() {
            Ok(time) => Some(time),
            Err(e) => {
                warn!("Failure during synchronization with timing master: {}", e);
                self.register_to_master();
                None
            }
        }
    }
}

impl SlaveService for FarClockUpdater {
    fn sync_time_event(
        &self,
        event_id: i32,
        new_time: &str,
        next_tick: &str,
        old_time: &str,
    ) -> String {
        let event = match SyncTimeEvent::decode(event_id, new_time, next_tick, old_time) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    event_id,
                    new_time, "Discarding malformed time event from timing master: {}", e
                );
                return String::new();
            }
        };
        debug!(
            event = ?event.event_id,
            new_time = %event.new_time,
            old_time = %event.old_time,
            "Received master time event"
        );

        let time = (self.on_event)(event.event_id, event.new_time, event.old_time, event.next_tick);
        time.to_string()
    }
}

impl std::fmt::Debug for FarClockUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.link.lock();
        f.debug_struct("FarClockUpdater")
            .field("local_name", &self.local_name)
            .field("event_flags", &self.event_flags)
            .field("connected", &link.connected)
            .field("registered", &link.registered)
            .field("master_type", &link.master_type)
            .finish()
    }
}
