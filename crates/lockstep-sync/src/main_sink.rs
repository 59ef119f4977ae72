//! Timing master fan-out
//!
//! `ClockMainEventSink` is the event sink of the participant's main clock on the
//! timing master. Every event is first handed to the local downstream sink, if
//! any, and then pushed to each registered slave whose subscription includes it.
//! Slaves are called one after another with a per-call timeout; a failing slave
//! is logged and skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use lockstep_core::{Duration, EventId, EventIdFlags, EventSink, Timestamp};
use lockstep_rpc::{RpcError, ServiceBus, SlaveRequester, SyncTimeEvent};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::SyncError;

/// Default per-slave RPC timeout: 5 s
pub const DEFAULT_TIME_UPDATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Smallest accepted per-slave RPC timeout
pub const MIN_TIME_UPDATE_TIMEOUT: Duration = Duration::from_millis(1);

/// Resolves a participant name to its slave service requester
pub type RequesterFactory = Box<dyn Fn(&str) -> Option<Arc<dyn SlaveRequester>> + Send + Sync>;

/// One registered timing slave
#[derive(Clone)]
pub struct SlaveSubscription {
    pub name: String,
    pub flags: EventIdFlags,
    requester: Arc<dyn SlaveRequester>,
}

impl std::fmt::Debug for SlaveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlaveSubscription")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

pub struct ClockMainEventSink {
    factory: RequesterFactory,
    registry: Mutex<BTreeMap<String, SlaveSubscription>>,
    timeout: Mutex<Duration>,
    local_sink: Option<Arc<dyn EventSink>>,
}

fn validate_timeout(timeout: Duration) -> Duration {
    if timeout < MIN_TIME_UPDATE_TIMEOUT {
        warn!(
            requested = %timeout,
            minimum = %MIN_TIME_UPDATE_TIMEOUT,
            "Time update timeout too small, using the minimum instead"
        );
        MIN_TIME_UPDATE_TIMEOUT
    } else {
        timeout
    }
}

impl ClockMainEventSink {
    pub fn new(factory: RequesterFactory) -> Self {
        ClockMainEventSink {
            factory,
            registry: Mutex::new(BTreeMap::new()),
            timeout: Mutex::new(DEFAULT_TIME_UPDATE_TIMEOUT),
            local_sink: None,
        }
    }

    /// Fan out to the slaves reachable through `bus`
    pub fn from_bus(bus: Arc<dyn ServiceBus>) -> Self {
        Self::new(Box::new(move |participant| bus.slave_requester(participant)))
    }

    /// Also deliver every event to `sink`, before the slaves
    pub fn with_local_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.local_sink = Some(sink);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.update_timeout(timeout);
        self
    }

    /// Set the per-slave timeout, clamped to `MIN_TIME_UPDATE_TIMEOUT`
    pub fn update_timeout(&self, timeout: Duration) -> Duration {
        let timeout = validate_timeout(timeout);
        *self.timeout.lock() = timeout;
        timeout
    }

    pub fn time_update_timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Subscribe `name` to `flags`, merging with an existing subscription
    pub fn register_client(&self, name: &str, flags: EventIdFlags) -> Result<(), SyncError> {
        {
            let mut registry = self.registry.lock();
            if let Some(subscription) = registry.get_mut(name) {
                subscription.flags |= flags;
                debug!(slave = name, flags = ?subscription.flags, "timing slave subscription extended");
                return Ok(());
            }
        }

        let requester =
            (self.factory)(name).ok_or_else(|| SyncError::RequesterNotFound(name.to_string()))?;

        let mut registry = self.registry.lock();
        let subscription = registry
            .entry(name.to_string())
            .or_insert_with(|| SlaveSubscription {
                name: name.to_string(),
                flags: EventIdFlags::NONE,
                requester,
            });
        subscription.flags |= flags;
        debug!(slave = name, flags = ?subscription.flags, "timing slave registered");
        Ok(())
    }

    pub fn unregister_client(&self, name: &str) -> Result<(), SyncError> {
        match self.registry.lock().remove(name) {
            Some(_) => {
                debug!(slave = name, "timing slave unregistered");
                Ok(())
            }
            None => Err(SyncError::UnknownSlave(name.to_string())),
        }
    }

    pub fn subscriptions(&self) -> Vec<SlaveSubscription> {
        self.registry.lock().values().cloned().collect()
    }

    pub fn subscription(&self, name: &str) -> Option<SlaveSubscription> {
        self.registry.lock().get(name).cloned()
    }

    fn broadcast(&self, event: SyncTimeEvent) {
        let targets: Vec<SlaveSubscription> = self
            .registry
            .lock()
            .values()
            .filter(|subscription| subscription.flags.includes(event.event_id))
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }

        let timeout = self.time_update_timeout();
        let encoded = event.encode();
        for target in targets {
            let result = target.requester.sync_time_event(
                encoded.event_id,
                &encoded.new_time,
                &encoded.next_tick,
                &encoded.old_time,
                timeout,
            );
            match result {
                Ok(reply) => {
                    debug!(slave = %target.name, event = ?event.event_id, reply = %reply, "time event delivered")
                }
                Err(RpcError::Timeout { timeout, .. }) => error!(
                    slave = %target.name,
                    event = ?event.event_id,
                    "Timeout of {}ms exceeded while synchronizing timing slave",
                    timeout.as_millis()
                ),
                Err(e) => error!(
                    slave = %target.name,
                    event = ?event.event_id,
                    "Failure while synchronizing timing slave: {}", e
                ),
            }
        }
    }
}

impl EventSink for ClockMainEventSink {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        if let Some(sink) = &self.local_sink {
            sink.time_update_begin(old_time, new_time);
        }
        self.broadcast(
            SyncTimeEvent::new(EventId::TimeUpdateBefore, new_time).with_old_time(old_time),
        );
    }

    fn time_updating(&self, new_time: Timestamp, next_tick: Option<Timestamp>) {
        if let Some(sink) = &self.local_sink {
            sink.time_updating(new_time, next_tick);
        }
        self.broadcast(SyncTimeEvent::new(EventId::TimeUpdating, new_time).with_next_tick(next_tick));
    }

    fn time_update_end(&self, new_time: Timestamp) {
        if let Some(sink) = &self.local_sink {
            sink.time_update_end(new_time);
        }
        self.broadcast(SyncTimeEvent::new(EventId::TimeUpdateAfter, new_time));
    }

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp) {
        if let Some(sink) = &self.local_sink {
            sink.time_reset_begin(old_time, new_time);
        }
        self.broadcast(SyncTimeEvent::new(EventId::TimeReset, new_time).with_old_time(old_time));
    }

    fn time_reset_end(&self, new_time: Timestamp) {
        if let Some(sink) = &self.local_sink {
            sink.time_reset_end(new_time);
        }
    }
}
