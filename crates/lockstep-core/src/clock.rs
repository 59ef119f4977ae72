//! Clock and event sink contracts
//!
//! A clock produces timestamps and, while started, reports every change of its
//! time to exactly one `EventSink`. Per advance the callbacks are ordered
//! `time_update_begin` -> `time_updating` -> `time_update_end`, per reset
//! `time_reset_begin` -> `time_reset_end`.

use std::sync::Arc;

use crate::{CoreError, Timestamp};

/// Wall-clock driven system time
pub const LOCAL_SYSTEM_REAL_CLOCK: &str = "local_system_realtime";
/// Rate-scaled simulation time driven by a worker thread
pub const LOCAL_SYSTEM_SIM_CLOCK: &str = "local_system_simtime";
/// Continuous slave clock interpolating the timing master's time
pub const SLAVE_MASTER_ON_DEMAND: &str = "slave_master_on_demand";
/// Discrete slave clock stepped by the timing master
pub const SLAVE_MASTER_ON_DEMAND_DISCRETE: &str = "slave_master_on_demand_discrete";

/// Whether a clock is pulled (continuous) or pushes ticks (discrete)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ClockType {
    Continuous = 0,
    Discrete = 1,
}

impl ClockType {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Result<Self, CoreError> {
        match value {
            0 => Ok(ClockType::Continuous),
            1 => Ok(ClockType::Discrete),
            other => Err(CoreError::UnknownClockType(other)),
        }
    }
}

/// Receiver of clock time events
pub trait EventSink: Send + Sync {
    fn time_update_begin(&self, old_time: Timestamp, new_time: Timestamp);

    /// `next_tick` is the look-ahead of discrete clocks, `None` when unknown
    fn time_updating(&self, new_time: Timestamp, next_tick: Option<Timestamp>);

    fn time_update_end(&self, new_time: Timestamp);

    fn time_reset_begin(&self, old_time: Timestamp, new_time: Timestamp);

    fn time_reset_end(&self, new_time: Timestamp);
}

/// A named time source
///
/// `start` and `stop` may be called any number of times and are idempotent.
pub trait Clock: Send + Sync {
    fn name(&self) -> &str;

    fn clock_type(&self) -> ClockType;

    fn time(&self) -> Timestamp;

    fn reset(&self, new_time: Timestamp);

    fn start(&self, sink: Arc<dyn EventSink>);

    fn stop(&self);
}

/// True for the clock names that make a participant a timing slave
pub fn is_slave_clock(name: &str) -> bool {
    name == SLAVE_MASTER_ON_DEMAND || name == SLAVE_MASTER_ON_DEMAND_DISCRETE
}
