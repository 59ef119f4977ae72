//! Payload of a pushed time event
//!
//! Times travel as decimal nanosecond strings. An empty `next_tick` means the
//! master has no look-ahead; fields an event does not use are sent as "0".

use lockstep_core::{CoreError, EventId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncTimeEvent {
    pub event_id: EventId,
    pub new_time: Timestamp,
    pub next_tick: Option<Timestamp>,
    pub old_time: Timestamp,
}

/// `SyncTimeEvent` in its on-the-wire form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedSyncTimeEvent {
    pub event_id: i32,
    pub new_time: String,
    pub next_tick: String,
    pub old_time: String,
}

impl SyncTimeEvent {
    pub fn new(event_id: EventId, new_time: Timestamp) -> Self {
        SyncTimeEvent {
            event_id,
            new_time,
            next_tick: None,
            old_time: Timestamp::ZERO,
        }
    }

    pub fn with_next_tick(mut self, next_tick: Option<Timestamp>) -> Self {
        self.next_tick = next_tick;
        self
    }

    pub fn with_old_time(mut self, old_time: Timestamp) -> Self {
        self.old_time = old_time;
        self
    }

    pub fn encode(&self) -> EncodedSyncTimeEvent {
        EncodedSyncTimeEvent {
            event_id: self.event_id.as_i32(),
            new_time: self.new_time.to_string(),
            next_tick: self.next_tick.map(|t| t.to_string()).unwrap_or_default(),
            old_time: self.old_time.to_string(),
        }
    }

    /// Decode a received event.
    ///
    /// `event_id` and `new_time` are mandatory. An unreadable `next_tick` is
    /// treated as absent and an unreadable `old_time` as zero.
    pub fn decode(
        event_id: i32,
        new_time: &str,
        next_tick: &str,
        old_time: &str,
    ) -> Result<Self, CoreError> {
        let event_id = EventId::from_i32(event_id)?;
        let new_time = new_time.parse::<Timestamp>()?;
        let next_tick = Timestamp::parse_optional(next_tick).unwrap_or(None);
        let old_time = old_time.parse::<Timestamp>().unwrap_or(Timestamp::ZERO);

        Ok(SyncTimeEvent {
            event_id,
            new_time,
            next_tick,
            old_time,
        })
    }
}
