//! Clock synchronization event identifiers and subscription flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::CoreError;

/// Time event pushed from a timing master to its slaves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventId {
    TimeUpdateBefore = 0,
    TimeUpdating = 1,
    TimeUpdateAfter = 2,
    TimeReset = 3,
}

impl EventId {
    pub const ALL: [EventId; 4] = [
        EventId::TimeUpdateBefore,
        EventId::TimeUpdating,
        EventId::TimeUpdateAfter,
        EventId::TimeReset,
    ];

    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Result<Self, CoreError> {
        match value {
            0 => Ok(EventId::TimeUpdateBefore),
            1 => Ok(EventId::TimeUpdating),
            2 => Ok(EventId::TimeUpdateAfter),
            3 => Ok(EventId::TimeReset),
            other => Err(CoreError::UnknownEventId(other)),
        }
    }

    /// Subscription flag selecting this event
    #[inline]
    pub fn flag(self) -> EventIdFlags {
        EventIdFlags(1 << self.as_i32())
    }
}

/// Bitmask of `EventId`s a slave subscribes to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventIdFlags(u32);

impl EventIdFlags {
    pub const NONE: EventIdFlags = EventIdFlags(0);
    pub const UPDATE_BEFORE: EventIdFlags = EventIdFlags(1);
    pub const UPDATING: EventIdFlags = EventIdFlags(2);
    pub const UPDATE_AFTER: EventIdFlags = EventIdFlags(4);
    pub const RESET: EventIdFlags = EventIdFlags(8);
    pub const ALL: EventIdFlags = EventIdFlags(15);

    /// Decode from the wire, dropping bits that name no event
    #[inline]
    pub fn from_bits(bits: i32) -> Self {
        EventIdFlags(bits as u32 & Self::ALL.0)
    }

    #[inline]
    pub fn bits(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub fn contains(self, other: EventIdFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    #[inline]
    pub fn includes(self, event: EventId) -> bool {
        self.contains(event.flag())
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventIdFlags {
    type Output = EventIdFlags;

    #[inline]
    fn bitor(self, rhs: EventIdFlags) -> Self::Output {
        EventIdFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventIdFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: EventIdFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EventIdFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = EventId::ALL
            .iter()
            .filter(|event| self.includes(**event))
            .map(|event| match event {
                EventId::TimeUpdateBefore => "before",
                EventId::TimeUpdating => "updating",
                EventId::TimeUpdateAfter => "after",
                EventId::TimeReset => "reset",
            })
            .collect();
        write!(f, "EventIdFlags({})", names.join("|"))
    }
}
