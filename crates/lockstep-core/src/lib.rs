//! Lockstep Core - shared time primitives and clock contracts
//!
//! This crate provides:
//! - Nanosecond `Timestamp` and `Duration` with their decimal wire form
//! - The `Clock` and `EventSink` traits every clock implementation speaks
//! - Event identifiers and subscription flags used by clock synchronization
//! - The `ExternalClock` time source seam and a cancellable `StopSignal`

pub mod clock;
pub mod error;
pub mod event;
pub mod external;
pub mod time;

pub use clock::*;
pub use error::*;
pub use event::*;
pub use external::*;
pub use time::*;
