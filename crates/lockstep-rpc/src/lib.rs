//! Lockstep RPC - the clock synchronization call contract
//!
//! This crate provides:
//! - Server and requester traits for the timing master and slave services
//! - `SyncTimeEvent`, the decimal-string payload of a pushed time event
//! - `ServiceBus`, the seam to the participant's RPC transport
//! - `LocalBus`, an in-process transport for wiring participants in one process

pub mod error;
pub mod loopback;
pub mod service;
pub mod wire;

pub use error::*;
pub use loopback::*;
pub use service::*;
pub use wire::*;
