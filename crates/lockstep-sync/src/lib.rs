//! Lockstep Sync - clock synchronization between participants
//!
//! One participant acts as timing master: its main clock reports to a
//! `ClockMainEventSink`, which pushes every time event to the registered
//! slaves, and `RpcClockSyncService` answers their time queries.
//!
//! Timing slaves run one of two on-demand clocks:
//! - `MasterOnDemandClockInterpolating`: continuous, pulls the master time every
//!   sync cycle and interpolates in between
//! - `MasterOnDemandClockDiscrete`: discrete, stepped by the master's pushed events
//!
//! `ClockSynchronizationService` picks the role from the configured main clock.

pub mod client_reset;
pub mod config;
pub mod error;
pub mod far_clock;
pub mod main_sink;
pub mod master_service;
pub mod service;
pub mod slave_discrete;
pub mod slave_interpolating;

pub use client_reset::*;
pub use config::*;
pub use error::*;
pub use far_clock::*;
pub use main_sink::*;
pub use master_service::*;
pub use service::*;
pub use slave_discrete::*;
pub use slave_interpolating::*;
