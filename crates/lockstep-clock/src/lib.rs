//! Lockstep Clock - local time sources
//!
//! This crate provides:
//! - `EventSequencer`: the reset/update algorithm shared by every clock
//! - `SystemClock`: continuous wall time with a resettable offset
//! - `SimulationClock`: discrete, rate-scaled time advanced by a worker thread
//! - `InterpolationTime`: extrapolation of sparse remote time samples

pub mod error;
pub mod interpolation;
pub mod sequencer;
pub mod simulation;
pub mod system;

pub use error::*;
pub use interpolation::*;
pub use sequencer::*;
pub use simulation::*;
pub use system::*;
