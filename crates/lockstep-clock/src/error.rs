//! Error types for local clocks

use lockstep_core::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClockError {
    #[error("Invalid step size {0}ns: the step size has to be > 0")]
    InvalidStepSize(Duration),

    #[error("Invalid time factor {0}: the time factor has to be >= 0 (0 runs as fast as possible)")]
    InvalidTimeFactor(f64),
}
