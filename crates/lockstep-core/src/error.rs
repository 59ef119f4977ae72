//! Error types for lockstep core primitives

use thiserror::Error;

/// Errors raised while decoding core values from their wire form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Unknown event id: {0}")]
    UnknownEventId(i32),

    #[error("Unknown clock type: {0}")]
    UnknownClockType(i32),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
