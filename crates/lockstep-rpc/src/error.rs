//! Error types for clock synchronization RPC

use lockstep_core::{CoreError, Duration};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("Request to {participant} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        participant: String,
        timeout: Duration,
    },

    #[error("Transport failure talking to {participant}: {reason}")]
    Transport { participant: String, reason: String },

    #[error("Service {service} not found at participant {participant}")]
    ServiceNotFound { participant: String, service: String },

    #[error("Service {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] CoreError),
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
