//! Error types for clock synchronization

use lockstep_clock::ClockError;
use lockstep_rpc::RpcError;
use thiserror::Error;

use crate::ConfigError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(
        "No timing master configured. Please configure the timing master name \
         in clock-synchronization.timing-master."
    )]
    MissingTimingMaster,

    #[error("Invalid slave sync cycle time of {0}. Slave sync cycle time has to be > 0.")]
    InvalidSyncCycleTime(i64),

    #[error("Invalid clock configuration: {0}")]
    Clock(#[from] ClockError),

    #[error("No requester available for participant {0}")]
    RequesterNotFound(String),

    #[error("Timing slave {0} is not registered")]
    UnknownSlave(String),

    #[error("Failed to register clock {name}: {reason}")]
    ClockRegistration { name: String, reason: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
