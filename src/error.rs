use thiserror::Error;

use crate::registry::SlotId;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("no capacity: all slots occupied and queueing unavailable")]
    NoCapacity,

    #[error("job queue full (max size: {max}), cannot accept job")]
    QueueFull { max: usize },

    #[error("job expired in queue after {secs}s")]
    QueueExpired { secs: u64 },

    #[error("failed to requeue job after placement miss")]
    RequeueFailed,

    #[error("slot {0} already occupied")]
    SlotOccupied(SlotId),

    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),

    #[error("worker dispatch timed out after {secs}s")]
    DispatchTimeout { secs: u64 },

    #[error("worker communication failed: {0}")]
    DispatchTransport(String),

    #[error("worker returned status {0}")]
    DispatchStatus(u16),

    #[error("failed to decode worker response: {0}")]
    DispatchDecode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GateError>;
