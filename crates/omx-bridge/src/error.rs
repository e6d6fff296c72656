//! Bridge errors

use std::time::Duration;

use thiserror::Error;

use omx_core::OmxError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge not bound")]
    NotBound,

    #[error("Bridge already bound")]
    AlreadyBound,

    #[error("Backend rejected {op}: {reason}")]
    Rejected { op: String, reason: String },

    #[error("No acknowledgement for {op} within {after:?}")]
    Timeout { op: String, after: Duration },

    #[error("Backend worker disconnected")]
    Disconnected,

    #[error("Failed to start backend worker: {0}")]
    Spawn(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BridgeError> for OmxError {
    /// A missing ack leaves the backend in an unknown state and is fatal;
    /// every other failure is a recoverable hardware error.
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout { op, .. } => OmxError::BridgeTimeout(op),
            other => OmxError::Hardware(other.to_string()),
        }
    }
}
