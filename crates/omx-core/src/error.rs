//! Error types for the OMX component runtime

use thiserror::Error;

/// Component error, one variant per OMX IL error code the runtime can raise
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OmxError {
    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("Undefined error: {0}")]
    Undefined(String),

    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("Not implemented")]
    NotImplemented,

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Invalid state")]
    InvalidState,

    #[error("No more indices")]
    NoMore,

    #[error("Version mismatch")]
    VersionMismatch,

    #[error("Bridge timed out acknowledging {0}")]
    BridgeTimeout(String),

    #[error("Same state")]
    SameState,

    #[error("Resources preempted")]
    ResourcesPreempted,

    #[error("Port unresponsive during allocation")]
    PortUnresponsiveDuringAllocation,

    #[error("Incorrect state transition")]
    IncorrectStateTransition,

    #[error("Incorrect state operation")]
    IncorrectStateOperation,

    #[error("Unsupported index")]
    UnsupportedIndex,

    #[error("Bad port index: {0}")]
    BadPortIndex(u32),

    #[error("Port unpopulated")]
    PortUnpopulated,
}

impl OmxError {
    /// Numeric OMX IL error code (`OMX_ERRORTYPE`)
    pub fn code(&self) -> u32 {
        match self {
            OmxError::InsufficientResources(_) => 0x8000_1000,
            OmxError::Undefined(_) => 0x8000_1001,
            OmxError::BadParameter(_) => 0x8000_1005,
            OmxError::NotImplemented => 0x8000_1006,
            OmxError::Hardware(_) => 0x8000_1009,
            OmxError::InvalidState => 0x8000_100A,
            OmxError::NoMore => 0x8000_100E,
            OmxError::VersionMismatch => 0x8000_100F,
            OmxError::BridgeTimeout(_) => 0x8000_1011,
            OmxError::SameState => 0x8000_1012,
            OmxError::ResourcesPreempted => 0x8000_1013,
            OmxError::PortUnresponsiveDuringAllocation => 0x8000_1014,
            OmxError::IncorrectStateTransition => 0x8000_1017,
            OmxError::IncorrectStateOperation => 0x8000_1018,
            OmxError::UnsupportedIndex => 0x8000_101A,
            OmxError::BadPortIndex(_) => 0x8000_101B,
            OmxError::PortUnpopulated => 0x8000_101C,
        }
    }

    /// Shorthand for `BadParameter`
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        OmxError::BadParameter(msg.into())
    }

    /// Shorthand for `Hardware`
    pub fn hardware(msg: impl Into<String>) -> Self {
        OmxError::Hardware(msg.into())
    }

    /// Errors after which the component can no longer operate
    pub fn is_fatal(&self) -> bool {
        matches!(self, OmxError::BridgeTimeout(_) | OmxError::InvalidState)
    }
}

/// Result type alias
pub type OmxResult<T> = Result<T, OmxError>;
