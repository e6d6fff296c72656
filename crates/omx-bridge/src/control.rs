//! Control opcodes

use std::fmt;

use serde::{Deserialize, Serialize};

use omx_core::{Direction, G729Variant};

/// Algorithm parameters pushed before Start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgParams {
    /// Voice activity detection / discontinuous transmission
    pub dtx: bool,
    pub variant: G729Variant,
}

/// Stream-level control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamCommand {
    /// Return every buffer of this direction held by the backend
    Flush(Direction),
    /// Streaming-mode codec setup sent to the audio manager path
    CodecParams {
        stream_id: u32,
        sample_rate: u32,
        channels: u32,
    },
}

/// Synchronous backend control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlOp {
    /// First opcode after bind: load the codec on the backend
    Init,
    Start,
    Stop,
    Pause,
    Destroy,
    AlgControl(AlgParams),
    StreamControl(StreamCommand),
}

/// Opcode without payload, for logging and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    Init,
    Start,
    Stop,
    Pause,
    Destroy,
    AlgControl,
    StreamControl,
}

impl ControlOp {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlOp::Init => ControlKind::Init,
            ControlOp::Start => ControlKind::Start,
            ControlOp::Stop => ControlKind::Stop,
            ControlOp::Pause => ControlKind::Pause,
            ControlOp::Destroy => ControlKind::Destroy,
            ControlOp::AlgControl(_) => ControlKind::AlgControl,
            ControlOp::StreamControl(_) => ControlKind::StreamControl,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOp::StreamControl(StreamCommand::Flush(dir)) => write!(f, "Flush({dir})"),
            other => write!(f, "{}", other.kind()),
        }
    }
}
