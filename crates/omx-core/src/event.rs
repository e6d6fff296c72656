//! Events delivered to the IL client

use crate::buffer::{BufferFlags, MarkData};
use crate::command::CommandKind;
use crate::error::OmxError;
use crate::port::Direction;
use crate::state::ComponentState;

/// `OMX_EVENTTYPE` with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A command finished; `data` is the reached state or the port index
    CmdComplete { command: CommandKind, data: u32 },
    /// `data` carries the port index for port-scoped errors, 0 otherwise
    Error { error: OmxError, data: u32 },
    Mark(MarkData),
    BufferFlag { port: Direction, flags: BufferFlags },
    ResourcesAcquired,
}

impl Event {
    pub fn state_reached(state: ComponentState) -> Self {
        Event::CmdComplete {
            command: CommandKind::StateSet,
            data: state.as_raw(),
        }
    }

    pub fn port_done(command: CommandKind, port: Direction) -> Self {
        Event::CmdComplete {
            command,
            data: port.index(),
        }
    }

    pub fn error(error: OmxError) -> Self {
        Event::Error { error, data: 0 }
    }

    pub fn port_error(error: OmxError, port: Direction) -> Self {
        Event::Error {
            error,
            data: port.index(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}
