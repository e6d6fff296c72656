//! Commands submitted through SendCommand

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::MarkData;
use crate::error::{OmxError, OmxResult};
use crate::port::{Direction, PortTarget};
use crate::state::ComponentState;

/// `OMX_COMMANDTYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CommandKind {
    StateSet = 0,
    Flush = 1,
    PortDisable = 2,
    PortEnable = 3,
    MarkBuffer = 4,
}

/// A decoded command with its parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StateSet(ComponentState),
    Flush(PortTarget),
    PortDisable(PortTarget),
    PortEnable(PortTarget),
    MarkBuffer { port: Direction, mark: MarkData },
}

impl Command {
    /// Decode the raw `(kind, nParam, pCmdData)` triple
    pub fn from_raw(kind: CommandKind, param: u32, mark: Option<MarkData>) -> OmxResult<Self> {
        match kind {
            CommandKind::StateSet => ComponentState::from_raw(param).map(Command::StateSet),
            CommandKind::Flush => PortTarget::from_raw(param).map(Command::Flush),
            CommandKind::PortDisable => PortTarget::from_raw(param).map(Command::PortDisable),
            CommandKind::PortEnable => PortTarget::from_raw(param).map(Command::PortEnable),
            CommandKind::MarkBuffer => {
                let port = Direction::from_index(param)?;
                let mark = mark.ok_or_else(|| OmxError::bad_parameter("MarkBuffer without mark"))?;
                Ok(Command::MarkBuffer { port, mark })
            }
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StateSet(_) => CommandKind::StateSet,
            Command::Flush(_) => CommandKind::Flush,
            Command::PortDisable(_) => CommandKind::PortDisable,
            Command::PortEnable(_) => CommandKind::PortEnable,
            Command::MarkBuffer { .. } => CommandKind::MarkBuffer,
        }
    }

    /// Raw `nParam`
    pub fn param(&self) -> u32 {
        match self {
            Command::StateSet(state) => state.as_raw(),
            Command::Flush(target) | Command::PortDisable(target) | Command::PortEnable(target) => {
                target.as_raw()
            }
            Command::MarkBuffer { port, .. } => port.index(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StateSet(state) => write!(f, "StateSet({state})"),
            Command::Flush(target) => write!(f, "Flush({target:?})"),
            Command::PortDisable(target) => write!(f, "PortDisable({target:?})"),
            Command::PortEnable(target) => write!(f, "PortEnable({target:?})"),
            Command::MarkBuffer { port, mark } => write!(f, "MarkBuffer({port}, {})", mark.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ALL_PORTS;

    #[test]
    fn test_decode_state_set() {
        let cmd = Command::from_raw(CommandKind::StateSet, 2, None).unwrap();
        assert_eq!(cmd, Command::StateSet(ComponentState::Idle));
        assert_eq!(cmd.param(), 2);
    }

    #[test]
    fn test_decode_rejects_bad_ports() {
        assert_eq!(
            Command::from_raw(CommandKind::Flush, 5, None),
            Err(OmxError::BadPortIndex(5))
        );
        assert_eq!(
            Command::from_raw(CommandKind::PortEnable, ALL_PORTS, None).unwrap(),
            Command::PortEnable(PortTarget::All)
        );
        assert!(Command::from_raw(CommandKind::MarkBuffer, 0, None).is_err());
    }
}
