//! Port addressing

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OmxError, OmxResult};

/// Raw index of the PCM input port
pub const INPUT_PORT: u32 = 0;
/// Raw index of the encoded output port
pub const OUTPUT_PORT: u32 = 1;
/// Raw `OMX_ALL`, addressing both ports in one command
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;
/// Number of ports on the component
pub const NUM_PORTS: usize = 2;

/// Port direction, which for this component also identifies the port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Both ports in command-completion order
    pub const BOTH: [Direction; NUM_PORTS] = [Direction::Input, Direction::Output];

    #[inline]
    pub fn index(self) -> u32 {
        match self {
            Direction::Input => INPUT_PORT,
            Direction::Output => OUTPUT_PORT,
        }
    }

    /// Slot in per-port arrays
    #[inline]
    pub fn slot(self) -> usize {
        self.index() as usize
    }

    pub fn from_index(index: u32) -> OmxResult<Self> {
        match index {
            INPUT_PORT => Ok(Direction::Input),
            OUTPUT_PORT => Ok(Direction::Output),
            other => Err(OmxError::BadPortIndex(other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input({INPUT_PORT})"),
            Direction::Output => write!(f, "output({OUTPUT_PORT})"),
        }
    }
}

/// Port parameter of Flush/PortDisable/PortEnable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortTarget {
    One(Direction),
    All,
}

impl PortTarget {
    pub fn from_raw(raw: u32) -> OmxResult<Self> {
        if raw == ALL_PORTS {
            Ok(PortTarget::All)
        } else {
            Direction::from_index(raw).map(PortTarget::One)
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            PortTarget::One(dir) => dir.index(),
            PortTarget::All => ALL_PORTS,
        }
    }

    /// Addressed ports, input first
    pub fn ports(self) -> Vec<Direction> {
        match self {
            PortTarget::One(dir) => vec![dir],
            PortTarget::All => Direction::BOTH.to_vec(),
        }
    }
}

impl From<Direction> for PortTarget {
    fn from(dir: Direction) -> Self {
        PortTarget::One(dir)
    }
}
