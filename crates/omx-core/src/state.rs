//! Component lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OmxError, OmxResult};

/// OMX IL component state (`OMX_STATETYPE`)
///
/// ```text
///            ┌──────────── WaitForResources ◄──┐
///            ▼                                 │
///  Init ─► Loaded ◄────────► Idle ◄────► Executing
///                              ▲            ▲
///                              └──► Pause ◄─┘
///
///  any ─► Invalid (only teardown accepted afterwards)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ComponentState {
    Invalid = 0,
    Loaded = 1,
    Idle = 2,
    Executing = 3,
    Pause = 4,
    WaitForResources = 5,
}

impl ComponentState {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn from_raw(raw: u32) -> OmxResult<Self> {
        match raw {
            0 => Ok(ComponentState::Invalid),
            1 => Ok(ComponentState::Loaded),
            2 => Ok(ComponentState::Idle),
            3 => Ok(ComponentState::Executing),
            4 => Ok(ComponentState::Pause),
            5 => Ok(ComponentState::WaitForResources),
            other => Err(OmxError::bad_parameter(format!("unknown state {other}"))),
        }
    }

    /// States in which EmptyThisBuffer/FillThisBuffer are accepted
    pub fn accepts_buffers(self) -> bool {
        matches!(
            self,
            ComponentState::Idle | ComponentState::Executing | ComponentState::Pause
        )
    }

    /// States in which the bridge is bound
    pub fn has_resources(self) -> bool {
        self.accepts_buffers()
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        ComponentState::Loaded
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentState::Invalid => "Invalid",
            ComponentState::Loaded => "Loaded",
            ComponentState::Idle => "Idle",
            ComponentState::Executing => "Executing",
            ComponentState::Pause => "Pause",
            ComponentState::WaitForResources => "WaitForResources",
        };
        f.write_str(name)
    }
}
