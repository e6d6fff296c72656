//! State transition table and outcomes
//!
//! Every StateSet resolves to exactly one client-visible report. Handlers
//! return a [`TransitionOutcome`]: either the result is known now, or the
//! transition waits for a condition that a later unit of work satisfies.

use omx_core::{ComponentState, OmxError, OmxResult};

/// A legal transition between two states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Loaded or WaitForResources to Idle: acquire, bind, await population
    Acquire,
    /// Idle or WaitForResources to Loaded: await drain, release the bridge
    Release,
    /// Idle to Executing
    Start,
    /// Pause to Executing
    Resume,
    /// Executing or Pause to Idle
    Stop,
    /// Executing to Pause
    Pause,
    /// Idle to Pause
    PauseFromIdle,
    /// Loaded or Idle to WaitForResources
    WaitForResources,
    /// Any state to Invalid
    Invalidate,
}

/// Look up the transition from `from` to `to`
pub fn plan(from: ComponentState, to: ComponentState) -> OmxResult<Transition> {
    use ComponentState::*;

    if from == to {
        return Err(OmxError::SameState);
    }
    match (from, to) {
        (_, Invalid) => Ok(Transition::Invalidate),
        (Invalid, _) => Err(OmxError::InvalidState),
        (Loaded | WaitForResources, Idle) => Ok(Transition::Acquire),
        (Idle | WaitForResources, Loaded) => Ok(Transition::Release),
        (Idle, Executing) => Ok(Transition::Start),
        (Pause, Executing) => Ok(Transition::Resume),
        (Executing | Pause, Idle) => Ok(Transition::Stop),
        (Executing, Pause) => Ok(Transition::Pause),
        (Idle, Pause) => Ok(Transition::PauseFromIdle),
        (Loaded | Idle, WaitForResources) => Ok(Transition::WaitForResources),
        _ => Err(OmxError::IncorrectStateTransition),
    }
}

/// Condition a deferred transition is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Awaiting {
    /// Every enabled port populated
    Population,
    /// Zero registered buffers on both ports
    Drain,
    /// The bridge reported `Stopped`
    BridgeStopped,
    /// The bridge reported `Paused`
    BridgePaused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Finished; the committed state or the error to report
    Immediate(OmxResult<ComponentState>),
    Deferred(Awaiting),
}

/// Who asked for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Client,
    /// Resource manager took the DSP away; reported as ResourcesPreempted
    Preemption,
}

/// A deferred transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub target: ComponentState,
    pub awaiting: Awaiting,
    pub origin: Origin,
}
