//! omx-bridge: Backend abstraction for the OMX audio encoder
//!
//! # Architecture
//!
//! ```text
//!  dispatch loop ── control(op) ──────────► backend worker
//!       ▲          (blocks for ack,             │
//!       │           bounded by deadline)        │
//!       │                                       │
//!       └──── BridgeNotifier ◄── BufferDone / Stopped / Paused / FlushComplete
//! ```
//!
//! The component never shares state with the backend: completions travel as
//! [`BridgeEvent`] messages through the notifier registered at bind time.

mod adapter;
mod control;
mod error;
mod packer;
mod sim;

pub use adapter::*;
pub use control::*;
pub use error::*;
pub use packer::*;
pub use sim::*;
