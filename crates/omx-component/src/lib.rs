//! omx-component: OMX IL audio encoder component runtime
//!
//! # Architecture
//!
//! ```text
//!  client threads                       dispatch thread ("omx-dispatch")
//!  ──────────────                       ────────────────────────────────
//!  send_command ──┐
//!  empty/fill ────┼─► work queue ─────► DispatchLoop ── control/queue ──► Bridge
//!  alloc/free ────┘   (bounded)          │    ▲                           │
//!        │                               │    └──── bridge events ◄───────┘
//!        └── Mutex<ComponentCore> ◄──────┘          (unbounded)
//!                                        │
//!                                        └─► Outbox ─► ClientCallbacks
//! ```
//!
//! Only the dispatch loop commits a new [`ComponentState`](omx_core::ComponentState).
//! Buffer headers move by value; each port's ledger records whether the
//! client, the component or the bridge currently holds a buffer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crossbeam_channel::unbounded;
//! use omx_bridge::SimulatedDsp;
//! use omx_component::{ChannelCallbacks, EncoderComponent};
//! use omx_core::{Command, ComponentConfig, ComponentState, INPUT_PORT, OUTPUT_PORT};
//!
//! let (tx, rx) = unbounded();
//! let component = EncoderComponent::init(
//!     ComponentConfig::application(),
//!     Box::new(SimulatedDsp::default()),
//!     Arc::new(ChannelCallbacks::new(tx)),
//! )?;
//! component.send_command(Command::StateSet(ComponentState::Idle))?;
//! let input = component.allocate_buffer(INPUT_PORT, 160)?;
//! let output = component.allocate_buffer(OUTPUT_PORT, 12)?;
//! // wait for CmdComplete(StateSet, Idle) on rx, then go to Executing
//! ```

mod allocator;
mod callbacks;
mod channel;
mod component;
mod dispatch;
mod ledger;
mod pending;
mod port;
mod resource;
mod shared;
mod strategy;
mod stream;
mod transition;

pub use allocator::{BufferAllocator, HeapAllocator};
pub use callbacks::{ChannelCallbacks, ClientCallbacks, ClientMessage};
pub use component::{ComponentBuilder, ComponentVersion, EncoderComponent, Rejected};
pub use dispatch::DispatchSnapshot;
pub use resource::{ENCODER_CPU_LOAD, ResourceManager, ResourceNotice};
