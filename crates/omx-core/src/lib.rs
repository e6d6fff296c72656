//! omx-core: Shared vocabulary for the OMX audio encoder component
//!
//! States, commands, events, buffer headers, parameter structures and the
//! component configuration. The runtime lives in `omx-component`; the
//! hardware abstraction in `omx-bridge`.

mod buffer;
mod command;
mod config;
mod error;
mod event;
mod memory;
mod params;
mod port;
mod state;
mod version;

pub use buffer::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use memory::*;
pub use params::*;
pub use port::*;
pub use state::*;
pub use version::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
