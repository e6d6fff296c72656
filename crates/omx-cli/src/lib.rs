//! omx-cli: file encoding on top of the encoder component
//!
//! Drives the full IL sequence (Loaded → Idle → Executing → end of stream →
//! Idle → Loaded) against the simulated DSP, the same way an IL client would.

mod encode;
mod pcm;
mod session;

pub use encode::{EncodeSummary, encode_file, encode_pcm};
pub use pcm::load_pcm;
