//! The bridge seam between the component and its backend
//!
//! Control calls are synchronous: they return once the backend acknowledged
//! the opcode (or the deadline passed). Buffer completion is asynchronous and
//! arrives through the [`BridgeNotifier`] handed over at bind time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use omx_core::{BufferHeader, Direction};

use crate::control::ControlOp;
use crate::error::{BridgeError, BridgeResult};

/// Everything the backend is told when it is bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSetup {
    /// PCM bytes consumed per encoded frame
    pub input_frame_size: usize,
    /// Encoded bytes produced per frame
    pub output_frame_size: usize,
    /// Omit the frame-type header (MIME storage format)
    pub mime_mode: bool,
    /// Capture routed by the audio manager rather than client buffers
    pub streaming: bool,
    pub stream_id: u32,
    /// Deadline for each Control() acknowledgement
    pub control_timeout: Duration,
}

/// Asynchronous notifications from the backend
#[derive(Debug)]
pub enum BridgeEvent {
    /// A queued buffer is handed back; direction is the header's port
    BufferDone(BufferHeader),
    Started,
    Stopped,
    Paused,
    /// Every buffer of this direction has been returned after a flush
    FlushComplete(Direction),
    /// The backend finished the stream on its own (streaming mode)
    PlayCompleted,
    Error(String),
}

impl BridgeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::BufferDone(_) => "BufferDone",
            BridgeEvent::Started => "Started",
            BridgeEvent::Stopped => "Stopped",
            BridgeEvent::Paused => "Paused",
            BridgeEvent::FlushComplete(_) => "FlushComplete",
            BridgeEvent::PlayCompleted => "PlayCompleted",
            BridgeEvent::Error(_) => "Error",
        }
    }
}

/// Callback context given to the backend at bind time
#[derive(Clone)]
pub struct BridgeNotifier {
    sink: Arc<dyn Fn(BridgeEvent) + Send + Sync>,
}

impl BridgeNotifier {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Forward events into a channel; sends after the receiver is gone are dropped
    pub fn from_sender(tx: Sender<BridgeEvent>) -> Self {
        Self::new(move |event| {
            if let Err(e) = tx.send(event) {
                log::debug!("Bridge event dropped, receiver gone: {}", e.0.name());
            }
        })
    }

    pub fn notify(&self, event: BridgeEvent) {
        (self.sink)(event);
    }
}

impl fmt::Debug for BridgeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeNotifier").finish_non_exhaustive()
    }
}

/// Backend abstraction; the dispatch loop is its only caller
pub trait Bridge: Send {
    /// Bind the backend and register the callback context
    fn bind(&mut self, notifier: BridgeNotifier, setup: &BridgeSetup) -> BridgeResult<()>;

    /// Drop the callback context; no events are delivered afterwards
    fn unbind(&mut self);

    fn is_bound(&self) -> bool;

    /// Issue an opcode and block until it is acknowledged
    fn control(&mut self, op: ControlOp) -> BridgeResult<()>;

    /// Hand a buffer to the backend. On failure the header is given back.
    fn queue_buffer(&mut self, header: BufferHeader) -> Result<(), (BridgeError, BufferHeader)>;

    fn name(&self) -> &str {
        "bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_forwards_to_channel() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let notifier = BridgeNotifier::from_sender(tx);
        notifier.notify(BridgeEvent::Started);
        notifier.clone().notify(BridgeEvent::FlushComplete(Direction::Output));
        assert!(matches!(rx.try_recv(), Ok(BridgeEvent::Started)));
        assert!(matches!(
            rx.try_recv(),
            Ok(BridgeEvent::FlushComplete(Direction::Output))
        ));
    }

    #[test]
    fn test_notifier_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        BridgeNotifier::from_sender(tx).notify(BridgeEvent::Stopped);
    }
}
