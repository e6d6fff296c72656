//! Client callbacks
//!
//! Callbacks run on the dispatch thread, after the component lock has been
//! released, so a client may call back into the component from inside them.

use crossbeam_channel::Sender;

use omx_core::{BufferHeader, Direction, Event};

/// `OMX_CALLBACKTYPE`
pub trait ClientCallbacks: Send + Sync {
    fn on_event(&self, event: Event);

    /// An input buffer is back with the client
    fn empty_buffer_done(&self, header: BufferHeader);

    /// An output buffer is back with the client
    fn fill_buffer_done(&self, header: BufferHeader);
}

/// Everything a [`ChannelCallbacks`] forwards
#[derive(Debug)]
pub enum ClientMessage {
    Event(Event),
    EmptyBufferDone(BufferHeader),
    FillBufferDone(BufferHeader),
}

/// Callbacks that forward into a channel for a client thread to consume
pub struct ChannelCallbacks {
    tx: Sender<ClientMessage>,
}

impl ChannelCallbacks {
    pub fn new(tx: Sender<ClientMessage>) -> Self {
        Self { tx }
    }

    fn forward(&self, msg: ClientMessage) {
        if self.tx.send(msg).is_err() {
            log::warn!("Client channel closed, callback dropped");
        }
    }
}

impl ClientCallbacks for ChannelCallbacks {
    fn on_event(&self, event: Event) {
        self.forward(ClientMessage::Event(event));
    }

    fn empty_buffer_done(&self, header: BufferHeader) {
        self.forward(ClientMessage::EmptyBufferDone(header));
    }

    fn fill_buffer_done(&self, header: BufferHeader) {
        self.forward(ClientMessage::FillBufferDone(header));
    }
}

/// Callback queued while the component lock is held
#[derive(Debug)]
pub(crate) enum Notification {
    Event(Event),
    BufferDone(BufferHeader),
}

/// Notifications collected during one unit of work
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    items: Vec<Notification>,
}

impl Outbox {
    pub fn event(&mut self, event: Event) {
        self.items.push(Notification::Event(event));
    }

    pub fn buffer_done(&mut self, header: BufferHeader) {
        self.items.push(Notification::BufferDone(header));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Invoke the callbacks in the order the notifications were queued
    pub fn deliver(self, callbacks: &dyn ClientCallbacks) {
        for item in self.items {
            match item {
                Notification::Event(event) => callbacks.on_event(event),
                Notification::BufferDone(header) => match header.port() {
                    Direction::Input => callbacks.empty_buffer_done(header),
                    Direction::Output => callbacks.fill_buffer_done(header),
                },
            }
        }
    }
}
