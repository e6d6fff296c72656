//! Client-facing submission channels
//!
//! Commands and buffer hand-offs share one bounded MPSC queue of [`Work`]
//! items, so the dispatch loop sees them in exactly the order they were
//! submitted. A full queue blocks the submitting thread.
//!
//! Callbacks run on the dispatch thread. Work they submit goes to an
//! unbounded re-entry lane instead, which the loop drains after delivering
//! the callbacks, so the loop never blocks on its own queue.

use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, SendError, Sender, TryRecvError, bounded, unbounded};

use omx_core::{BufferHeader, Command, Direction, OmxError, OmxResult};

use crate::resource::ResourceNotice;

/// Ledger change made on a client thread that the loop must re-evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerNote {
    Registered {
        port: Direction,
        /// This registration made the port populated
        populated: bool,
    },
    Released {
        port: Direction,
    },
}

/// One unit of work for the dispatch loop
#[derive(Debug)]
pub(crate) enum Work {
    Command(Command),
    Buffer(BufferHeader),
    Ledger(LedgerNote),
    Resource(ResourceNotice),
    Shutdown,
}

/// Producer side of the work queue
#[derive(Clone)]
pub(crate) struct WorkSender {
    queue: Sender<Work>,
    reentry: Sender<Work>,
    loop_thread: Arc<OnceLock<ThreadId>>,
}

impl WorkSender {
    pub fn send(&self, work: Work) -> Result<(), SendError<Work>> {
        if self.on_loop_thread() {
            self.reentry.send(work)
        } else {
            self.queue.send(work)
        }
    }

    /// True when called from inside a callback
    pub fn on_loop_thread(&self) -> bool {
        self.loop_thread.get() == Some(&thread::current().id())
    }
}

/// Consumer side, owned by the dispatch loop
pub(crate) struct WorkReceiver {
    pub queue: Receiver<Work>,
    reentry: Receiver<Work>,
    loop_thread: Arc<OnceLock<ThreadId>>,
}

impl WorkReceiver {
    /// Mark the calling thread as the dispatch thread
    pub fn claim_current_thread(&self) {
        if self.loop_thread.set(thread::current().id()).is_err() {
            log::warn!("Work queue already claimed by another thread");
        }
    }

    /// Next item submitted from a callback, if any
    pub fn next_reentrant(&self) -> Option<Work> {
        match self.reentry.try_recv() {
            Ok(work) => Some(work),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Create the shared work queue and its re-entry lane
pub(crate) fn work_channel(capacity: usize) -> (WorkSender, WorkReceiver) {
    let (queue_tx, queue_rx) = bounded(capacity.max(1));
    let (reentry_tx, reentry_rx) = unbounded();
    let loop_thread = Arc::new(OnceLock::new());
    (
        WorkSender {
            queue: queue_tx,
            reentry: reentry_tx,
            loop_thread: Arc::clone(&loop_thread),
        },
        WorkReceiver {
            queue: queue_rx,
            reentry: reentry_rx,
            loop_thread,
        },
    )
}

/// Submission point for commands
#[derive(Clone)]
pub(crate) struct CommandChannel {
    tx: WorkSender,
}

impl CommandChannel {
    pub fn new(tx: WorkSender) -> Self {
        Self { tx }
    }

    pub fn submit(&self, command: Command) -> OmxResult<()> {
        self.tx
            .send(Work::Command(command))
            .map_err(|_| OmxError::InvalidState)
    }

    pub fn notify_resources(&self, notice: ResourceNotice) -> OmxResult<()> {
        self.tx
            .send(Work::Resource(notice))
            .map_err(|_| OmxError::InvalidState)
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(Work::Shutdown).is_ok()
    }

    pub fn on_loop_thread(&self) -> bool {
        self.tx.on_loop_thread()
    }
}

/// Submission point for buffer hand-offs and ledger notes
#[derive(Clone)]
pub(crate) struct DataChannel {
    tx: WorkSender,
}

impl DataChannel {
    pub fn new(tx: WorkSender) -> Self {
        Self { tx }
    }

    /// Hand a buffer to the loop; if the loop is gone the header comes back
    pub fn hand_off(&self, header: BufferHeader) -> Result<(), BufferHeader> {
        match self.tx.send(Work::Buffer(header)) {
            Ok(()) => Ok(()),
            Err(err) => match err.into_inner() {
                Work::Buffer(header) => Err(header),
                _ => Ok(()),
            },
        }
    }

    pub fn note(&self, note: LedgerNote) {
        if self.tx.send(Work::Ledger(note)).is_err() {
            log::debug!("Ledger note dropped, dispatch loop gone: {note:?}");
        }
    }
}
