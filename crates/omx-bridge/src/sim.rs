//! Simulated DSP backend
//!
//! Runs the encoder "firmware" on its own worker thread, the way the real
//! bridge delivers completions from a driver callback thread. Control opcodes
//! are acknowledged over a rendezvous channel with a deadline; buffers are
//! handed back through the [`BridgeNotifier`].
//!
//! Tests drive it through a [`SimHandle`]: hold buffers instead of completing
//! them, inject control failures, or swallow an acknowledgement.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendError, Sender, bounded, unbounded};
use parking_lot::Mutex;

use omx_core::{BufferFlags, BufferHeader, Direction};

use crate::adapter::{Bridge, BridgeEvent, BridgeNotifier, BridgeSetup};
use crate::control::{ControlKind, ControlOp, StreamCommand};
use crate::error::{BridgeError, BridgeResult};
use crate::packer::FramePacker;

// ============ Configuration ============

/// Simulated backend settings
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Complete buffers as soon as possible; when false they are held until
    /// [`SimHandle::release`] or a flush/stop returns them
    pub auto_complete: bool,
    /// Artificial per-buffer processing time
    pub processing_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            auto_complete: true,
            processing_delay: Duration::ZERO,
        }
    }
}

impl SimConfig {
    /// Hold every queued buffer until released
    pub fn manual() -> Self {
        Self {
            auto_complete: false,
            ..Self::default()
        }
    }
}

// ============ Shared State ============

enum DspMessage {
    Control {
        op: ControlOp,
        ack: Sender<BridgeResult<()>>,
    },
    Queue(BufferHeader),
    Process,
    PlayCompleted,
    Shutdown,
}

#[derive(Default)]
struct SimShared {
    auto_complete: AtomicBool,
    fail_next: Mutex<Option<ControlKind>>,
    drop_ack: Mutex<Option<ControlKind>>,
    ops: Mutex<Vec<ControlOp>>,
    held_inputs: AtomicUsize,
    held_outputs: AtomicUsize,
    worker_tx: Mutex<Option<Sender<DspMessage>>>,
}

impl SimShared {
    fn held_counter(&self, dir: Direction) -> &AtomicUsize {
        match dir {
            Direction::Input => &self.held_inputs,
            Direction::Output => &self.held_outputs,
        }
    }

    fn take_if(slot: &Mutex<Option<ControlKind>>, kind: ControlKind) -> bool {
        let mut slot = slot.lock();
        if *slot == Some(kind) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn post(&self, msg: DspMessage) {
        if let Some(tx) = self.worker_tx.lock().as_ref() {
            let _ = tx.send(msg);
        }
    }
}

/// Test and diagnostics handle onto a [`SimulatedDsp`]
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<SimShared>,
}

impl SimHandle {
    /// Reject the next control opcode of this kind
    pub fn fail_next(&self, kind: ControlKind) {
        *self.shared.fail_next.lock() = Some(kind);
    }

    /// Never acknowledge the next control opcode of this kind
    pub fn drop_ack(&self, kind: ControlKind) {
        *self.shared.drop_ack.lock() = Some(kind);
    }

    /// Every control opcode received so far, in order
    pub fn ops(&self) -> Vec<ControlOp> {
        self.shared.ops.lock().clone()
    }

    pub fn op_kinds(&self) -> Vec<ControlKind> {
        self.shared.ops.lock().iter().map(ControlOp::kind).collect()
    }

    /// Buffers of this direction currently held by the backend
    pub fn held(&self, dir: Direction) -> usize {
        self.shared.held_counter(dir).load(Ordering::Acquire)
    }

    pub fn set_auto_complete(&self, enabled: bool) {
        self.shared.auto_complete.store(enabled, Ordering::Release);
        if enabled {
            self.shared.post(DspMessage::Process);
        }
    }

    /// Process held buffers once, regardless of auto completion
    pub fn release(&self) {
        self.shared.post(DspMessage::Process);
    }

    /// Report end of playback, as the streaming path does when capture ends
    pub fn finish_stream(&self) {
        self.shared.post(DspMessage::PlayCompleted);
    }
}

// ============ Backend ============

/// In-process stand-in for the DSP encoder
pub struct SimulatedDsp {
    config: SimConfig,
    shared: Arc<SimShared>,
    tx: Option<Sender<DspMessage>>,
    worker: Option<JoinHandle<()>>,
    control_timeout: Duration,
}

impl SimulatedDsp {
    pub fn new(config: SimConfig) -> Self {
        let shared = Arc::new(SimShared::default());
        shared
            .auto_complete
            .store(config.auto_complete, Ordering::Release);
        Self {
            config,
            shared,
            tx: None,
            worker: None,
            control_timeout: Duration::from_secs(1),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn shutdown_worker(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(DspMessage::Shutdown);
        }
        *self.shared.worker_tx.lock() = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("DSP worker panicked");
            }
        }
    }
}

impl Default for SimulatedDsp {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Bridge for SimulatedDsp {
    fn bind(&mut self, notifier: BridgeNotifier, setup: &BridgeSetup) -> BridgeResult<()> {
        if self.tx.is_some() {
            return Err(BridgeError::AlreadyBound);
        }

        let (tx, rx) = unbounded();
        let mut packer = FramePacker::new(setup.input_frame_size, setup.mime_mode);
        packer.set_dtx(false);
        let worker = DspWorker {
            notifier,
            packer,
            shared: Arc::clone(&self.shared),
            delay: self.config.processing_delay,
            running: false,
            paused: false,
            eos: false,
            pcm: Vec::new(),
            inputs: VecDeque::new(),
            outputs: VecDeque::new(),
            swallowed: Vec::new(),
        };

        let handle = thread::Builder::new()
            .name("omx-dsp".into())
            .spawn(move || worker.run(rx))
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;

        self.control_timeout = setup.control_timeout;
        *self.shared.worker_tx.lock() = Some(tx.clone());
        self.tx = Some(tx);
        self.worker = Some(handle);
        log::info!(
            "Simulated DSP bound (frame {}→{} bytes, streaming: {})",
            setup.input_frame_size,
            setup.output_frame_size,
            setup.streaming
        );
        Ok(())
    }

    fn unbind(&mut self) {
        self.shutdown_worker();
    }

    fn is_bound(&self) -> bool {
        self.tx.is_some()
    }

    fn control(&mut self, op: ControlOp) -> BridgeResult<()> {
        let tx = self.tx.as_ref().ok_or(BridgeError::NotBound)?;

        let (ack_tx, ack_rx) = bounded(1);
        tx.send(DspMessage::Control { op, ack: ack_tx })
            .map_err(|_| BridgeError::Disconnected)?;

        let result = match ack_rx.recv_timeout(self.control_timeout) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(BridgeError::Timeout {
                op: op.to_string(),
                after: self.control_timeout,
            }),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(BridgeError::Disconnected)
            }
        };

        if op == ControlOp::Destroy && result.is_ok() {
            self.shutdown_worker();
        }
        result
    }

    fn queue_buffer(&mut self, header: BufferHeader) -> Result<(), (BridgeError, BufferHeader)> {
        let Some(tx) = self.tx.as_ref() else {
            return Err((BridgeError::NotBound, header));
        };
        self.shared
            .held_counter(header.port())
            .fetch_add(1, Ordering::AcqRel);
        if let Err(SendError(msg)) = tx.send(DspMessage::Queue(header)) {
            if let DspMessage::Queue(header) = msg {
                self.shared
                    .held_counter(header.port())
                    .fetch_sub(1, Ordering::AcqRel);
                return Err((BridgeError::Disconnected, header));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated-dsp"
    }
}

impl Drop for SimulatedDsp {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

// ============ Worker ============

struct DspWorker {
    notifier: BridgeNotifier,
    packer: FramePacker,
    shared: Arc<SimShared>,
    delay: Duration,
    running: bool,
    paused: bool,
    /// End of stream seen on input, not yet signalled on an output
    eos: bool,
    pcm: Vec<u8>,
    inputs: VecDeque<BufferHeader>,
    outputs: VecDeque<BufferHeader>,
    /// Acks held open so the caller times out instead of seeing a disconnect
    swallowed: Vec<Sender<BridgeResult<()>>>,
}

impl DspWorker {
    fn run(mut self, rx: Receiver<DspMessage>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                DspMessage::Control { op, ack } => {
                    if !self.handle_control(op, ack) {
                        break;
                    }
                }
                DspMessage::Queue(header) => {
                    match header.port() {
                        Direction::Input => self.inputs.push_back(header),
                        Direction::Output => self.outputs.push_back(header),
                    }
                    if self.shared.auto_complete.load(Ordering::Acquire) {
                        self.process();
                    }
                }
                DspMessage::Process => self.process(),
                DspMessage::PlayCompleted => self.notifier.notify(BridgeEvent::PlayCompleted),
                DspMessage::Shutdown => {
                    self.return_all();
                    break;
                }
            }
        }
        log::info!("DSP worker exiting");
    }

    /// Returns false when the worker should exit
    fn handle_control(&mut self, op: ControlOp, ack: Sender<BridgeResult<()>>) -> bool {
        self.shared.ops.lock().push(op);
        let kind = op.kind();

        if SimShared::take_if(&self.shared.drop_ack, kind) {
            log::warn!("DSP swallowing acknowledgement for {op}");
            self.swallowed.push(ack);
            return true;
        }
        if SimShared::take_if(&self.shared.fail_next, kind) {
            let _ = ack.send(Err(BridgeError::Rejected {
                op: op.to_string(),
                reason: "injected failure".into(),
            }));
            return true;
        }

        match op {
            ControlOp::Init => {
                log::debug!("DSP codec loaded");
                let _ = ack.send(Ok(()));
            }
            ControlOp::Start => {
                self.running = true;
                self.paused = false;
                let _ = ack.send(Ok(()));
                self.notifier.notify(BridgeEvent::Started);
                if self.shared.auto_complete.load(Ordering::Acquire) {
                    self.process();
                }
            }
            ControlOp::Stop => {
                self.running = false;
                self.paused = false;
                self.return_all();
                self.notifier.notify(BridgeEvent::Stopped);
                let _ = ack.send(Ok(()));
            }
            ControlOp::Pause => {
                self.paused = true;
                let _ = ack.send(Ok(()));
                self.notifier.notify(BridgeEvent::Paused);
            }
            ControlOp::Destroy => {
                self.return_all();
                let _ = ack.send(Ok(()));
                return false;
            }
            ControlOp::AlgControl(params) => {
                self.packer.set_dtx(params.dtx);
                let _ = ack.send(Ok(()));
            }
            ControlOp::StreamControl(StreamCommand::Flush(dir)) => {
                self.return_direction(dir);
                self.notifier.notify(BridgeEvent::FlushComplete(dir));
                let _ = ack.send(Ok(()));
            }
            ControlOp::StreamControl(StreamCommand::CodecParams {
                stream_id,
                sample_rate,
                channels,
            }) => {
                log::debug!(
                    "DSP stream {stream_id} configured: {sample_rate} Hz, {channels} channel(s)"
                );
                let _ = ack.send(Ok(()));
            }
        }
        true
    }

    fn process(&mut self) {
        if !self.running || self.paused {
            return;
        }

        while let Some(mut input) = self.inputs.pop_front() {
            self.pause_for_work();
            self.pcm.extend_from_slice(input.payload());
            if input.flags.contains(BufferFlags::EOS) {
                self.eos = true;
            }
            input.offset = 0;
            input.filled_len = 0;
            self.hand_back(input);
        }

        let frame_in = self.packer.input_frame_size();
        let frame_out = self.packer.output_frame_size();
        while self.pcm.len() >= frame_in || self.eos {
            let Some(mut out) = self.outputs.pop_front() else {
                break;
            };
            self.pause_for_work();

            let frames_fit = out.alloc_len() / frame_out;
            if frames_fit == 0 {
                log::warn!("Output {} too small for one frame", out.id());
            }
            let mut written = 0;
            for _ in 0..frames_fit {
                let take = if self.pcm.len() >= frame_in {
                    frame_in
                } else if self.eos && !self.pcm.is_empty() {
                    self.pcm.len()
                } else {
                    break;
                };
                let frame: Vec<u8> = self.pcm.drain(..take).collect();
                written += self.packer.pack(&frame, &mut out.data_mut()[written..]);
            }

            out.offset = 0;
            out.filled_len = written;
            if self.eos && self.pcm.is_empty() {
                out.flags.insert(BufferFlags::EOS);
                self.eos = false;
            }
            self.hand_back(out);
        }
    }

    fn pause_for_work(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn hand_back(&self, header: BufferHeader) {
        self.shared
            .held_counter(header.port())
            .fetch_sub(1, Ordering::AcqRel);
        self.notifier.notify(BridgeEvent::BufferDone(header));
    }

    fn return_direction(&mut self, dir: Direction) {
        let queue = match dir {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        };
        let drained: Vec<BufferHeader> = queue.drain(..).collect();
        for mut header in drained {
            if dir == Direction::Output {
                header.filled_len = 0;
            }
            self.hand_back(header);
        }
        if dir == Direction::Input {
            self.pcm.clear();
            self.eos = false;
        }
    }

    fn return_all(&mut self) {
        self.return_direction(Direction::Input);
        self.return_direction(Direction::Output);
    }
}
