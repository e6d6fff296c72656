//! Dispatch loop
//!
//! One thread owns every state change. It waits on two sources at once:
//! the client work queue (commands, buffer hand-offs, ledger notes and
//! resource notices, in submission order) and the bridge event channel.
//! Each unit of work runs under the component lock; client callbacks are
//! collected in an [`Outbox`] and delivered after the lock is released.
//!
//! Transitions that cannot finish synchronously are parked as an
//! [`InFlight`] record. While one is parked, further commands wait in a
//! backlog and are replayed once it resolves.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select, unbounded};

use omx_bridge::{
    AlgParams, Bridge, BridgeEvent, BridgeNotifier, BridgeSetup, ControlOp, StreamCommand,
};
use omx_core::{
    BufferFlags, BufferHeader, BufferOwner, Command, CommandKind, ComponentState, Direction,
    Event, OmxError, OmxResult,
};

use crate::callbacks::{ClientCallbacks, Outbox};
use crate::channel::{LedgerNote, Work, WorkReceiver};
use crate::pending::PendingPortOp;
use crate::resource::{ENCODER_CPU_LOAD, ResourceManager, ResourceNotice};
use crate::shared::{ComponentCore, Shared};
use crate::transition::{self, Awaiting, InFlight, Origin, Transition, TransitionOutcome};

// ═══════════════════════════════════════════════════════════════════════════════
// STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lock-free counters updated by the dispatch thread
#[derive(Debug, Default)]
pub struct DispatchStats {
    commands: AtomicU64,
    buffers: AtomicU64,
    bridge_events: AtomicU64,
    deferred: AtomicU64,
    backlogged: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSnapshot {
    pub commands: u64,
    pub buffers: u64,
    pub bridge_events: u64,
    /// Transitions that had to wait for the ledger or the bridge
    pub deferred: u64,
    /// Commands held back behind an in-flight transition
    pub backlogged: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            commands: self.commands.load(Ordering::Relaxed),
            buffers: self.buffers.load(Ordering::Relaxed),
            bridge_events: self.bridge_events.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            backlogged: self.backlogged.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP
// ═══════════════════════════════════════════════════════════════════════════════

/// Work held back while a transition is in flight
#[derive(Debug)]
enum Queued {
    Command(Command),
    Preempt,
    ResourcesAcquired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub(crate) struct DispatchLoop {
    shared: Arc<Shared>,
    bridge: Box<dyn Bridge>,
    setup: BridgeSetup,
    callbacks: Arc<dyn ClientCallbacks>,
    resources: Option<Arc<dyn ResourceManager>>,
    resources_held: bool,
    /// Release owed to the manager once the component lock is dropped
    release_due: bool,
    /// Entered WaitForResources because the manager refused; retry Idle on grant
    retry_idle: bool,
    component_name: String,
    work: WorkReceiver,
    bridge_tx: Sender<BridgeEvent>,
    bridge_rx: Receiver<BridgeEvent>,
    backlog: VecDeque<Queued>,
    stats: Arc<DispatchStats>,
}

impl DispatchLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shared: Arc<Shared>,
        bridge: Box<dyn Bridge>,
        setup: BridgeSetup,
        callbacks: Arc<dyn ClientCallbacks>,
        resources: Option<Arc<dyn ResourceManager>>,
        component_name: String,
        work: WorkReceiver,
        stats: Arc<DispatchStats>,
    ) -> Self {
        let (bridge_tx, bridge_rx) = unbounded();
        Self {
            shared,
            bridge,
            setup,
            callbacks,
            resources,
            resources_held: false,
            release_due: false,
            retry_idle: false,
            component_name,
            work,
            bridge_tx,
            bridge_rx,
            backlog: VecDeque::new(),
            stats,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("omx-dispatch".into())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        self.work.claim_current_thread();
        let work_rx = self.work.queue.clone();
        let bridge_rx = self.bridge_rx.clone();
        log::info!("Dispatch loop started for {}", self.component_name);

        loop {
            let mut flow = select! {
                recv(work_rx) -> msg => match msg {
                    Ok(work) => self.handle_work(work),
                    Err(_) => Flow::Exit,
                },
                recv(bridge_rx) -> msg => {
                    if let Ok(event) = msg {
                        self.handle_bridge_event(event);
                    }
                    Flow::Continue
                }
            };
            // Work submitted from inside the callbacks just delivered
            while flow == Flow::Continue {
                let Some(work) = self.work.next_reentrant() else {
                    break;
                };
                flow = self.handle_work(work);
            }
            if flow == Flow::Exit {
                break;
            }
        }

        self.teardown();
        log::info!("Dispatch loop exiting");
    }

    /// Run `f` under the component lock, then deliver what it queued
    fn with_core<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut ComponentCore, &mut Outbox) -> R,
    ) -> R {
        let shared = Arc::clone(&self.shared);
        let mut out = Outbox::default();
        let result = {
            let mut core = shared.core.lock();
            f(self, &mut *core, &mut out)
        };
        if std::mem::take(&mut self.release_due) {
            if let Some(rm) = &self.resources {
                rm.release(&self.component_name);
            }
        }
        if !out.is_empty() {
            out.deliver(self.callbacks.as_ref());
        }
        result
    }

    fn handle_work(&mut self, work: Work) -> Flow {
        match work {
            Work::Command(command) => {
                DispatchStats::bump(&self.stats.commands);
                self.enqueue(Queued::Command(command));
            }
            Work::Buffer(header) => {
                DispatchStats::bump(&self.stats.buffers);
                self.with_core(|this, core, out| this.on_buffer(core, header, out));
            }
            Work::Ledger(note) => {
                self.with_core(|this, core, out| this.on_ledger(core, note, out));
                self.drain_backlog();
            }
            Work::Resource(ResourceNotice::Preempted) => self.enqueue(Queued::Preempt),
            Work::Resource(ResourceNotice::Acquired) => self.enqueue(Queued::ResourcesAcquired),
            Work::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn handle_bridge_event(&mut self, event: BridgeEvent) {
        DispatchStats::bump(&self.stats.bridge_events);
        log::trace!("Bridge event {}", event.name());
        self.with_core(|this, core, out| this.on_bridge_event(core, event, out));
        self.drain_backlog();
    }

    // ─── Backlog ────────────────────────────────────────────────────────────

    fn transition_pending(&self) -> bool {
        self.shared.core.lock().transition.is_some()
    }

    fn enqueue(&mut self, item: Queued) {
        if !self.backlog.is_empty() || self.transition_pending() {
            log::debug!("Holding {item:?} until the current transition completes");
            DispatchStats::bump(&self.stats.backlogged);
            self.backlog.push_back(item);
            return;
        }
        self.execute(item);
        self.drain_backlog();
    }

    fn drain_backlog(&mut self) {
        while !self.transition_pending() {
            let Some(item) = self.backlog.pop_front() else {
                break;
            };
            self.execute(item);
        }
    }

    fn execute(&mut self, item: Queued) {
        if self.acquires_on(&item) {
            self.reserve_resources();
        }
        self.with_core(|this, core, out| match item {
            Queued::Command(command) => this.on_command(core, command, out),
            Queued::Preempt => this.on_preempt(core, out),
            Queued::ResourcesAcquired => this.on_resources_acquired(core, out),
        });
    }

    /// Whether `item` will run the Loaded/WaitForResources → Idle transition
    fn acquires_on(&self, item: &Queued) -> bool {
        let state = self.shared.state();
        match item {
            Queued::Command(Command::StateSet(ComponentState::Idle)) => matches!(
                state,
                ComponentState::Loaded | ComponentState::WaitForResources
            ),
            Queued::ResourcesAcquired => state == ComponentState::WaitForResources && self.retry_idle,
            _ => false,
        }
    }

    /// Ask the resource manager for DSP load; runs without the component lock
    fn reserve_resources(&mut self) {
        if self.resources_held {
            return;
        }
        match &self.resources {
            Some(rm) if !rm.request(&self.component_name, ENCODER_CPU_LOAD) => {
                log::warn!("Resource manager refused {ENCODER_CPU_LOAD}% DSP load");
            }
            _ => self.resources_held = true,
        }
    }

    // ─── Commands ───────────────────────────────────────────────────────────

    fn on_command(&mut self, core: &mut ComponentCore, command: Command, out: &mut Outbox) {
        log::debug!("Command {command} in {}", core.state);
        if core.state == ComponentState::Invalid && !matches!(command, Command::StateSet(_)) {
            out.event(Event::error(OmxError::InvalidState));
            return;
        }

        match command {
            Command::StateSet(target) => self.on_state_set(core, target, Origin::Client, out),
            Command::Flush(target) => {
                for dir in target.ports() {
                    self.flush_port(core, dir, out);
                }
            }
            Command::PortDisable(target) => {
                for dir in target.ports() {
                    self.disable_port(core, dir, out);
                }
            }
            Command::PortEnable(target) => {
                for dir in target.ports() {
                    self.enable_port(core, dir, out);
                }
            }
            Command::MarkBuffer { port, mark } => {
                core.stream.queue_mark(mark);
                out.event(Event::port_done(CommandKind::MarkBuffer, port));
            }
        }
    }

    fn on_preempt(&mut self, core: &mut ComponentCore, out: &mut Outbox) {
        match core.state {
            ComponentState::Executing | ComponentState::Pause => {
                log::warn!("Resources preempted in {}, stopping", core.state);
                self.on_state_set(core, ComponentState::Idle, Origin::Preemption, out);
            }
            state => log::debug!("Preemption ignored in {state}"),
        }
    }

    fn on_resources_acquired(&mut self, core: &mut ComponentCore, out: &mut Outbox) {
        if core.state != ComponentState::WaitForResources {
            log::debug!("Resource grant ignored in {}", core.state);
            return;
        }
        out.event(Event::ResourcesAcquired);
        if std::mem::take(&mut self.retry_idle) {
            log::info!("Resources granted, retrying Idle");
            self.on_state_set(core, ComponentState::Idle, Origin::Client, out);
        }
    }

    // ─── State machine ──────────────────────────────────────────────────────

    fn on_state_set(
        &mut self,
        core: &mut ComponentCore,
        target: ComponentState,
        origin: Origin,
        out: &mut Outbox,
    ) {
        let from = core.state;
        let step = match transition::plan(from, target) {
            Ok(step) => step,
            Err(err) => {
                log::warn!("StateSet {from} → {target} rejected: {err}");
                out.event(Event::error(err));
                return;
            }
        };

        log::info!("Transition {from} → {target} ({step:?})");
        if origin == Origin::Client {
            self.retry_idle = false;
        }
        let outcome = match self.run_transition(core, step, out) {
            Ok(outcome) => outcome,
            Err(OmxError::InsufficientResources(reason)) if step == Transition::Acquire => {
                log::warn!("Waiting for resources: {reason}");
                core.commit(ComponentState::WaitForResources);
                self.retry_idle = true;
                out.event(Event::error(OmxError::InsufficientResources(reason)));
                return;
            }
            Err(err) => TransitionOutcome::Immediate(Err(err)),
        };
        self.settle(core, target, origin, outcome, out);
    }

    fn run_transition(
        &mut self,
        core: &mut ComponentCore,
        step: Transition,
        out: &mut Outbox,
    ) -> OmxResult<TransitionOutcome> {
        use TransitionOutcome::{Deferred, Immediate};

        match step {
            Transition::Acquire => self.acquire(core),
            Transition::Release => self.release(core),
            Transition::Start => {
                self.start_bridge(core)?;
                self.forward_all_pending(core, out);
                Ok(Immediate(Ok(ComponentState::Executing)))
            }
            Transition::Resume => {
                if core.bridge_started {
                    self.control(ControlOp::Start)?;
                } else {
                    self.start_bridge(core)?;
                }
                self.forward_all_pending(core, out);
                Ok(Immediate(Ok(ComponentState::Executing)))
            }
            Transition::Stop => {
                if core.bridge_started {
                    self.control(ControlOp::Stop)?;
                    self.return_all_pending(core, out);
                    Ok(Deferred(Awaiting::BridgeStopped))
                } else {
                    self.return_all_pending(core, out);
                    Ok(Immediate(Ok(ComponentState::Idle)))
                }
            }
            Transition::Pause => {
                self.control(ControlOp::Pause)?;
                Ok(Deferred(Awaiting::BridgePaused))
            }
            Transition::PauseFromIdle => Ok(Immediate(Ok(ComponentState::Pause))),
            Transition::WaitForResources => Ok(Immediate(Ok(ComponentState::WaitForResources))),
            Transition::Invalidate => {
                if self.bridge.is_bound() {
                    if let Err(err) = self.bridge.control(ControlOp::Destroy) {
                        log::warn!("Destroy while invalidating failed: {err}");
                    }
                }
                Ok(Immediate(Err(OmxError::InvalidState)))
            }
        }
    }

    /// Apply a transition outcome: commit and report, park, or fail
    fn settle(
        &mut self,
        core: &mut ComponentCore,
        target: ComponentState,
        origin: Origin,
        outcome: TransitionOutcome,
        out: &mut Outbox,
    ) {
        match outcome {
            TransitionOutcome::Immediate(Ok(state)) => {
                core.commit(state);
                match origin {
                    Origin::Client => out.event(Event::state_reached(state)),
                    Origin::Preemption => out.event(Event::error(OmxError::ResourcesPreempted)),
                }
            }
            TransitionOutcome::Immediate(Err(err)) => self.report_failure(core, err, out),
            TransitionOutcome::Deferred(awaiting) => {
                log::debug!("Transition to {target} waiting on {awaiting:?}");
                DispatchStats::bump(&self.stats.deferred);
                core.transition = Some(InFlight {
                    target,
                    awaiting,
                    origin,
                });
            }
        }
    }

    fn report_failure(&mut self, core: &mut ComponentCore, err: OmxError, out: &mut Outbox) {
        if err.is_fatal() {
            self.invalidate(core, err, out);
        } else {
            log::error!("Operation failed in {}: {err}", core.state);
            out.event(Event::error(err));
        }
    }

    /// Force Invalid. Pending buffers go back to the client and the bridge is
    /// released; buffers the bridge still holds come back as BufferDone.
    fn invalidate(&mut self, core: &mut ComponentCore, err: OmxError, out: &mut Outbox) {
        log::error!("Component entering Invalid: {err}");
        core.transition = None;
        core.port_ops.clear();
        core.flushing = [false, false];
        self.return_all_pending(core, out);
        if self.bridge.is_bound() {
            self.bridge.unbind();
        }
        core.bridge_started = false;
        self.release_resources();
        core.commit(ComponentState::Invalid);
        self.shared.port_enabled.notify_all();
        out.event(Event::error(err));
    }

    fn acquire(&mut self, core: &mut ComponentCore) -> OmxResult<TransitionOutcome> {
        if let Err(err) = core.strategy.check_idle(&core.path) {
            if !self.bridge.is_bound() {
                self.release_resources();
            }
            return Err(err);
        }
        if !self.resources_held {
            return Err(OmxError::InsufficientResources(
                "resource manager refused the request".into(),
            ));
        }

        if !self.bridge.is_bound() {
            let setup = BridgeSetup {
                streaming: core.path.mode.is_streaming(),
                stream_id: core.path.stream_id,
                ..self.setup.clone()
            };
            let notifier = BridgeNotifier::from_sender(self.bridge_tx.clone());
            if let Err(err) = self.bridge.bind(notifier, &setup) {
                self.release_resources();
                return Err(err.into());
            }
            log::info!("Bridge {} bound", self.bridge.name());
            if let Err(err) = self.control(ControlOp::Init) {
                self.bridge.unbind();
                self.release_resources();
                return Err(err);
            }
        }

        if core.enabled_ports_populated() {
            Ok(TransitionOutcome::Immediate(Ok(ComponentState::Idle)))
        } else {
            Ok(TransitionOutcome::Deferred(Awaiting::Population))
        }
    }

    fn release(&mut self, core: &mut ComponentCore) -> OmxResult<TransitionOutcome> {
        if core.registered_total() > 0 {
            return Ok(TransitionOutcome::Deferred(Awaiting::Drain));
        }
        self.release_bridge()?;
        Ok(TransitionOutcome::Immediate(Ok(ComponentState::Loaded)))
    }

    fn release_bridge(&mut self) -> OmxResult<()> {
        if self.bridge.is_bound() {
            self.control(ControlOp::Destroy)?;
            self.bridge.unbind();
            log::info!("Bridge {} unbound", self.bridge.name());
        }
        self.release_resources();
        Ok(())
    }

    fn release_resources(&mut self) {
        if !self.resources_held {
            return;
        }
        self.resources_held = false;
        self.release_due = true;
    }

    /// Algorithm parameters, data-path setup, then Start
    fn start_bridge(&mut self, core: &mut ComponentCore) -> OmxResult<()> {
        let alg = AlgParams {
            dtx: core.params.g729.dtx,
            variant: core.params.g729.variant,
        };
        self.control(ControlOp::AlgControl(alg))?;
        for op in core.strategy.start_commands(&core.path, &core.params.pcm) {
            self.control(op)?;
        }
        self.control(ControlOp::Start)?;
        core.bridge_started = true;
        Ok(())
    }

    fn control(&mut self, op: ControlOp) -> OmxResult<()> {
        self.bridge.control(op).map_err(|err| {
            log::error!("Bridge {op} failed: {err}");
            OmxError::from(err)
        })
    }

    // ─── Deferred completion ────────────────────────────────────────────────

    fn on_ledger(&mut self, core: &mut ComponentCore, note: LedgerNote, out: &mut Outbox) {
        match note {
            LedgerNote::Registered { port, populated } => {
                if populated {
                    log::debug!("Port {port} populated");
                }
            }
            LedgerNote::Released { port } => {
                if core.release_unpopulates(port) {
                    log::warn!("Buffer freed on populated port {port} in {}", core.state);
                    out.event(Event::port_error(OmxError::PortUnpopulated, port));
                }
            }
        }
        if core.state == ComponentState::Invalid {
            return;
        }
        for op in core.port_ops.take_satisfied(&core.ports) {
            log::debug!("Port {} {:?} complete", op.port, op.command());
            out.event(Event::port_done(op.command(), op.port));
        }
        self.resolve_ledger_transition(core, out);
    }

    fn resolve_ledger_transition(&mut self, core: &mut ComponentCore, out: &mut Outbox) {
        let Some(inflight) = core.transition else {
            return;
        };
        let outcome = match inflight.awaiting {
            Awaiting::Population if core.enabled_ports_populated() => {
                TransitionOutcome::Immediate(Ok(inflight.target))
            }
            Awaiting::Drain if core.registered_total() == 0 => {
                TransitionOutcome::Immediate(self.release_bridge().map(|()| inflight.target))
            }
            _ => return,
        };
        core.transition = None;
        self.settle(core, inflight.target, inflight.origin, outcome, out);
    }

    fn on_bridge_event(&mut self, core: &mut ComponentCore, event: BridgeEvent, out: &mut Outbox) {
        match event {
            BridgeEvent::BufferDone(header) => self.on_buffer_returned(core, header, out),
            BridgeEvent::Started => log::debug!("Bridge started"),
            BridgeEvent::Stopped => self.on_bridge_settled(core, Awaiting::BridgeStopped, out),
            BridgeEvent::Paused => self.on_bridge_settled(core, Awaiting::BridgePaused, out),
            BridgeEvent::FlushComplete(dir) => {
                if std::mem::take(&mut core.flushing[dir.slot()]) {
                    out.event(Event::port_done(CommandKind::Flush, dir));
                } else {
                    log::debug!("Bridge flush of {dir} complete");
                }
            }
            BridgeEvent::PlayCompleted => out.event(Event::BufferFlag {
                port: Direction::Output,
                flags: BufferFlags::EOS,
            }),
            BridgeEvent::Error(reason) => {
                log::error!("Bridge error: {reason}");
                out.event(Event::error(OmxError::Hardware(reason)));
            }
        }
    }

    fn on_bridge_settled(&mut self, core: &mut ComponentCore, awaited: Awaiting, out: &mut Outbox) {
        let Some(inflight) = core.transition.filter(|t| t.awaiting == awaited) else {
            log::debug!("Unsolicited bridge notification {awaited:?}");
            return;
        };
        core.transition = None;
        if awaited == Awaiting::BridgeStopped {
            core.bridge_started = false;
            self.return_all_pending(core, out);
        }
        self.settle(
            core,
            inflight.target,
            inflight.origin,
            TransitionOutcome::Immediate(Ok(inflight.target)),
            out,
        );
    }

    // ─── Ports ──────────────────────────────────────────────────────────────

    fn flush_port(&mut self, core: &mut ComponentCore, dir: Direction, out: &mut Outbox) {
        if core.flushing[dir.slot()] {
            out.event(Event::port_error(OmxError::IncorrectStateOperation, dir));
            return;
        }
        self.return_pending(core, dir, out);
        if dir == Direction::Input {
            core.stream.reset_input();
        }

        let held = core.port(dir).held_by(BufferOwner::Bridge);
        if held == 0 || !self.bridge.is_bound() {
            out.event(Event::port_done(CommandKind::Flush, dir));
            return;
        }
        match self.control(ControlOp::StreamControl(StreamCommand::Flush(dir))) {
            Ok(()) => {
                log::debug!("Flushing {held} buffer(s) from the bridge on {dir}");
                core.flushing[dir.slot()] = true;
            }
            Err(err) => self.report_failure(core, err, out),
        }
    }

    fn disable_port(&mut self, core: &mut ComponentCore, dir: Direction, out: &mut Outbox) {
        if core.port_ops.is_pending(dir) {
            out.event(Event::port_error(OmxError::IncorrectStateOperation, dir));
            return;
        }
        core.port_mut(dir).set_enabled(false);
        self.return_pending(core, dir, out);

        if core.port(dir).registered() == 0 {
            out.event(Event::port_done(CommandKind::PortDisable, dir));
            return;
        }
        if self.bridge.is_bound() && core.port(dir).held_by(BufferOwner::Bridge) > 0 {
            if let Err(err) = self.control(ControlOp::StreamControl(StreamCommand::Flush(dir))) {
                self.report_failure(core, err, out);
                if core.state == ComponentState::Invalid {
                    return;
                }
            }
        }
        if let Err(err) = core.port_ops.insert(PendingPortOp::disable(dir)) {
            out.event(Event::port_error(err, dir));
        }
    }

    fn enable_port(&mut self, core: &mut ComponentCore, dir: Direction, out: &mut Outbox) {
        if core.port_ops.is_pending(dir) {
            out.event(Event::port_error(OmxError::IncorrectStateOperation, dir));
            return;
        }
        core.port_mut(dir).set_enabled(true);
        self.shared.port_enabled.notify_all();

        let immediate = matches!(
            core.state,
            ComponentState::Loaded | ComponentState::WaitForResources
        ) || core.port(dir).is_populated();
        if immediate {
            out.event(Event::port_done(CommandKind::PortEnable, dir));
        } else if let Err(err) = core.port_ops.insert(PendingPortOp::enable(dir)) {
            out.event(Event::port_error(err, dir));
        }
    }

    // ─── Buffers ────────────────────────────────────────────────────────────

    fn on_buffer(&mut self, core: &mut ComponentCore, mut header: BufferHeader, out: &mut Outbox) {
        let dir = header.port();
        if dir == Direction::Input {
            core.stream.input_accepted(&mut header);
        }

        let enabled = core.port(dir).is_enabled();
        if core.state == ComponentState::Executing
            && core.transition.is_none()
            && enabled
            && self.bridge.is_bound()
        {
            self.forward(core, header, out);
        } else if core.state.accepts_buffers() && enabled && !core.heading_to_loaded() {
            log::trace!("Holding {} in {}", header.id(), core.state);
            core.port_mut(dir).push_pending(header);
        } else {
            log::debug!("Returning {} unprocessed in {}", header.id(), core.state);
            self.return_to_client(core, header, out);
        }
    }

    fn on_buffer_returned(
        &mut self,
        core: &mut ComponentCore,
        mut header: BufferHeader,
        out: &mut Outbox,
    ) {
        let id = header.id();
        if let Err(err) = core
            .port_mut(id.port)
            .transfer(id, BufferOwner::Bridge, BufferOwner::Component)
        {
            log::error!("Bridge returned {id} it did not hold: {err}");
        }

        match id.port {
            Direction::Input => {
                let mark = core.stream.input_consumed(&mut header);
                self.return_to_client(core, header, out);
                if let Some(mark) = mark {
                    out.event(Event::Mark(mark));
                }
            }
            Direction::Output => {
                core.stream.output_produced(&mut header);
                let flags = header.flags;
                self.return_to_client(core, header, out);
                if flags.contains(BufferFlags::EOS) {
                    out.event(Event::BufferFlag {
                        port: Direction::Output,
                        flags,
                    });
                }
            }
        }
    }

    fn forward(&mut self, core: &mut ComponentCore, header: BufferHeader, out: &mut Outbox) {
        let id = header.id();
        let port = core.port_mut(id.port);
        if let Err(err) = port.transfer(id, BufferOwner::Component, BufferOwner::Bridge) {
            log::error!("Cannot forward {id}: {err}");
            self.return_to_client(core, header, out);
            return;
        }
        if let Err((err, header)) = self.bridge.queue_buffer(header) {
            log::error!("Bridge refused {id}: {err}");
            let _ = core
                .port_mut(id.port)
                .transfer(id, BufferOwner::Bridge, BufferOwner::Component);
            out.event(Event::port_error(err.into(), id.port));
            self.return_to_client(core, header, out);
        }
    }

    fn forward_all_pending(&mut self, core: &mut ComponentCore, out: &mut Outbox) {
        for dir in Direction::BOTH {
            for header in core.port_mut(dir).take_pending() {
                self.forward(core, header, out);
            }
        }
    }

    fn return_pending(&mut self, core: &mut ComponentCore, dir: Direction, out: &mut Outbox) {
        for header in core.port_mut(dir).take_pending() {
            self.return_to_client(core, header, out);
        }
    }

    fn return_all_pending(&mut self, core: &mut ComponentCore, out: &mut Outbox) {
        for dir in Direction::BOTH {
            self.return_pending(core, dir, out);
        }
    }

    fn return_to_client(&self, core: &mut ComponentCore, header: BufferHeader, out: &mut Outbox) {
        let id = header.id();
        let port = core.port_mut(id.port);
        match port.ledger().owner(id) {
            Some(BufferOwner::Client) => log::warn!("{id} was already with the client"),
            Some(owner) => {
                if let Err(err) = port.transfer(id, owner, BufferOwner::Client) {
                    log::error!("Ledger refused return of {id}: {err}");
                }
            }
            None => log::error!("Returning unregistered buffer {id}"),
        }
        out.buffer_done(header);
    }

    // ─── Shutdown ───────────────────────────────────────────────────────────

    fn teardown(&mut self) {
        self.with_core(|this, core, _out| {
            if this.bridge.is_bound() {
                if core.bridge_started {
                    if let Err(err) = this.bridge.control(ControlOp::Stop) {
                        log::warn!("Stop during teardown failed: {err}");
                    }
                }
                if let Err(err) = this.bridge.control(ControlOp::Destroy) {
                    log::warn!("Destroy during teardown failed: {err}");
                }
                this.bridge.unbind();
            }
            this.release_resources();
            core.bridge_started = false;
            core.transition = None;
            core.stream.reset();

            let registered = core.registered_total();
            if registered > 0 {
                log::warn!("Deinit with {registered} buffer(s) still registered");
            }
        });
        if !self.backlog.is_empty() {
            log::debug!("Dropping {} backlogged command(s)", self.backlog.len());
        }
    }
}
