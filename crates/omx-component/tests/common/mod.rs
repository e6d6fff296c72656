//! Shared harness for component integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

use omx_bridge::{SimConfig, SimHandle, SimulatedDsp};
use omx_component::{ChannelCallbacks, ClientMessage, ComponentBuilder, EncoderComponent};
use omx_core::{
    BufferHeader, BufferId, Command, CommandKind, ComponentConfig, ComponentState, Direction,
    Event, Param, ParamIndex, PortDefinition,
};

pub const WAIT: Duration = Duration::from_secs(3);
pub const QUIET: Duration = Duration::from_millis(150);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything the client observed, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Event(Event),
    EmptyDone(BufferId),
    FillDone(BufferId),
}

pub struct Harness {
    pub component: EncoderComponent,
    pub dsp: SimHandle,
    pub config: ComponentConfig,
    rx: Receiver<ClientMessage>,
    /// Events not yet consumed by `wait_for`
    unseen: Vec<Event>,
    pub timeline: Vec<Observed>,
    pub returned_inputs: Vec<BufferHeader>,
    pub returned_outputs: Vec<BufferHeader>,
}

impl Harness {
    pub fn new(config: ComponentConfig) -> Self {
        Self::with_sim(config, SimConfig::default())
    }

    pub fn with_sim(config: ComponentConfig, sim: SimConfig) -> Self {
        Self::build(config, sim, |builder| builder)
    }

    pub fn build(
        config: ComponentConfig,
        sim: SimConfig,
        customize: impl FnOnce(ComponentBuilder) -> ComponentBuilder,
    ) -> Self {
        init_logging();
        let dsp = SimulatedDsp::new(sim);
        let handle = dsp.handle();
        let (tx, rx) = unbounded();
        let builder = EncoderComponent::builder(
            config.clone(),
            Box::new(dsp),
            Arc::new(ChannelCallbacks::new(tx)),
        );
        let component = customize(builder).init().unwrap();
        Self {
            component,
            dsp: handle,
            config,
            rx,
            unseen: Vec::new(),
            timeline: Vec::new(),
            returned_inputs: Vec::new(),
            returned_outputs: Vec::new(),
        }
    }

    pub fn command(&self, command: Command) {
        self.component.send_command(command).unwrap();
    }

    /// Receive one callback; false on timeout
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(ClientMessage::Event(event)) => {
                self.timeline.push(Observed::Event(event.clone()));
                self.unseen.push(event);
                true
            }
            Ok(ClientMessage::EmptyBufferDone(header)) => {
                self.timeline.push(Observed::EmptyDone(header.id()));
                self.returned_inputs.push(header);
                true
            }
            Ok(ClientMessage::FillBufferDone(header)) => {
                self.timeline.push(Observed::FillDone(header.id()));
                self.returned_outputs.push(header);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => panic!("callback channel closed"),
        }
    }

    /// Collect callbacks until nothing arrives for a while
    pub fn settle(&mut self) {
        while self.pump(QUIET) {}
    }

    pub fn wait_for(&mut self, pred: impl Fn(&Event) -> bool) -> Event {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(pos) = self.unseen.iter().position(&pred) {
                return self.unseen.remove(pos);
            }
            let now = Instant::now();
            if now >= deadline {
                panic!("timed out waiting for event; timeline: {:#?}", self.timeline);
            }
            self.pump(deadline - now);
        }
    }

    pub fn wait_cmd(&mut self, command: CommandKind, data: u32) {
        self.wait_for(|e| *e == Event::CmdComplete { command, data });
    }

    pub fn wait_state(&mut self, state: ComponentState) {
        self.wait_cmd(CommandKind::StateSet, state.as_raw());
    }

    pub fn set_state(&mut self, state: ComponentState) {
        self.command(Command::StateSet(state));
        self.wait_state(state);
        assert_eq!(self.component.get_state(), state);
    }

    pub fn wait_inputs(&mut self, count: usize) -> Vec<BufferHeader> {
        let deadline = Instant::now() + WAIT;
        while self.returned_inputs.len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for EmptyBufferDone");
            self.pump(QUIET);
        }
        self.returned_inputs.drain(..).collect()
    }

    pub fn wait_outputs(&mut self, count: usize) -> Vec<BufferHeader> {
        let deadline = Instant::now() + WAIT;
        while self.returned_outputs.len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for FillBufferDone");
            self.pump(QUIET);
        }
        self.returned_outputs.drain(..).collect()
    }

    /// Poll a condition that does not produce a callback
    pub fn wait_until(&mut self, cond: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + WAIT;
        while !cond(self) {
            assert!(Instant::now() < deadline, "condition not reached");
            self.pump(Duration::from_millis(10));
        }
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.timeline
            .iter()
            .filter(|o| matches!(o, Observed::Event(e) if pred(e)))
            .count()
    }

    pub fn saw(&self, pred: impl Fn(&Event) -> bool) -> bool {
        self.count(pred) > 0
    }

    pub fn allocate(&self, port: Direction) -> BufferHeader {
        let size = match port {
            Direction::Input => self.config.input.buffer_size,
            Direction::Output => self.config.output.buffer_size,
        };
        self.component.allocate_buffer(port.index(), size).unwrap()
    }

    /// Allocate the configured count on both ports
    pub fn allocate_all(&self) -> (Vec<BufferHeader>, Vec<BufferHeader>) {
        let inputs = (0..self.config.input.buffer_count)
            .map(|_| self.allocate(Direction::Input))
            .collect();
        let outputs = (0..self.config.output.buffer_count)
            .map(|_| self.allocate(Direction::Output))
            .collect();
        (inputs, outputs)
    }

    /// Loaded → Idle with every buffer allocated
    pub fn idle(&mut self) -> (Vec<BufferHeader>, Vec<BufferHeader>) {
        self.command(Command::StateSet(ComponentState::Idle));
        let buffers = self.allocate_all();
        self.wait_state(ComponentState::Idle);
        buffers
    }

    /// Idle → Loaded, freeing the given buffers
    pub fn unload(&mut self, buffers: Vec<BufferHeader>) {
        self.command(Command::StateSet(ComponentState::Loaded));
        for header in buffers {
            let port = header.port().index();
            self.component.free_buffer(port, header).unwrap();
        }
        self.wait_state(ComponentState::Loaded);
    }

    pub fn port_definition(&self, port: Direction) -> PortDefinition {
        match self.component.get_parameter(ParamIndex::PortDefinition(port)) {
            Ok(Param::PortDefinition(def)) => def,
            other => panic!("unexpected {other:?}"),
        }
    }
}

/// An input buffer holding one frame of a ramp signal
pub fn fill_pcm(header: &mut BufferHeader, len: usize) {
    let pcm: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    header.fill_from(&pcm).unwrap();
}
