//! Component core shared between client threads and the dispatch loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

use omx_core::{
    AllocationKind, BufferHeader, BufferId, BufferOwner, BufferSupplier, ComponentConfig,
    ComponentState, DataPath, Direction, G729Params, OmxError, OmxResult, PcmParams,
    PortDefinition, PortParam, PriorityMgmt, SpecVersion, VolumeConfig,
};

use crate::pending::PendingPortOps;
use crate::port::Port;
use crate::strategy::{self, DataPathStrategy, PathSettings};
use crate::stream::StreamTracker;
use crate::transition::InFlight;

/// Parameter values with no effect on the ledger
#[derive(Debug, Clone)]
pub struct ParamStore {
    pub pcm: PcmParams,
    pub g729: G729Params,
    pub priority: PriorityMgmt,
    pub audio_init: PortParam,
    pub suppliers: [BufferSupplier; 2],
    pub volume: [VolumeConfig; 2],
}

impl ParamStore {
    fn new(config: &ComponentConfig) -> Self {
        let volume = |port| VolumeConfig {
            port,
            linear: true,
            value: 100,
        };
        Self {
            pcm: PcmParams::default(),
            g729: G729Params {
                dtx: config.dtx,
                ..G729Params::default()
            },
            priority: PriorityMgmt::default(),
            audio_init: PortParam::default(),
            suppliers: [BufferSupplier::Input, BufferSupplier::Output],
            volume: [volume(Direction::Input), volume(Direction::Output)],
        }
    }
}

pub struct ComponentCore {
    pub state: ComponentState,
    state_mirror: Arc<AtomicU32>,
    pub ports: [Port; 2],
    pub params: ParamStore,
    pub path: PathSettings,
    pub strategy: Box<dyn DataPathStrategy>,
    /// Transition waiting on the ledger or the bridge
    pub transition: Option<InFlight>,
    pub port_ops: PendingPortOps,
    /// Client flush in progress per port
    pub flushing: [bool; 2],
    /// Start has been acknowledged and Stop has not completed
    pub bridge_started: bool,
    pub stream: StreamTracker,
    version: SpecVersion,
    next_serial: u32,
}

impl ComponentCore {
    pub fn new(config: &ComponentConfig, state_mirror: Arc<AtomicU32>) -> Self {
        let mut input = PortDefinition::input(config.input.buffer_count, config.input.buffer_size);
        let mut output =
            PortDefinition::output(config.output.buffer_count, config.output.buffer_size);
        input.buffer_alignment = config.buffer_alignment;
        output.buffer_alignment = config.buffer_alignment;

        let path = PathSettings {
            mode: config.data_path,
            stream_id: config.stream_id,
            acoustic_mode: config.acoustic_mode,
            data_path: DataPath::Application,
        };
        state_mirror.store(ComponentState::Loaded.as_raw(), Ordering::Release);

        Self {
            state: ComponentState::Loaded,
            state_mirror,
            ports: [Port::new(input), Port::new(output)],
            params: ParamStore::new(config),
            path,
            strategy: strategy::resolve(config.data_path),
            transition: None,
            port_ops: PendingPortOps::default(),
            flushing: [false, false],
            bridge_started: false,
            stream: StreamTracker::default(),
            version: config.version,
            next_serial: 1,
        }
    }

    #[inline]
    pub fn port(&self, dir: Direction) -> &Port {
        &self.ports[dir.slot()]
    }

    #[inline]
    pub fn port_mut(&mut self, dir: Direction) -> &mut Port {
        &mut self.ports[dir.slot()]
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Commit a new state and publish it to lock-free readers
    pub fn commit(&mut self, state: ComponentState) {
        if self.state != state {
            log::info!("State {} → {}", self.state, state);
        }
        self.state = state;
        self.state_mirror.store(state.as_raw(), Ordering::Release);
    }

    pub fn enabled_ports_populated(&self) -> bool {
        self.ports
            .iter()
            .filter(|p| p.is_enabled())
            .all(|p| p.is_populated())
    }

    pub fn registered_total(&self) -> usize {
        self.ports.iter().map(Port::registered).sum()
    }

    /// A StateSet toward Loaded is waiting for buffers to be freed
    pub fn heading_to_loaded(&self) -> bool {
        self.transition
            .is_some_and(|t| t.target == ComponentState::Loaded)
    }

    pub fn next_buffer_id(&mut self, port: Direction) -> BufferId {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        BufferId { port, serial }
    }

    /// Validate a client hand-off and take ownership in the ledger
    pub fn accept_handoff(&mut self, expected: Direction, header: &BufferHeader) -> OmxResult<()> {
        header.check_bounds()?;
        if self.port(header.port()).ledger().get(header.id()).is_none() {
            return Err(OmxError::bad_parameter(format!("unknown buffer {}", header.id())));
        }
        if !self.port(expected).is_enabled() {
            return Err(OmxError::IncorrectStateOperation);
        }
        if header.version != self.version {
            return Err(OmxError::VersionMismatch);
        }
        if header.port() != expected {
            return Err(OmxError::BadPortIndex(header.port().index()));
        }
        match self.state {
            ComponentState::Invalid => return Err(OmxError::InvalidState),
            state if !state.accepts_buffers() => return Err(OmxError::IncorrectStateOperation),
            _ => {}
        }
        if self.heading_to_loaded() {
            return Err(OmxError::IncorrectStateOperation);
        }
        self.port_mut(expected)
            .transfer(header.id(), BufferOwner::Client, BufferOwner::Component)
    }

    /// Register a new buffer on `port`. Returns the id and whether the port
    /// just became populated.
    pub fn register(
        &mut self,
        port: Direction,
        kind: AllocationKind,
        capacity: usize,
    ) -> OmxResult<(BufferId, bool)> {
        let id = self.next_buffer_id(port);
        let populated = self.port_mut(port).register(id, kind, capacity)?;
        Ok((id, populated))
    }

    /// Whether a buffer freed from `port` now breaks the populated contract
    pub fn release_unpopulates(&self, port: Direction) -> bool {
        self.port(port).is_enabled()
            && self.state.accepts_buffers()
            && !self.heading_to_loaded()
            && !self.port_ops.is_pending(port)
    }
}

/// Lock and signal shared by [`EncoderComponent`](crate::EncoderComponent)
/// and the dispatch loop
pub struct Shared {
    pub core: Mutex<ComponentCore>,
    /// Signalled whenever a port becomes enabled or the component goes Invalid
    pub port_enabled: Condvar,
    state: Arc<AtomicU32>,
}

impl Shared {
    pub fn new(config: &ComponentConfig) -> Self {
        let state = Arc::new(AtomicU32::new(ComponentState::Loaded.as_raw()));
        Self {
            core: Mutex::new(ComponentCore::new(config, Arc::clone(&state))),
            port_enabled: Condvar::new(),
            state,
        }
    }

    /// Last committed state, without taking the lock
    pub fn state(&self) -> ComponentState {
        ComponentState::from_raw(self.state.load(Ordering::Acquire))
            .unwrap_or(ComponentState::Invalid)
    }
}
