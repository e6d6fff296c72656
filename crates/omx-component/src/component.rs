//! Encoder component entry points
//!
//! Every call here runs on the caller's thread. State-changing work is
//! validated synchronously and then handed to the dispatch loop; reads take
//! the component lock briefly or, for [`EncoderComponent::get_state`], only an
//! atomic load.
//!
//! The loop keeps the lock while it waits for a bridge acknowledgement, so a
//! call that needs the lock can wait up to the configured control timeout.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use thiserror::Error;

use omx_bridge::{Bridge, BridgeSetup};
use omx_core::{
    AllocationKind, AudioPortFormat, BufferHeader, BufferId, BufferMemory, BufferOwner,
    BufferSupplierParam, Command, CommandKind, ComponentConfig, ComponentState, Config,
    ConfigIndex, DataPathMode, Direction, DspDefinition, INPUT_FRAME_SIZE, MarkData, OmxError,
    OmxResult, Param, ParamIndex, SpecVersion,
};

use crate::allocator::{BufferAllocator, HeapAllocator};
use crate::callbacks::ClientCallbacks;
use crate::channel::{CommandChannel, DataChannel, LedgerNote, work_channel};
use crate::dispatch::{DispatchLoop, DispatchSnapshot, DispatchStats};
use crate::resource::{ResourceManager, ResourceNotice};
use crate::shared::{ComponentCore, Shared};
use crate::strategy;

/// A buffer call that failed; the header goes back to the caller
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    pub error: OmxError,
    pub header: BufferHeader,
}

impl Rejected {
    fn new(error: OmxError, header: BufferHeader) -> Self {
        log::debug!("Rejected {}: {error}", header.id());
        Self { error, header }
    }
}

/// Answer to GetComponentVersion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    pub name: String,
    pub component: SpecVersion,
    pub spec: SpecVersion,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects the optional collaborators before the loop thread starts
pub struct ComponentBuilder {
    config: ComponentConfig,
    bridge: Box<dyn Bridge>,
    callbacks: Arc<dyn ClientCallbacks>,
    resources: Option<Arc<dyn ResourceManager>>,
    allocator: Arc<dyn BufferAllocator>,
}

impl ComponentBuilder {
    pub fn new(
        config: ComponentConfig,
        bridge: Box<dyn Bridge>,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Self {
        Self {
            config,
            bridge,
            callbacks,
            resources: None,
            allocator: Arc::new(HeapAllocator),
        }
    }

    /// Ask this manager for DSP resources on every transition to Idle
    pub fn with_resource_manager(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Validate the configuration and start the dispatch loop in Loaded
    pub fn init(self) -> OmxResult<EncoderComponent> {
        self.config.validate()?;

        let shared = Arc::new(Shared::new(&self.config));
        let (work_tx, work_rx) = work_channel(self.config.command_capacity);
        let stats = Arc::new(DispatchStats::default());
        let setup = BridgeSetup {
            input_frame_size: INPUT_FRAME_SIZE,
            output_frame_size: self.config.output_frame_size(),
            mime_mode: self.config.mime_mode,
            streaming: self.config.data_path.is_streaming(),
            stream_id: self.config.stream_id,
            control_timeout: self.config.control_timeout(),
        };

        let worker = DispatchLoop::new(
            Arc::clone(&shared),
            self.bridge,
            setup,
            self.callbacks,
            self.resources,
            self.config.component_name.clone(),
            work_rx,
            Arc::clone(&stats),
        )
        .spawn()
        .map_err(|e| OmxError::InsufficientResources(format!("dispatch thread: {e}")))?;

        log::info!(
            "{} initialised ({:?}, {}×{} in, {}×{} out)",
            self.config.component_name,
            self.config.data_path,
            self.config.input.buffer_count,
            self.config.input.buffer_size,
            self.config.output.buffer_count,
            self.config.output.buffer_size
        );

        Ok(EncoderComponent {
            shared,
            commands: CommandChannel::new(work_tx.clone()),
            data: DataChannel::new(work_tx),
            allocator: self.allocator,
            config: self.config,
            stats,
            worker: Some(worker),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct EncoderComponent {
    shared: Arc<Shared>,
    commands: CommandChannel,
    data: DataChannel,
    allocator: Arc<dyn BufferAllocator>,
    config: ComponentConfig,
    stats: Arc<DispatchStats>,
    worker: Option<JoinHandle<()>>,
}

impl EncoderComponent {
    /// Start a component with the default heap allocator and no resource manager
    pub fn init(
        config: ComponentConfig,
        bridge: Box<dyn Bridge>,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> OmxResult<Self> {
        ComponentBuilder::new(config, bridge, callbacks).init()
    }

    pub fn builder(
        config: ComponentConfig,
        bridge: Box<dyn Bridge>,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> ComponentBuilder {
        ComponentBuilder::new(config, bridge, callbacks)
    }

    /// Stop the loop, destroy a bound bridge and join the loop thread
    pub fn deinit(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if !self.commands.shutdown() {
            log::debug!("Dispatch loop already gone");
        }
        if self.commands.on_loop_thread() {
            log::warn!("Component dropped inside a callback, loop thread left detached");
            return;
        }
        if worker.join().is_err() {
            log::error!("Dispatch thread panicked");
        }
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    // ─── Commands ───────────────────────────────────────────────────────────

    /// Last committed state; may lag an in-flight transition
    pub fn get_state(&self) -> ComponentState {
        self.shared.state()
    }

    /// Validate and enqueue a command; completion arrives as an event
    pub fn send_command(&self, command: Command) -> OmxResult<()> {
        if self.get_state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        if let Command::MarkBuffer { port, .. } = command {
            if port != Direction::Input {
                return Err(OmxError::BadPortIndex(port.index()));
            }
        }
        log::debug!("SendCommand {command}");
        self.commands.submit(command)
    }

    /// `SendCommand` with a raw parameter, as an IL client would issue it
    pub fn send_raw_command(
        &self,
        kind: CommandKind,
        param: u32,
        mark: Option<MarkData>,
    ) -> OmxResult<()> {
        self.send_command(Command::from_raw(kind, param, mark)?)
    }

    /// Forward a resource-manager notice to the loop
    pub fn notify_resources(&self, notice: ResourceNotice) -> OmxResult<()> {
        self.commands.notify_resources(notice)
    }

    // ─── Buffers ────────────────────────────────────────────────────────────

    /// Queue a filled input buffer
    pub fn empty_this_buffer(&self, header: BufferHeader) -> Result<(), Rejected> {
        self.hand_off(Direction::Input, header)
    }

    /// Queue an empty output buffer
    pub fn fill_this_buffer(&self, mut header: BufferHeader) -> Result<(), Rejected> {
        header.filled_len = 0;
        header.offset = 0;
        self.hand_off(Direction::Output, header)
    }

    fn hand_off(&self, expected: Direction, header: BufferHeader) -> Result<(), Rejected> {
        if let Err(error) = self.shared.core.lock().accept_handoff(expected, &header) {
            return Err(Rejected::new(error, header));
        }
        self.data.hand_off(header).map_err(|header| {
            self.reclaim(&header);
            Rejected::new(OmxError::InvalidState, header)
        })
    }

    /// Undo a hand-off the loop never received
    fn reclaim(&self, header: &BufferHeader) {
        let mut core = self.shared.core.lock();
        let id = header.id();
        if let Err(err) =
            core.port_mut(id.port)
                .transfer(id, BufferOwner::Component, BufferOwner::Client)
        {
            log::error!("Cannot reclaim {id}: {err}");
        }
    }

    /// Allocate aligned memory owned by the component
    pub fn allocate_buffer(&self, port_index: u32, size: usize) -> OmxResult<BufferHeader> {
        let port = Direction::from_index(port_index)?;
        if size == 0 {
            return Err(OmxError::bad_parameter("buffer size cannot be zero"));
        }
        let block = self.allocator.allocate(size, self.config.buffer_alignment)?;
        self.register(port, BufferMemory::Owned(block), AllocationKind::Owned)
    }

    /// Register client memory with the component
    pub fn use_buffer(&self, port_index: u32, memory: Vec<u8>) -> OmxResult<BufferHeader> {
        let port = Direction::from_index(port_index)?;
        if memory.is_empty() {
            return Err(OmxError::bad_parameter("buffer size cannot be zero"));
        }
        self.register(port, BufferMemory::Borrowed(memory), AllocationKind::Borrowed)
    }

    fn register(
        &self,
        port: Direction,
        memory: BufferMemory,
        kind: AllocationKind,
    ) -> OmxResult<BufferHeader> {
        let mut core = self.shared.core.lock();
        let deadline = Instant::now() + self.config.allocation_timeout();
        while !core.port(port).is_enabled() {
            if core.state == ComponentState::Invalid {
                return Err(OmxError::InvalidState);
            }
            log::debug!("Allocation on disabled port {port} waiting for enable");
            if self
                .shared
                .port_enabled
                .wait_until(&mut core, deadline)
                .timed_out()
                && !core.port(port).is_enabled()
            {
                log::warn!("Port {port} stayed disabled during allocation");
                return Err(OmxError::PortUnresponsiveDuringAllocation);
            }
        }
        if core.state == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }

        let (id, populated) = core.register(port, kind, memory.len())?;
        let header = BufferHeader::new(id, memory, core.version());
        drop(core);

        log::debug!("Registered {id} ({kind:?}, {} bytes)", header.alloc_len());
        self.data.note(LedgerNote::Registered { port, populated });
        Ok(header)
    }

    /// Unregister a buffer the client holds. Borrowed memory is handed back.
    pub fn free_buffer(&self, port_index: u32, header: BufferHeader) -> OmxResult<Option<Vec<u8>>> {
        let port = Direction::from_index(port_index)?;
        let id = header.id();
        if id.port != port {
            return Err(OmxError::bad_parameter(format!(
                "{id} does not belong to port {port}"
            )));
        }

        // The ledger refuses ids it does not know and buffers the client does not hold
        self.shared.core.lock().port_mut(port).release(id)?;

        log::debug!("Freed {id}");
        self.data.note(LedgerNote::Released { port });
        Ok(match header.into_memory() {
            BufferMemory::Borrowed(memory) => Some(memory),
            BufferMemory::Owned(_) => None,
        })
    }

    /// Current owner of a registered buffer
    pub fn buffer_owner(&self, id: BufferId) -> Option<BufferOwner> {
        self.shared.core.lock().port(id.port).ledger().owner(id)
    }

    // ─── Parameters ─────────────────────────────────────────────────────────

    pub fn get_parameter(&self, index: ParamIndex) -> OmxResult<Param> {
        if self.get_state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        let core = self.shared.core.lock();
        match index {
            ParamIndex::PortDefinition(port) => Ok(Param::PortDefinition(core.port(port).definition())),
            ParamIndex::AudioPortFormat { port, index } => {
                if index > 0 {
                    return Err(OmxError::NoMore);
                }
                Ok(Param::AudioPortFormat(AudioPortFormat {
                    port,
                    index,
                    encoding: core.port(port).definition().encoding,
                }))
            }
            ParamIndex::Pcm(port) => {
                expect_port(port, Direction::Input)?;
                Ok(Param::Pcm(core.params.pcm))
            }
            ParamIndex::G729(port) => {
                expect_port(port, Direction::Output)?;
                Ok(Param::G729(core.params.g729))
            }
            ParamIndex::PriorityMgmt => Ok(Param::PriorityMgmt(core.params.priority)),
            ParamIndex::AudioInit => Ok(Param::AudioInit(core.params.audio_init)),
            ParamIndex::BufferSupplier(port) => Ok(Param::BufferSupplier(BufferSupplierParam {
                port,
                supplier: core.params.suppliers[port.slot()],
            })),
            ParamIndex::ComponentRole => Err(OmxError::bad_parameter("component role")),
            ParamIndex::Other(raw) => {
                log::debug!("GetParameter on unsupported index {raw:#x}");
                Err(OmxError::UnsupportedIndex)
            }
        }
    }

    /// Allowed in Loaded, or for a port-scoped parameter while that port is disabled
    pub fn set_parameter(&self, param: Param) -> OmxResult<()> {
        let mut core = self.shared.core.lock();
        match core.state {
            ComponentState::Invalid => return Err(OmxError::InvalidState),
            ComponentState::Loaded => {}
            _ => match param.port() {
                Some(port) if !core.port(port).is_enabled() => {}
                _ => return Err(OmxError::IncorrectStateOperation),
            },
        }

        let index = param.index();
        match param {
            Param::PortDefinition(def) => core.port_mut(def.port).apply_definition(&def)?,
            Param::AudioPortFormat(fmt) => {
                if fmt.index > 0 {
                    return Err(OmxError::NoMore);
                }
                if fmt.encoding != core.port(fmt.port).definition().encoding {
                    return Err(OmxError::bad_parameter(format!(
                        "port {} does not support {:?}",
                        fmt.port, fmt.encoding
                    )));
                }
            }
            Param::Pcm(pcm) => {
                expect_port(pcm.port, Direction::Input)?;
                if pcm.channels == 0 || pcm.sample_rate == 0 {
                    return Err(OmxError::bad_parameter("PCM channels and rate must be non-zero"));
                }
                core.params.pcm = pcm;
            }
            Param::G729(g729) => {
                expect_port(g729.port, Direction::Output)?;
                core.params.g729 = g729;
            }
            Param::PriorityMgmt(priority) => core.params.priority = priority,
            Param::AudioInit(_) => return Err(OmxError::bad_parameter("AudioInit is read-only")),
            Param::BufferSupplier(sup) => core.params.suppliers[sup.port.slot()] = sup.supplier,
            Param::ComponentRole(_) => return Err(OmxError::bad_parameter("component role")),
        }
        log::debug!("SetParameter {index:?}");
        Ok(())
    }

    // ─── Configs ────────────────────────────────────────────────────────────

    pub fn get_config(&self, index: ConfigIndex) -> OmxResult<Config> {
        if self.get_state() == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }
        let core = self.shared.core.lock();
        match index {
            ConfigIndex::ModeConfig => Ok(Config::ModeConfig(dsp_definition(&core))),
            ConfigIndex::HeaderInfo => Ok(Config::HeaderInfo(dsp_definition(&core))),
            ConfigIndex::StreamId => Ok(Config::StreamId(core.path.stream_id)),
            ConfigIndex::DataPath => Ok(Config::DataPath(core.path.data_path)),
            ConfigIndex::Volume(port) => Ok(Config::Volume(core.params.volume[port.slot()])),
            ConfigIndex::Other(raw) => {
                log::debug!("GetConfig on unsupported index {raw:#x}");
                Err(OmxError::UnsupportedIndex)
            }
        }
    }

    pub fn set_config(&self, config: Config) -> OmxResult<()> {
        let mut core = self.shared.core.lock();
        if core.state == ComponentState::Invalid {
            return Err(OmxError::InvalidState);
        }

        match config {
            Config::ModeConfig(def) | Config::HeaderInfo(def) => {
                if !matches!(
                    core.state,
                    ComponentState::Loaded | ComponentState::WaitForResources
                ) {
                    return Err(OmxError::IncorrectStateOperation);
                }
                let mode = match def.dasf_mode {
                    0 => DataPathMode::Application,
                    1 => DataPathMode::Streaming { rt_mixer: false },
                    2 => DataPathMode::Streaming { rt_mixer: true },
                    other => {
                        return Err(OmxError::bad_parameter(format!("DASF mode {other}")));
                    }
                };
                core.path.mode = mode;
                core.path.acoustic_mode = def.acoustic_mode;
                core.path.stream_id = def.stream_id;
                core.strategy = strategy::resolve(mode);
                log::info!("Data path {mode:?}, stream {}", def.stream_id);
            }
            Config::StreamId(id) => core.path.stream_id = id,
            Config::DataPath(path) => core.path.data_path = path,
            Config::Volume(volume) => {
                if volume.linear && !(0..=100).contains(&volume.value) {
                    return Err(OmxError::bad_parameter(format!(
                        "linear volume {} outside 0..=100",
                        volume.value
                    )));
                }
                core.params.volume[volume.port.slot()] = volume;
            }
        }
        Ok(())
    }

    /// Resolve a vendor extension name to its config index
    pub fn get_extension_index(&self, name: &str) -> OmxResult<ConfigIndex> {
        ConfigIndex::from_extension(name)
            .ok_or_else(|| OmxError::bad_parameter(format!("unknown extension {name}")))
    }

    /// Audio-manager device the current data path attaches to
    pub fn device_string(&self) -> String {
        let core = self.shared.core.lock();
        core.strategy.device_string(&core.path)
    }

    // ─── Introspection ──────────────────────────────────────────────────────

    pub fn get_component_version(&self) -> ComponentVersion {
        ComponentVersion {
            name: self.config.component_name.clone(),
            component: self.config.version,
            spec: SpecVersion::COMPONENT,
        }
    }

    pub fn component_role_enum(&self, _index: u32) -> OmxResult<String> {
        Err(OmxError::NotImplemented)
    }

    pub fn component_tunnel_request(&self, port_index: u32) -> OmxResult<()> {
        Direction::from_index(port_index)?;
        Err(OmxError::NotImplemented)
    }
}

impl Drop for EncoderComponent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn expect_port(port: Direction, expected: Direction) -> OmxResult<()> {
    if port == expected {
        Ok(())
    } else {
        Err(OmxError::BadPortIndex(port.index()))
    }
}

fn dsp_definition(core: &ComponentCore) -> DspDefinition {
    DspDefinition {
        dasf_mode: match core.path.mode {
            DataPathMode::Application => 0,
            DataPathMode::Streaming { rt_mixer: false } => 1,
            DataPathMode::Streaming { rt_mixer: true } => 2,
        },
        acoustic_mode: core.path.acoustic_mode,
        stream_id: core.path.stream_id,
    }
}
