//! Component lifecycle integration tests
//!
//! Drives the encoder component through the simulated DSP:
//! - State transitions and deferred completion
//! - Buffer ownership, flush and port enable/disable
//! - Bridge failures, preemption and resource denial
//! - Stream features (EOS, marks, timestamps)

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use common::{Harness, Observed, WAIT, fill_pcm};
use omx_bridge::{ControlKind, ControlOp, SimConfig, SimulatedDsp, StreamCommand};
use omx_component::{
    ChannelCallbacks, ClientCallbacks, ClientMessage, EncoderComponent, ResourceManager,
    ResourceNotice,
};
use omx_core::{
    AudioCoding, BufferFlags, BufferOwner, Command, CommandKind, ComponentConfig,
    ComponentState, Config, ConfigIndex, Direction, DspDefinition, EXTENSION_STREAM_ID, Event,
    INPUT_FRAME_SIZE, INPUT_PORT, MarkData, OUTPUT_FRAME_SIZE, OUTPUT_PORT, OmxError, Param,
    ParamIndex, PortTarget,
};

use ComponentState::{Executing, Idle, Invalid, Loaded, Pause, WaitForResources};

fn is_error(expected: OmxError) -> impl Fn(&Event) -> bool {
    move |e| matches!(e, Event::Error { error, .. } if *error == expected)
}

fn is_state_complete(e: &Event) -> bool {
    matches!(
        e,
        Event::CmdComplete {
            command: CommandKind::StateSet,
            ..
        }
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_round_trip_restores_initial_ports() {
    let mut h = Harness::new(ComponentConfig::application());
    let input_before = h.port_definition(Direction::Input);
    let output_before = h.port_definition(Direction::Output);

    let (inputs, outputs) = h.idle();
    h.set_state(Executing);
    h.set_state(Idle);
    h.unload(inputs.into_iter().chain(outputs).collect());

    assert_eq!(h.component.get_state(), Loaded);
    assert_eq!(h.port_definition(Direction::Input), input_before);
    assert_eq!(h.port_definition(Direction::Output), output_before);
    assert!(!input_before.populated);
    assert_eq!(
        h.dsp.op_kinds(),
        vec![
            ControlKind::Init,
            ControlKind::AlgControl,
            ControlKind::Start,
            ControlKind::Stop,
            ControlKind::Destroy,
        ]
    );
}

#[test]
fn test_same_state_has_no_side_effects() {
    let mut h = Harness::new(ComponentConfig::application());
    let (inputs, _outputs) = h.idle();
    h.settle();
    let seen = h.timeline.len();
    let ops = h.dsp.ops().len();

    h.command(Command::StateSet(Idle));
    h.wait_for(is_error(OmxError::SameState));
    h.settle();

    assert_eq!(h.timeline.len(), seen + 1);
    assert_eq!(h.dsp.ops().len(), ops);
    assert_eq!(h.component.get_state(), Idle);
    assert_eq!(
        h.component.buffer_owner(inputs[0].id()),
        Some(BufferOwner::Client)
    );
}

#[test]
fn test_idle_waits_for_population() {
    let mut h = Harness::new(ComponentConfig::application());
    h.command(Command::StateSet(Idle));
    h.settle();
    assert!(!h.saw(is_state_complete));
    assert_eq!(h.component.get_state(), Loaded);

    let _input = h.allocate(Direction::Input);
    h.settle();
    assert!(!h.saw(is_state_complete));

    let _output = h.allocate(Direction::Output);
    h.wait_state(Idle);
    assert_eq!(h.component.get_state(), Idle);
    assert_eq!(h.component.stats().deferred, 1);
}

#[test]
fn test_loaded_waits_for_every_buffer_to_be_freed() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();

    h.command(Command::StateSet(Loaded));
    let input = inputs.pop().unwrap();
    h.component.free_buffer(INPUT_PORT, input).unwrap();
    h.settle();
    assert_eq!(h.count(is_state_complete), 1);
    assert!(!h.saw(is_error(OmxError::PortUnpopulated)));

    h.component
        .free_buffer(OUTPUT_PORT, outputs.pop().unwrap())
        .unwrap();
    h.wait_state(Loaded);
}

#[test]
fn test_commands_behind_deferred_transition_run_in_order() {
    let mut h = Harness::new(ComponentConfig::application());
    h.command(Command::StateSet(Idle));
    h.command(Command::StateSet(Executing));
    h.settle();
    assert!(!h.saw(is_state_complete));
    assert_eq!(h.component.stats().backlogged, 1);

    let _buffers = h.allocate_all();
    h.wait_state(Executing);
    let completions: Vec<&Observed> = h
        .timeline
        .iter()
        .filter(|o| matches!(o, Observed::Event(e) if is_state_complete(e)))
        .collect();
    assert_eq!(
        completions,
        vec![
            &Observed::Event(Event::state_reached(Idle)),
            &Observed::Event(Event::state_reached(Executing)),
        ]
    );
}

#[test]
fn test_unreachable_transition_reports_error() {
    let mut h = Harness::new(ComponentConfig::application());
    h.command(Command::StateSet(Executing));
    h.wait_for(is_error(OmxError::IncorrectStateTransition));
    assert_eq!(h.component.get_state(), Loaded);
}

#[test]
fn test_pause_and_resume() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.set_state(Executing);
    h.set_state(Pause);
    h.set_state(Executing);

    let kinds = h.dsp.op_kinds();
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[ControlKind::Pause, ControlKind::Start]
    );
}

#[test]
fn test_buffers_queued_in_pause_resume_in_order() {
    let config = ComponentConfig::application().with_buffer_counts(2, 1);
    let mut h = Harness::new(config);
    let (inputs, _outputs) = h.idle();
    h.set_state(Executing);
    h.set_state(Pause);

    let mut ids = Vec::new();
    for mut input in inputs {
        fill_pcm(&mut input, INPUT_FRAME_SIZE);
        ids.push(input.id());
        h.component.empty_this_buffer(input).unwrap();
    }
    h.settle();
    assert!(h.returned_inputs.is_empty());
    for id in &ids {
        assert_eq!(h.component.buffer_owner(*id), Some(BufferOwner::Component));
    }
    assert_eq!(h.dsp.held(Direction::Input), 0);

    h.set_state(Executing);
    let done = h.wait_inputs(2);
    assert_eq!(done.iter().map(|b| b.id()).collect::<Vec<_>>(), ids);
    for id in &ids {
        assert_eq!(h.component.buffer_owner(*id), Some(BufferOwner::Client));
    }
}

#[test]
fn test_pause_from_idle_starts_bridge_on_resume() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.set_state(Pause);
    assert!(!h.dsp.op_kinds().contains(&ControlKind::Start));
    h.set_state(Executing);
    assert!(h.dsp.op_kinds().ends_with(&[ControlKind::AlgControl, ControlKind::Start]));
}

#[test]
fn test_wait_for_resources_needs_no_backend() {
    let mut h = Harness::new(ComponentConfig::application());
    h.set_state(WaitForResources);
    h.set_state(Loaded);
    assert!(h.dsp.ops().is_empty());
}

#[test]
fn test_explicit_invalid_is_terminal() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, _outputs) = h.idle();
    h.command(Command::StateSet(Invalid));
    h.wait_for(is_error(OmxError::InvalidState));
    assert_eq!(h.component.get_state(), Invalid);

    assert_eq!(
        h.component.send_command(Command::StateSet(Loaded)),
        Err(OmxError::InvalidState)
    );
    let rejected = h
        .component
        .empty_this_buffer(inputs.pop().unwrap())
        .unwrap_err();
    assert_eq!(rejected.error, OmxError::InvalidState);
    assert_eq!(
        h.component.get_parameter(ParamIndex::AudioInit),
        Err(OmxError::InvalidState)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFERS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_populated_flips_exactly_once() {
    let config = ComponentConfig::application().with_buffer_counts(3, 1);
    let h = Harness::new(config);

    let mut held = Vec::new();
    for n in 1..=3 {
        held.push(h.allocate(Direction::Input));
        assert_eq!(h.port_definition(Direction::Input).populated, n == 3);
    }
    let err = h
        .component
        .allocate_buffer(INPUT_PORT, INPUT_FRAME_SIZE)
        .unwrap_err();
    assert!(matches!(err, OmxError::BadParameter(_)));
    assert!(h.port_definition(Direction::Input).populated);
}

#[test]
fn test_empty_buffer_in_loaded_is_rejected() {
    let h = Harness::new(ComponentConfig::application());
    let header = h.allocate(Direction::Input);
    let id = header.id();

    let rejected = h.component.empty_this_buffer(header).unwrap_err();
    assert_eq!(rejected.error, OmxError::IncorrectStateOperation);
    assert_eq!(rejected.header.id(), id);
    assert_eq!(h.component.buffer_owner(id), Some(BufferOwner::Client));
}

#[test]
fn test_handoff_validation() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();

    // Output header on the input entry point
    let rejected = h
        .component
        .empty_this_buffer(outputs.pop().unwrap())
        .unwrap_err();
    assert_eq!(rejected.error, OmxError::BadPortIndex(OUTPUT_PORT));

    let mut input = inputs.pop().unwrap();
    input.offset = 100;
    input.filled_len = 100;
    let rejected = h.component.empty_this_buffer(input).unwrap_err();
    assert!(matches!(rejected.error, OmxError::BadParameter(_)));

    let mut input = rejected.header;
    input.offset = 0;
    input.version = omx_core::SpecVersion::new(1, 0, 0, 0);
    let rejected = h.component.empty_this_buffer(input).unwrap_err();
    assert_eq!(rejected.error, OmxError::VersionMismatch);
    assert_eq!(
        h.component.buffer_owner(rejected.header.id()),
        Some(BufferOwner::Client)
    );
}

#[test]
fn test_buffers_held_until_executing() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();

    let mut input = inputs.pop().unwrap();
    fill_pcm(&mut input, INPUT_FRAME_SIZE);
    let id = input.id();
    h.component.empty_this_buffer(input).unwrap();
    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();
    h.settle();
    assert!(h.returned_inputs.is_empty());
    assert_eq!(h.component.buffer_owner(id), Some(BufferOwner::Component));

    h.set_state(Executing);
    let done = h.wait_inputs(1);
    assert_eq!(done[0].id(), id);
    let out = h.wait_outputs(1);
    assert_eq!(out[0].filled_len, OUTPUT_FRAME_SIZE);
}

#[test]
fn test_pending_buffers_return_on_stop() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, _outputs) = h.idle();
    h.component
        .empty_this_buffer(inputs.pop().unwrap())
        .unwrap();
    h.set_state(Pause);
    h.set_state(Idle);
    let done = h.wait_inputs(1);
    assert_eq!(h.component.buffer_owner(done[0].id()), Some(BufferOwner::Client));
}

#[test]
fn test_free_on_populated_port_reports_unpopulated() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, _outputs) = h.idle();
    h.component
        .free_buffer(INPUT_PORT, inputs.pop().unwrap())
        .unwrap();
    h.wait_for(|e| {
        *e == Event::Error {
            error: OmxError::PortUnpopulated,
            data: INPUT_PORT,
        }
    });
    assert!(!h.port_definition(Direction::Input).populated);
}

#[test]
fn test_use_buffer_returns_client_memory() {
    let h = Harness::new(ComponentConfig::application());
    let header = h
        .component
        .use_buffer(INPUT_PORT, vec![7u8; INPUT_FRAME_SIZE])
        .unwrap();
    let memory = h.component.free_buffer(INPUT_PORT, header).unwrap();
    assert_eq!(memory, Some(vec![7u8; INPUT_FRAME_SIZE]));

    let small = h.component.use_buffer(INPUT_PORT, vec![0; 16]).unwrap_err();
    assert!(matches!(small, OmxError::BadParameter(_)));
    assert_eq!(
        h.component.allocate_buffer(5, 16).unwrap_err(),
        OmxError::BadPortIndex(5)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// FLUSH AND PORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_flush_returns_held_and_pending_before_completion() {
    let config = ComponentConfig::application().with_buffer_counts(3, 1);
    let mut h = Harness::with_sim(config, SimConfig::manual());
    let (inputs, _outputs) = h.idle();
    h.set_state(Executing);

    let mut inputs = inputs.into_iter();
    for _ in 0..2 {
        let mut input = inputs.next().unwrap();
        fill_pcm(&mut input, INPUT_FRAME_SIZE);
        h.component.empty_this_buffer(input).unwrap();
    }
    h.wait_until(|h| h.dsp.held(Direction::Input) == 2);

    h.set_state(Pause);
    h.component
        .empty_this_buffer(inputs.next().unwrap())
        .unwrap();

    h.command(Command::Flush(PortTarget::One(Direction::Input)));
    h.wait_cmd(CommandKind::Flush, INPUT_PORT);
    h.settle();

    let done_at = h
        .timeline
        .iter()
        .position(|o| {
            *o == Observed::Event(Event::port_done(CommandKind::Flush, Direction::Input))
        })
        .unwrap();
    let returned_before = h.timeline[..done_at]
        .iter()
        .filter(|o| matches!(o, Observed::EmptyDone(_)))
        .count();
    assert_eq!(returned_before, 3);

    let mut ids: Vec<_> = h.returned_inputs.iter().map(|b| b.id()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    for id in ids {
        assert_eq!(h.component.buffer_owner(id), Some(BufferOwner::Client));
    }
}

#[test]
fn test_flush_all_completes_each_port() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.command(Command::Flush(PortTarget::All));
    h.wait_cmd(CommandKind::Flush, INPUT_PORT);
    h.wait_cmd(CommandKind::Flush, OUTPUT_PORT);
}

#[test]
fn test_enable_completes_on_population() {
    let mut h = Harness::new(ComponentConfig::application());
    h.command(Command::PortDisable(PortTarget::All));
    h.wait_cmd(CommandKind::PortDisable, INPUT_PORT);
    h.wait_cmd(CommandKind::PortDisable, OUTPUT_PORT);

    // No enabled ports, so Idle needs no buffers
    h.set_state(Idle);
    h.command(Command::PortEnable(PortTarget::All));
    h.settle();
    assert!(!h.saw(|e| matches!(e, Event::CmdComplete { command: CommandKind::PortEnable, .. })));

    let _input = h
        .component
        .use_buffer(INPUT_PORT, vec![0; INPUT_FRAME_SIZE])
        .unwrap();
    h.wait_cmd(CommandKind::PortEnable, INPUT_PORT);
    let _output = h
        .component
        .use_buffer(OUTPUT_PORT, vec![0; OUTPUT_FRAME_SIZE])
        .unwrap();
    h.wait_cmd(CommandKind::PortEnable, OUTPUT_PORT);
    h.settle();

    for port in [INPUT_PORT, OUTPUT_PORT] {
        let done = Event::CmdComplete {
            command: CommandKind::PortEnable,
            data: port,
        };
        assert_eq!(h.count(|e| *e == done), 1);
    }
    assert!(h.port_definition(Direction::Input).populated);
    assert!(h.port_definition(Direction::Output).populated);
}

#[test]
fn test_disable_waits_for_buffers_to_be_freed() {
    let config = ComponentConfig::application().with_buffer_counts(1, 2);
    let mut h = Harness::new(config);
    let (_inputs, outputs) = h.idle();

    h.command(Command::PortDisable(PortTarget::One(Direction::Output)));
    h.settle();
    let disabled = |e: &Event| {
        *e == Event::CmdComplete {
            command: CommandKind::PortDisable,
            data: OUTPUT_PORT,
        }
    };
    assert!(!h.saw(disabled));

    let mut outputs = outputs.into_iter();
    h.component
        .free_buffer(OUTPUT_PORT, outputs.next().unwrap())
        .unwrap();
    h.settle();
    assert!(!h.saw(disabled));
    assert!(!h.saw(is_error(OmxError::PortUnpopulated)));

    h.component
        .free_buffer(OUTPUT_PORT, outputs.next().unwrap())
        .unwrap();
    h.wait_for(disabled);
    assert!(!h.port_definition(Direction::Output).enabled);
}

#[test]
fn test_disable_reclaims_buffers_from_bridge() {
    let mut h = Harness::with_sim(ComponentConfig::application(), SimConfig::manual());
    let (_inputs, mut outputs) = h.idle();
    h.set_state(Executing);

    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();
    h.wait_until(|h| h.dsp.held(Direction::Output) == 1);

    h.command(Command::PortDisable(PortTarget::One(Direction::Output)));
    let returned = h.wait_outputs(1);
    h.component
        .free_buffer(OUTPUT_PORT, returned.into_iter().next().unwrap())
        .unwrap();
    h.wait_cmd(CommandKind::PortDisable, OUTPUT_PORT);
}

#[test]
fn test_second_port_request_is_rejected() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.command(Command::PortDisable(PortTarget::One(Direction::Input)));
    h.command(Command::PortEnable(PortTarget::One(Direction::Input)));
    h.wait_for(|e| {
        *e == Event::Error {
            error: OmxError::IncorrectStateOperation,
            data: INPUT_PORT,
        }
    });
}

#[test]
fn test_allocation_waits_for_port_enable() {
    let mut h = Harness::new(ComponentConfig::application());
    h.command(Command::PortDisable(PortTarget::One(Direction::Output)));
    h.wait_cmd(CommandKind::PortDisable, OUTPUT_PORT);

    let component = &h.component;
    let header = thread::scope(|s| {
        let waiter = s.spawn(|| component.allocate_buffer(OUTPUT_PORT, OUTPUT_FRAME_SIZE));
        thread::sleep(Duration::from_millis(50));
        component
            .send_command(Command::PortEnable(PortTarget::One(Direction::Output)))
            .unwrap();
        waiter.join().unwrap()
    });
    assert!(header.is_ok());
    h.wait_cmd(CommandKind::PortEnable, OUTPUT_PORT);
}

#[test]
fn test_allocation_on_disabled_port_times_out() {
    let config =
        ComponentConfig::application().with_allocation_timeout(Duration::from_millis(100));
    let mut h = Harness::new(config);
    h.command(Command::PortDisable(PortTarget::One(Direction::Input)));
    h.wait_cmd(CommandKind::PortDisable, INPUT_PORT);

    assert_eq!(
        h.component
            .allocate_buffer(INPUT_PORT, INPUT_FRAME_SIZE)
            .unwrap_err(),
        OmxError::PortUnresponsiveDuringAllocation
    );
}

#[test]
fn test_bad_command_ports_are_rejected_synchronously() {
    let h = Harness::new(ComponentConfig::application());
    assert_eq!(
        h.component.send_raw_command(CommandKind::Flush, 7, None),
        Err(OmxError::BadPortIndex(7))
    );
    assert_eq!(
        h.component.send_command(Command::MarkBuffer {
            port: Direction::Output,
            mark: MarkData::for_self(1),
        }),
        Err(OmxError::BadPortIndex(OUTPUT_PORT))
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// BRIDGE FAILURES AND RESOURCES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_bridge_timeout_forces_invalid() {
    let config =
        ComponentConfig::application().with_control_timeout(Duration::from_millis(100));
    let mut h = Harness::new(config);
    let _buffers = h.idle();

    h.dsp.drop_ack(ControlKind::Start);
    h.command(Command::StateSet(Executing));
    h.wait_for(|e| matches!(e, Event::Error { error: OmxError::BridgeTimeout(_), .. }));
    h.settle();

    assert_eq!(h.component.get_state(), Invalid);
    assert_eq!(h.count(Event::is_error), 1);
    assert_eq!(
        h.component.send_command(Command::StateSet(Idle)),
        Err(OmxError::InvalidState)
    );
}

#[test]
fn test_control_failure_keeps_state() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();

    h.dsp.fail_next(ControlKind::Start);
    h.command(Command::StateSet(Executing));
    h.wait_for(|e| matches!(e, Event::Error { error: OmxError::Hardware(_), .. }));
    assert_eq!(h.component.get_state(), Idle);

    h.set_state(Executing);
}

#[test]
fn test_preemption_reports_resources_preempted() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.set_state(Executing);

    h.component
        .notify_resources(ResourceNotice::Preempted)
        .unwrap();
    h.wait_for(is_error(OmxError::ResourcesPreempted));
    assert_eq!(h.component.get_state(), Idle);

    // The client's own request now finds the component already there
    h.command(Command::StateSet(Idle));
    h.wait_for(is_error(OmxError::SameState));
    h.settle();
    assert_eq!(h.count(|e| *e == Event::state_reached(Idle)), 1);
}

#[test]
fn test_preemption_in_idle_is_ignored() {
    let mut h = Harness::new(ComponentConfig::application());
    let _buffers = h.idle();
    h.component
        .notify_resources(ResourceNotice::Preempted)
        .unwrap();
    h.settle();
    assert!(!h.saw(Event::is_error));
    assert_eq!(h.component.get_state(), Idle);
}

#[derive(Default)]
struct Gate {
    granted: AtomicBool,
    requests: AtomicUsize,
    releases: AtomicUsize,
}

impl ResourceManager for Gate {
    fn request(&self, _component: &str, _cpu_load: u32) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.granted.load(Ordering::SeqCst)
    }

    fn release(&self, _component: &str) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_denied_resources_wait_then_retry_idle() {
    let gate = Arc::new(Gate::default());
    let rm = Arc::clone(&gate);
    let mut h = Harness::build(
        ComponentConfig::application(),
        SimConfig::default(),
        move |builder| builder.with_resource_manager(rm),
    );
    let (inputs, outputs) = h.allocate_all();

    h.command(Command::StateSet(Idle));
    h.wait_for(|e| matches!(e, Event::Error { error: OmxError::InsufficientResources(_), .. }));
    assert_eq!(h.component.get_state(), WaitForResources);
    assert!(h.dsp.ops().is_empty());

    gate.granted.store(true, Ordering::SeqCst);
    h.component.notify_resources(ResourceNotice::Acquired).unwrap();
    h.wait_for(|e| *e == Event::ResourcesAcquired);
    h.wait_state(Idle);
    assert_eq!(gate.requests.load(Ordering::SeqCst), 2);

    h.unload(inputs.into_iter().chain(outputs).collect());
    assert_eq!(gate.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn test_same_state_keeps_pending_resource_retry() {
    let gate = Arc::new(Gate::default());
    let rm = Arc::clone(&gate);
    let mut h = Harness::build(
        ComponentConfig::application(),
        SimConfig::default(),
        move |builder| builder.with_resource_manager(rm),
    );
    let _buffers = h.allocate_all();

    h.command(Command::StateSet(Idle));
    h.wait_for(|e| matches!(e, Event::Error { error: OmxError::InsufficientResources(_), .. }));
    h.command(Command::StateSet(WaitForResources));
    h.wait_for(is_error(OmxError::SameState));

    gate.granted.store(true, Ordering::SeqCst);
    h.component.notify_resources(ResourceNotice::Acquired).unwrap();
    h.wait_state(Idle);
    assert_eq!(gate.requests.load(Ordering::SeqCst), 2);
}

/// Resource manager that reads component parameters from inside its hooks
#[derive(Default)]
struct Inspecting {
    component: OnceLock<Weak<EncoderComponent>>,
    lookups: AtomicUsize,
}

impl Inspecting {
    fn look(&self) {
        let Some(component) = self.component.get().and_then(Weak::upgrade) else {
            return;
        };
        if component.get_parameter(ParamIndex::AudioInit).is_ok() {
            self.lookups.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ResourceManager for Inspecting {
    fn request(&self, _component: &str, _cpu_load: u32) -> bool {
        self.look();
        true
    }

    fn release(&self, _component: &str) {
        self.look();
    }
}

fn wait_event(rx: &Receiver<ClientMessage>, expected: &Event) {
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(left) {
            Ok(ClientMessage::Event(event)) if event == *expected => return,
            Ok(_) => {}
            Err(err) => panic!("no {expected:?}: {err}"),
        }
    }
}

#[test]
fn test_resource_manager_may_call_into_component() {
    common::init_logging();
    let rm = Arc::new(Inspecting::default());
    let (tx, rx) = unbounded();
    let component = Arc::new(
        EncoderComponent::builder(
            ComponentConfig::application(),
            Box::new(SimulatedDsp::default()),
            Arc::new(ChannelCallbacks::new(tx)),
        )
        .with_resource_manager(Arc::clone(&rm) as Arc<dyn ResourceManager>)
        .init()
        .unwrap(),
    );
    let _ = rm.component.set(Arc::downgrade(&component));

    component.send_command(Command::StateSet(Idle)).unwrap();
    let input = component.allocate_buffer(INPUT_PORT, INPUT_FRAME_SIZE).unwrap();
    let output = component.allocate_buffer(OUTPUT_PORT, OUTPUT_FRAME_SIZE).unwrap();
    wait_event(&rx, &Event::state_reached(Idle));

    component.send_command(Command::StateSet(Loaded)).unwrap();
    component.free_buffer(INPUT_PORT, input).unwrap();
    component.free_buffer(OUTPUT_PORT, output).unwrap();
    wait_event(&rx, &Event::state_reached(Loaded));

    assert_eq!(rm.lookups.load(Ordering::SeqCst), 2);
}

/// Callbacks that issue two commands from inside the first Idle completion
struct Reentrant {
    tx: Sender<Event>,
    component: OnceLock<Weak<EncoderComponent>>,
    fired: AtomicBool,
}

impl ClientCallbacks for Reentrant {
    fn on_event(&self, event: Event) {
        if event == Event::state_reached(WaitForResources) && !self.fired.swap(true, Ordering::SeqCst)
        {
            if let Some(component) = self.component.get().and_then(Weak::upgrade) {
                component.send_command(Command::StateSet(Loaded)).unwrap();
                component.send_command(Command::StateSet(Loaded)).unwrap();
            }
        }
        let _ = self.tx.send(event);
    }

    fn empty_buffer_done(&self, _header: omx_core::BufferHeader) {}

    fn fill_buffer_done(&self, _header: omx_core::BufferHeader) {}
}

#[test]
fn test_callbacks_can_submit_past_queue_capacity() {
    common::init_logging();
    let (tx, rx) = unbounded();
    let callbacks = Arc::new(Reentrant {
        tx,
        component: OnceLock::new(),
        fired: AtomicBool::new(false),
    });
    let component = Arc::new(
        EncoderComponent::init(
            ComponentConfig::application().with_command_capacity(1),
            Box::new(SimulatedDsp::default()),
            Arc::clone(&callbacks) as Arc<dyn ClientCallbacks>,
        )
        .unwrap(),
    );
    let _ = callbacks.component.set(Arc::downgrade(&component));

    component
        .send_command(Command::StateSet(WaitForResources))
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match rx.recv_timeout(WAIT) {
            Ok(event) => seen.push(event),
            Err(_) => panic!("dispatch loop stalled; saw {seen:?}"),
        }
    }
    assert_eq!(
        seen,
        vec![
            Event::state_reached(WaitForResources),
            Event::state_reached(Loaded),
            Event::error(OmxError::SameState),
        ]
    );
    assert_eq!(component.get_state(), Loaded);
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAM FEATURES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_eos_and_timestamp_reach_output() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();
    h.set_state(Executing);

    let mut input = inputs.pop().unwrap();
    fill_pcm(&mut input, INPUT_FRAME_SIZE);
    input.flags = BufferFlags::EOS;
    input.timestamp = 4_242;
    input.tick_count = 9;

    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();
    h.component.empty_this_buffer(input).unwrap();

    let out = h.wait_outputs(1);
    assert_eq!(out[0].filled_len, OUTPUT_FRAME_SIZE);
    assert!(out[0].flags.contains(BufferFlags::EOS));
    assert_eq!(out[0].timestamp, 4_242);
    assert_eq!(out[0].tick_count, 9);
    h.wait_for(|e| {
        matches!(e, Event::BufferFlag { port: Direction::Output, flags } if flags.contains(BufferFlags::EOS))
    });
    h.wait_inputs(1);
}

#[test]
fn test_mime_mode_drops_frame_header() {
    let mut h = Harness::new(ComponentConfig::application().with_mime(true));
    let (mut inputs, mut outputs) = h.idle();
    h.set_state(Executing);

    let mut input = inputs.pop().unwrap();
    fill_pcm(&mut input, INPUT_FRAME_SIZE);
    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();
    h.component.empty_this_buffer(input).unwrap();
    let out = h.wait_outputs(1);
    assert_eq!(out[0].filled_len, omx_core::OUTPUT_FRAME_SIZE_MIME);
}

#[test]
fn test_mark_for_self_raises_event() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();
    h.set_state(Executing);

    let mark = MarkData::for_self(0xfeed);
    h.command(Command::MarkBuffer {
        port: Direction::Input,
        mark,
    });
    h.wait_cmd(CommandKind::MarkBuffer, INPUT_PORT);

    let mut input = inputs.pop().unwrap();
    fill_pcm(&mut input, INPUT_FRAME_SIZE);
    h.component.empty_this_buffer(input).unwrap();
    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();
    h.wait_for(|e| *e == Event::Mark(mark));
    let out = h.wait_outputs(1);
    assert_eq!(out[0].mark, None);
}

#[test]
fn test_downstream_mark_travels_to_output() {
    let mut h = Harness::new(ComponentConfig::application());
    let (mut inputs, mut outputs) = h.idle();
    h.set_state(Executing);

    let mark = MarkData::downstream(3, 77);
    let mut input = inputs.pop().unwrap();
    fill_pcm(&mut input, INPUT_FRAME_SIZE);
    input.mark = Some(mark);
    h.component.empty_this_buffer(input).unwrap();
    h.component.fill_this_buffer(outputs.pop().unwrap()).unwrap();

    let out = h.wait_outputs(1);
    assert_eq!(out[0].mark, Some(mark));
    assert!(!h.saw(|e| matches!(e, Event::Mark(_))));
}

#[test]
fn test_streaming_play_completed_flags_eos() {
    let mut h = Harness::new(ComponentConfig::streaming(7));
    let _buffers = h.idle();
    h.set_state(Executing);
    h.dsp.finish_stream();
    h.wait_for(|e| {
        *e == Event::BufferFlag {
            port: Direction::Output,
            flags: BufferFlags::EOS,
        }
    });
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATA PATH
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_streaming_without_stream_id_goes_invalid() {
    let mut h = Harness::new(ComponentConfig::streaming(0));
    let _buffers = h.allocate_all();
    h.command(Command::StateSet(Idle));
    h.wait_for(is_error(OmxError::InvalidState));
    assert_eq!(h.component.get_state(), Invalid);
    assert!(h.dsp.ops().is_empty());
}

#[test]
fn test_streaming_start_sends_codec_params() {
    let mut h = Harness::new(ComponentConfig::streaming(7));
    let _buffers = h.idle();
    h.set_state(Executing);

    assert!(h.dsp.ops().contains(&ControlOp::StreamControl(
        StreamCommand::CodecParams {
            stream_id: 7,
            sample_rate: 8000,
            channels: 1,
        }
    )));
    assert_eq!(h.component.device_string(), "/mmmixer/encoder/7");
}

#[test]
fn test_mode_config_switches_strategy_in_loaded() {
    let mut h = Harness::new(ComponentConfig::application());
    let index = h.component.get_extension_index(EXTENSION_STREAM_ID).unwrap();
    assert_eq!(index, ConfigIndex::StreamId);

    h.component
        .set_config(Config::ModeConfig(DspDefinition {
            dasf_mode: 2,
            acoustic_mode: false,
            stream_id: 5,
        }))
        .unwrap();
    assert_eq!(h.component.device_string(), "/rtmixer/encoder");
    assert_eq!(
        h.component.get_config(ConfigIndex::ModeConfig),
        Ok(Config::ModeConfig(DspDefinition {
            dasf_mode: 2,
            acoustic_mode: false,
            stream_id: 5,
        }))
    );

    let _buffers = h.idle();
    assert_eq!(
        h.component.set_config(Config::ModeConfig(DspDefinition::default())),
        Err(OmxError::IncorrectStateOperation)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_parameters_follow_state_rules() {
    let mut h = Harness::new(ComponentConfig::application());

    let mut def = h.port_definition(Direction::Input);
    def.buffer_count_actual = 2;
    h.component
        .set_parameter(Param::PortDefinition(def.clone()))
        .unwrap();
    assert_eq!(h.port_definition(Direction::Input).buffer_count_actual, 2);

    assert_eq!(
        h.component.get_parameter(ParamIndex::AudioPortFormat {
            port: Direction::Output,
            index: 0,
        }),
        Ok(Param::AudioPortFormat(omx_core::AudioPortFormat {
            port: Direction::Output,
            index: 0,
            encoding: AudioCoding::G729,
        }))
    );
    assert_eq!(
        h.component.get_parameter(ParamIndex::AudioPortFormat {
            port: Direction::Output,
            index: 1,
        }),
        Err(OmxError::NoMore)
    );
    assert_eq!(
        h.component.get_parameter(ParamIndex::Other(0x7f00_0000)),
        Err(OmxError::UnsupportedIndex)
    );
    assert!(matches!(
        h.component.get_parameter(ParamIndex::ComponentRole),
        Err(OmxError::BadParameter(_))
    ));

    h.config.input.buffer_count = 2;
    let _buffers = h.idle();
    assert_eq!(
        h.component.set_parameter(Param::PortDefinition(def)),
        Err(OmxError::IncorrectStateOperation)
    );
    assert_eq!(
        h.component.component_role_enum(0),
        Err(OmxError::NotImplemented)
    );
    assert_eq!(
        h.component.component_tunnel_request(OUTPUT_PORT),
        Err(OmxError::NotImplemented)
    );
    assert_eq!(h.component.get_component_version().name, "OMX.TI.G729.encode");
}

#[test]
fn test_dtx_parameter_reaches_bridge() {
    let mut h = Harness::new(ComponentConfig::application());
    let Ok(Param::G729(mut g729)) = h.component.get_parameter(ParamIndex::G729(Direction::Output))
    else {
        panic!("G729 parameter missing");
    };
    g729.dtx = true;
    h.component.set_parameter(Param::G729(g729)).unwrap();

    let _buffers = h.idle();
    h.set_state(Executing);
    assert!(h.dsp.ops().iter().any(|op| matches!(op, ControlOp::AlgControl(p) if p.dtx)));
}
