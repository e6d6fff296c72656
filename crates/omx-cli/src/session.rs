//! Client side of one component instance

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

use omx_bridge::SimulatedDsp;
use omx_component::{ChannelCallbacks, ClientMessage, EncoderComponent};
use omx_core::{
    BufferHeader, Command, CommandKind, ComponentConfig, ComponentState, Direction, Event,
};

/// How long to wait for any callback before giving up
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) enum Done {
    Input(BufferHeader),
    Output(BufferHeader),
}

pub(crate) struct Session {
    pub component: EncoderComponent,
    rx: Receiver<ClientMessage>,
    pub free_inputs: Vec<BufferHeader>,
    pub free_outputs: Vec<BufferHeader>,
    /// Last StateSet completion not yet consumed
    reached: Option<ComponentState>,
}

impl Session {
    pub fn open(config: ComponentConfig) -> Result<Self> {
        let (tx, rx) = unbounded();
        let component = EncoderComponent::init(
            config,
            Box::new(SimulatedDsp::default()),
            Arc::new(ChannelCallbacks::new(tx)),
        )
        .context("initialising the encoder component")?;
        Ok(Self {
            component,
            rx,
            free_inputs: Vec::new(),
            free_outputs: Vec::new(),
            reached: None,
        })
    }

    /// Allocate every buffer the ports need
    pub fn allocate(&mut self) -> Result<()> {
        let config = self.component.config().clone();
        for _ in 0..config.input.buffer_count {
            let header = self
                .component
                .allocate_buffer(Direction::Input.index(), config.input.buffer_size)?;
            self.free_inputs.push(header);
        }
        for _ in 0..config.output.buffer_count {
            let header = self
                .component
                .allocate_buffer(Direction::Output.index(), config.output.buffer_size)?;
            self.free_outputs.push(header);
        }
        Ok(())
    }

    pub fn free_all(&mut self) -> Result<()> {
        for header in self.free_inputs.drain(..).chain(self.free_outputs.drain(..)) {
            let port = header.port().index();
            self.component.free_buffer(port, header)?;
        }
        Ok(())
    }

    pub fn request(&self, state: ComponentState) -> Result<()> {
        self.component.send_command(Command::StateSet(state))?;
        Ok(())
    }

    /// Wait for the StateSet completion, collecting returned buffers meanwhile
    pub fn wait_state(&mut self, state: ComponentState) -> Result<()> {
        loop {
            match self.next()? {
                Some(Done::Input(header)) => self.free_inputs.push(header),
                Some(Done::Output(header)) => self.free_outputs.push(header),
                None => {}
            }
            if self.reached == Some(state) {
                self.reached = None;
                return Ok(());
            }
        }
    }

    /// Next buffer callback. Events are handled here: errors abort, state
    /// completions are remembered for [`Session::wait_state`].
    pub fn next(&mut self) -> Result<Option<Done>> {
        let msg = match self.rx.recv_timeout(CALLBACK_TIMEOUT) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => bail!(
                "no callback within {CALLBACK_TIMEOUT:?} (component in {})",
                self.component.get_state()
            ),
            Err(RecvTimeoutError::Disconnected) => bail!("component callbacks closed"),
        };
        match msg {
            ClientMessage::EmptyBufferDone(header) => Ok(Some(Done::Input(header))),
            ClientMessage::FillBufferDone(header) => Ok(Some(Done::Output(header))),
            ClientMessage::Event(Event::Error { error, data }) => {
                Err(anyhow!(error).context(format!("component error (data {data})")))
            }
            ClientMessage::Event(Event::CmdComplete {
                command: CommandKind::StateSet,
                data,
            }) => {
                let state = ComponentState::from_raw(data)?;
                log::info!("Component reached {state}");
                self.reached = Some(state);
                Ok(None)
            }
            ClientMessage::Event(event) => {
                log::debug!("Event {event:?}");
                Ok(None)
            }
        }
    }
}
