//! Component configuration, resolved once at construction

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OmxError, OmxResult};
use crate::memory::DEFAULT_ALIGNMENT;
use crate::params::{
    INPUT_FRAME_SIZE, MAX_BUFFERS_PER_PORT, OUTPUT_FRAME_SIZE, OUTPUT_FRAME_SIZE_MIME,
};
use crate::version::SpecVersion;

/// Where PCM input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPathMode {
    /// Client fills input buffers (file/application mode)
    Application,
    /// DSP audio streaming framework: capture routed by the audio manager
    Streaming {
        /// Route through the real-time mixer
        rt_mixer: bool,
    },
}

impl Default for DataPathMode {
    fn default() -> Self {
        DataPathMode::Application
    }
}

impl DataPathMode {
    pub fn is_streaming(self) -> bool {
        matches!(self, DataPathMode::Streaming { .. })
    }
}

/// Buffer requirements of one port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Buffers that must be registered before the port counts as populated
    pub buffer_count: u32,
    /// Minimum size of each buffer in bytes
    pub buffer_size: usize,
}

/// Complete component configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Name reported by GetComponentVersion
    #[serde(default = "default_component_name")]
    pub component_name: String,

    /// Input data path
    #[serde(default)]
    pub data_path: DataPathMode,

    /// Audio manager stream id (required in streaming mode)
    #[serde(default)]
    pub stream_id: u32,

    /// Acoustic front-end processing on the DSP
    #[serde(default)]
    pub acoustic_mode: bool,

    /// Input port buffers
    pub input: PortConfig,

    /// Output port buffers
    pub output: PortConfig,

    /// Emit MIME storage frames (no frame-type header)
    #[serde(default)]
    pub mime_mode: bool,

    /// Start with discontinuous transmission enabled
    #[serde(default)]
    pub dtx: bool,

    /// Bounded capacity of the client work channel
    pub command_capacity: usize,

    /// Deadline for a bridge Control() acknowledgement
    pub control_timeout_ms: u64,

    /// How long AllocateBuffer/UseBuffer wait for a disabled port
    pub allocation_timeout_ms: u64,

    /// Alignment of ledger-allocated buffers
    pub buffer_alignment: usize,

    /// IL structure version
    #[serde(default)]
    pub version: SpecVersion,
}

fn default_component_name() -> String {
    "OMX.TI.G729.encode".to_string()
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            component_name: default_component_name(),
            data_path: DataPathMode::Application,
            stream_id: 0,
            acoustic_mode: false,
            input: PortConfig {
                buffer_count: 1,
                buffer_size: INPUT_FRAME_SIZE,
            },
            output: PortConfig {
                buffer_count: 1,
                buffer_size: OUTPUT_FRAME_SIZE,
            },
            mime_mode: false,
            dtx: false,
            command_capacity: 64,
            control_timeout_ms: 1000,
            allocation_timeout_ms: 5000,
            buffer_alignment: DEFAULT_ALIGNMENT,
            version: SpecVersion::COMPONENT,
        }
    }
}

impl ComponentConfig {
    /// Application data path preset (client supplies PCM)
    pub fn application() -> Self {
        Self::default()
    }

    /// Streaming preset; capture is routed by the audio manager
    pub fn streaming(stream_id: u32) -> Self {
        Self {
            data_path: DataPathMode::Streaming { rt_mixer: false },
            stream_id,
            input: PortConfig {
                buffer_count: 2,
                buffer_size: INPUT_FRAME_SIZE,
            },
            ..Self::default()
        }
    }

    pub fn with_buffer_counts(mut self, input: u32, output: u32) -> Self {
        self.input.buffer_count = input;
        self.output.buffer_count = output;
        self
    }

    pub fn with_buffer_sizes(mut self, input: usize, output: usize) -> Self {
        self.input.buffer_size = input;
        self.output.buffer_size = output;
        self
    }

    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_mime(mut self, enabled: bool) -> Self {
        self.mime_mode = enabled;
        if enabled && self.output.buffer_size == OUTPUT_FRAME_SIZE {
            self.output.buffer_size = OUTPUT_FRAME_SIZE_MIME;
        }
        self
    }

    pub fn with_dtx(mut self, enabled: bool) -> Self {
        self.dtx = enabled;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_allocation_timeout(mut self, timeout: Duration) -> Self {
        self.allocation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn allocation_timeout(&self) -> Duration {
        Duration::from_millis(self.allocation_timeout_ms)
    }

    /// Encoded bytes produced per input frame
    pub fn output_frame_size(&self) -> usize {
        if self.mime_mode {
            OUTPUT_FRAME_SIZE_MIME
        } else {
            OUTPUT_FRAME_SIZE
        }
    }

    /// Load from TOML string
    pub fn from_toml(toml_str: &str) -> OmxResult<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| OmxError::bad_parameter(format!("config: {e}")))?;
        config.validate()?;
        log::debug!(
            "Loaded config for {} ({:?}, {}x{} buffers)",
            config.component_name,
            config.data_path,
            config.input.buffer_count,
            config.output.buffer_count
        );
        Ok(config)
    }

    /// Save to TOML string
    pub fn to_toml(&self) -> OmxResult<String> {
        toml::to_string_pretty(self).map_err(|e| OmxError::bad_parameter(format!("config: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> OmxResult<()> {
        for (name, port) in [("input", &self.input), ("output", &self.output)] {
            if port.buffer_count == 0 || port.buffer_count > MAX_BUFFERS_PER_PORT {
                return Err(OmxError::bad_parameter(format!(
                    "{name} buffer_count must be in 1..={MAX_BUFFERS_PER_PORT}"
                )));
            }
            if port.buffer_size == 0 {
                return Err(OmxError::bad_parameter(format!(
                    "{name} buffer_size cannot be zero"
                )));
            }
        }
        if self.output.buffer_size < self.output_frame_size() {
            return Err(OmxError::bad_parameter(format!(
                "output buffer_size {} is smaller than one encoded frame ({})",
                self.output.buffer_size,
                self.output_frame_size()
            )));
        }
        if self.command_capacity == 0 {
            return Err(OmxError::bad_parameter("command_capacity cannot be zero"));
        }
        if self.control_timeout_ms == 0 {
            return Err(OmxError::bad_parameter("control_timeout_ms cannot be zero"));
        }
        if !self.buffer_alignment.is_power_of_two() {
            return Err(OmxError::bad_parameter(
                "buffer_alignment must be a power of two",
            ));
        }
        Ok(())
    }
}
