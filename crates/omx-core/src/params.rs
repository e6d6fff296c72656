//! Parameter and config structures (`OMX_IndexParam*` / `OMX_IndexConfig*`)

use serde::{Deserialize, Serialize};

use crate::port::{Direction, NUM_PORTS};

/// PCM bytes per input frame (80 samples of 16-bit mono at 8 kHz)
pub const INPUT_FRAME_SIZE: usize = 160;
/// Encoded bytes per output frame: frame-type header plus payload
pub const OUTPUT_FRAME_SIZE: usize = 12;
/// Encoded bytes per output frame in MIME storage format
pub const OUTPUT_FRAME_SIZE_MIME: usize = 10;
/// Codec sampling rate
pub const SAMPLING_FREQUENCY: u32 = 8000;
/// Upper bound on buffers registered per port
pub const MAX_BUFFERS_PER_PORT: u32 = 10;

/// Vendor extension names resolvable through GetExtensionIndex
pub const EXTENSION_MODE_CONFIG: &str = "OMX.TI.index.config.tispecific";
pub const EXTENSION_HEADER_INFO: &str = "OMX.TI.index.config.g729headerinfo";
pub const EXTENSION_STREAM_ID: &str = "OMX.TI.index.config.G729streamIDinfo";
pub const EXTENSION_DATA_PATH: &str = "OMX.TI.index.config.g729.datapath";

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// `OMX_AUDIO_CODINGTYPE` subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCoding {
    Unused,
    Pcm,
    G729,
}

/// `OMX_PARAM_PORTDEFINITIONTYPE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub port: Direction,
    pub enabled: bool,
    /// Read-only, maintained by the buffer ledger
    pub populated: bool,
    pub buffer_count_actual: u32,
    /// Read-only
    pub buffer_count_min: u32,
    pub buffer_size: usize,
    pub encoding: AudioCoding,
    pub buffer_alignment: usize,
}

impl PortDefinition {
    pub fn input(buffer_count: u32, buffer_size: usize) -> Self {
        Self {
            port: Direction::Input,
            enabled: true,
            populated: false,
            buffer_count_actual: buffer_count,
            buffer_count_min: buffer_count,
            buffer_size,
            encoding: AudioCoding::Pcm,
            buffer_alignment: crate::memory::DEFAULT_ALIGNMENT,
        }
    }

    pub fn output(buffer_count: u32, buffer_size: usize) -> Self {
        Self {
            port: Direction::Output,
            encoding: AudioCoding::G729,
            ..Self::input(buffer_count, buffer_size)
        }
    }
}

/// `OMX_AUDIO_PARAM_PORTFORMATTYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPortFormat {
    pub port: Direction,
    /// Enumeration index; only 0 exists
    pub index: u32,
    pub encoding: AudioCoding,
}

/// `OMX_AUDIO_PARAM_PCMMODETYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmParams {
    pub port: Direction,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    pub signed: bool,
    pub interleaved: bool,
    pub linear: bool,
}

impl Default for PcmParams {
    fn default() -> Self {
        Self {
            port: Direction::Input,
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 44100,
            signed: true,
            interleaved: true,
            linear: true,
        }
    }
}

/// G.729 bitstream variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum G729Variant {
    G729,
    G729A,
}

/// `OMX_AUDIO_PARAM_G729TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct G729Params {
    pub port: Direction,
    pub channels: u32,
    /// Discontinuous transmission (voice activity detection)
    pub dtx: bool,
    pub variant: G729Variant,
}

impl Default for G729Params {
    fn default() -> Self {
        Self {
            port: Direction::Output,
            channels: 1,
            dtx: false,
            variant: G729Variant::G729,
        }
    }
}

/// `OMX_PRIORITYMGMTTYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMgmt {
    pub group_priority: i32,
    pub group_id: i32,
}

impl Default for PriorityMgmt {
    fn default() -> Self {
        Self {
            group_priority: -1,
            group_id: -1,
        }
    }
}

/// `OMX_PORT_PARAM_TYPE` for `OMX_IndexParamAudioInit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortParam {
    pub ports: u32,
    pub start_port: u32,
}

impl Default for PortParam {
    fn default() -> Self {
        Self {
            ports: NUM_PORTS as u32,
            start_port: 0,
        }
    }
}

/// `OMX_BUFFERSUPPLIERTYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferSupplier {
    Unspecified,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSupplierParam {
    pub port: Direction,
    pub supplier: BufferSupplier,
}

/// Which parameter GetParameter should report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamIndex {
    PortDefinition(Direction),
    AudioPortFormat { port: Direction, index: u32 },
    Pcm(Direction),
    G729(Direction),
    PriorityMgmt,
    AudioInit,
    BufferSupplier(Direction),
    ComponentRole,
    /// Any index the component does not know
    Other(u32),
}

/// A parameter value, as read or written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    PortDefinition(PortDefinition),
    AudioPortFormat(AudioPortFormat),
    Pcm(PcmParams),
    G729(G729Params),
    PriorityMgmt(PriorityMgmt),
    AudioInit(PortParam),
    BufferSupplier(BufferSupplierParam),
    ComponentRole(String),
}

impl Param {
    pub fn index(&self) -> ParamIndex {
        match self {
            Param::PortDefinition(def) => ParamIndex::PortDefinition(def.port),
            Param::AudioPortFormat(fmt) => ParamIndex::AudioPortFormat {
                port: fmt.port,
                index: fmt.index,
            },
            Param::Pcm(pcm) => ParamIndex::Pcm(pcm.port),
            Param::G729(g729) => ParamIndex::G729(g729.port),
            Param::PriorityMgmt(_) => ParamIndex::PriorityMgmt,
            Param::AudioInit(_) => ParamIndex::AudioInit,
            Param::BufferSupplier(sup) => ParamIndex::BufferSupplier(sup.port),
            Param::ComponentRole(_) => ParamIndex::ComponentRole,
        }
    }

    /// Port a port-scoped parameter applies to
    pub fn port(&self) -> Option<Direction> {
        match self.index() {
            ParamIndex::PortDefinition(port)
            | ParamIndex::AudioPortFormat { port, .. }
            | ParamIndex::Pcm(port)
            | ParamIndex::G729(port)
            | ParamIndex::BufferSupplier(port) => Some(port),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Vendor index base for the encoder's custom configs
pub const VENDOR_INDEX_BASE: u32 = 0xFF00_0001;

/// `TI_OMX_DSP_DEFINITION` as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DspDefinition {
    /// 0 = application data path, 1 = DASF, 2 = DASF through the RT mixer
    pub dasf_mode: u32,
    pub acoustic_mode: bool,
    pub stream_id: u32,
}

/// `TI_OMX_DATAPATH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataPath {
    Application,
    ApplicationRtMixer,
}

impl Default for DataPath {
    fn default() -> Self {
        DataPath::Application
    }
}

/// `OMX_AUDIO_CONFIG_VOLUMETYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub port: Direction,
    pub linear: bool,
    pub value: i32,
}

/// Which config GetConfig should report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIndex {
    /// `OMX.TI.index.config.tispecific`
    ModeConfig,
    /// `OMX.TI.index.config.g729headerinfo`
    HeaderInfo,
    /// `OMX.TI.index.config.G729streamIDinfo`
    StreamId,
    /// `OMX.TI.index.config.g729.datapath`
    DataPath,
    Volume(Direction),
    Other(u32),
}

impl ConfigIndex {
    /// Raw vendor index value
    pub fn vendor_value(self) -> Option<u32> {
        match self {
            ConfigIndex::ModeConfig => Some(VENDOR_INDEX_BASE),
            ConfigIndex::HeaderInfo => Some(VENDOR_INDEX_BASE + 1),
            ConfigIndex::StreamId => Some(VENDOR_INDEX_BASE + 2),
            ConfigIndex::DataPath => Some(VENDOR_INDEX_BASE + 3),
            _ => None,
        }
    }

    /// Resolve a vendor extension name
    pub fn from_extension(name: &str) -> Option<Self> {
        match name {
            EXTENSION_MODE_CONFIG => Some(ConfigIndex::ModeConfig),
            EXTENSION_HEADER_INFO => Some(ConfigIndex::HeaderInfo),
            EXTENSION_STREAM_ID => Some(ConfigIndex::StreamId),
            EXTENSION_DATA_PATH => Some(ConfigIndex::DataPath),
            _ => None,
        }
    }
}

/// A config value, as read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Config {
    ModeConfig(DspDefinition),
    HeaderInfo(DspDefinition),
    StreamId(u32),
    DataPath(DataPath),
    Volume(VolumeConfig),
}

impl Config {
    pub fn index(&self) -> ConfigIndex {
        match self {
            Config::ModeConfig(_) => ConfigIndex::ModeConfig,
            Config::HeaderInfo(_) => ConfigIndex::HeaderInfo,
            Config::StreamId(_) => ConfigIndex::StreamId,
            Config::DataPath(_) => ConfigIndex::DataPath,
            Config::Volume(vol) => ConfigIndex::Volume(vol.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_indices() {
        assert_eq!(
            ConfigIndex::from_extension("OMX.TI.index.config.g729.datapath"),
            Some(ConfigIndex::DataPath)
        );
        assert_eq!(ConfigIndex::from_extension("OMX.TI.index.nope"), None);
        assert_eq!(ConfigIndex::ModeConfig.vendor_value(), Some(0xFF00_0001));
        assert_eq!(ConfigIndex::DataPath.vendor_value(), Some(0xFF00_0004));
    }

    #[test]
    fn test_param_port() {
        let def = PortDefinition::output(1, OUTPUT_FRAME_SIZE);
        assert_eq!(def.encoding, AudioCoding::G729);
        assert_eq!(
            Param::PortDefinition(def).port(),
            Some(Direction::Output)
        );
        assert_eq!(Param::PriorityMgmt(PriorityMgmt::default()).port(), None);
    }
}
