//! Data-path strategies
//!
//! The application path takes PCM from client buffers; the streaming path
//! has capture routed to the DSP by the audio manager and needs a stream id
//! plus codec setup before the bridge starts.

use omx_bridge::{ControlOp, StreamCommand};
use omx_core::{DataPath, DataPathMode, OmxError, OmxResult, PcmParams, SAMPLING_FREQUENCY};

/// Data-path settings that can change through SetConfig while Loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSettings {
    pub mode: DataPathMode,
    pub stream_id: u32,
    pub acoustic_mode: bool,
    pub data_path: DataPath,
}

pub trait DataPathStrategy: Send + Sync {
    fn mode(&self) -> DataPathMode;

    /// Checked before the component acquires resources on the way to Idle
    fn check_idle(&self, settings: &PathSettings) -> OmxResult<()>;

    /// Bridge opcodes issued between algorithm setup and Start
    fn start_commands(&self, settings: &PathSettings, pcm: &PcmParams) -> Vec<ControlOp>;

    /// Audio-manager device the stream is attached to
    fn device_string(&self, settings: &PathSettings) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicationPath;

impl DataPathStrategy for ApplicationPath {
    fn mode(&self) -> DataPathMode {
        DataPathMode::Application
    }

    fn check_idle(&self, _settings: &PathSettings) -> OmxResult<()> {
        Ok(())
    }

    fn start_commands(&self, _settings: &PathSettings, _pcm: &PcmParams) -> Vec<ControlOp> {
        Vec::new()
    }

    fn device_string(&self, settings: &PathSettings) -> String {
        match settings.data_path {
            DataPath::Application => format!("/mmmixer/encoder/{}", settings.stream_id),
            DataPath::ApplicationRtMixer => "/rtmixer/encoder".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingPath {
    pub rt_mixer: bool,
}

impl DataPathStrategy for StreamingPath {
    fn mode(&self) -> DataPathMode {
        DataPathMode::Streaming {
            rt_mixer: self.rt_mixer,
        }
    }

    fn check_idle(&self, settings: &PathSettings) -> OmxResult<()> {
        if settings.stream_id == 0 {
            log::error!("Streaming mode requires a stream id from the audio manager");
            return Err(OmxError::InvalidState);
        }
        Ok(())
    }

    fn start_commands(&self, settings: &PathSettings, _pcm: &PcmParams) -> Vec<ControlOp> {
        // The DSP captures at the codec rate regardless of the PCM port setting
        vec![ControlOp::StreamControl(StreamCommand::CodecParams {
            stream_id: settings.stream_id,
            sample_rate: SAMPLING_FREQUENCY,
            channels: 1,
        })]
    }

    fn device_string(&self, settings: &PathSettings) -> String {
        if self.rt_mixer {
            "/rtmixer/encoder".to_string()
        } else {
            format!("/mmmixer/encoder/{}", settings.stream_id)
        }
    }
}

/// Pick the strategy for a data-path mode
pub fn resolve(mode: DataPathMode) -> Box<dyn DataPathStrategy> {
    match mode {
        DataPathMode::Application => Box::new(ApplicationPath),
        DataPathMode::Streaming { rt_mixer } => Box::new(StreamingPath { rt_mixer }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: DataPathMode, stream_id: u32) -> PathSettings {
        PathSettings {
            mode,
            stream_id,
            acoustic_mode: false,
            data_path: DataPath::Application,
        }
    }

    #[test]
    fn test_application_path() {
        let strategy = resolve(DataPathMode::Application);
        let s = settings(DataPathMode::Application, 0);
        assert!(strategy.check_idle(&s).is_ok());
        assert!(strategy.start_commands(&s, &PcmParams::default()).is_empty());
    }

    #[test]
    fn test_streaming_requires_stream_id() {
        let mode = DataPathMode::Streaming { rt_mixer: false };
        let strategy = resolve(mode);
        assert_eq!(
            strategy.check_idle(&settings(mode, 0)),
            Err(OmxError::InvalidState)
        );

        let s = settings(mode, 4);
        assert!(strategy.check_idle(&s).is_ok());
        let ops = strategy.start_commands(&s, &PcmParams::default());
        assert_eq!(
            ops,
            vec![ControlOp::StreamControl(StreamCommand::CodecParams {
                stream_id: 4,
                sample_rate: 8000,
                channels: 1,
            })]
        );
        assert_eq!(strategy.device_string(&s), "/mmmixer/encoder/4");
    }

    #[test]
    fn test_rt_mixer_device() {
        let mode = DataPathMode::Streaming { rt_mixer: true };
        let strategy = resolve(mode);
        assert_eq!(strategy.device_string(&settings(mode, 2)), "/rtmixer/encoder");
    }
}
