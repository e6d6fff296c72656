//! Frame packer used by the simulated DSP
//!
//! Produces fixed-size frames with the same framing as the hardware encoder
//! (2-byte frame type + 10 payload bytes per 10 ms of 8 kHz PCM) so the
//! component runtime sees realistic sizes. The payload is a decimated sample
//! summary, not a speech codec.

/// Frame type for active speech
pub const FRAME_SPEECH: u16 = 1;
/// Frame type emitted for silence when DTX is enabled
pub const FRAME_NO_DATA: u16 = 0;

const HEADER_SIZE: usize = 2;
const PAYLOAD_SIZE: usize = 10;
/// Mean absolute amplitude below which a frame counts as silence
const SILENCE_THRESHOLD: u32 = 64;

#[derive(Debug, Clone)]
pub struct FramePacker {
    input_frame_size: usize,
    mime_mode: bool,
    dtx: bool,
}

impl FramePacker {
    pub fn new(input_frame_size: usize, mime_mode: bool) -> Self {
        Self {
            input_frame_size: input_frame_size.max(2),
            mime_mode,
            dtx: false,
        }
    }

    pub fn set_dtx(&mut self, enabled: bool) {
        self.dtx = enabled;
    }

    pub fn input_frame_size(&self) -> usize {
        self.input_frame_size
    }

    pub fn output_frame_size(&self) -> usize {
        if self.mime_mode {
            PAYLOAD_SIZE
        } else {
            HEADER_SIZE + PAYLOAD_SIZE
        }
    }

    /// Pack one PCM frame (zero padded if short) into `out`, returning bytes written
    pub fn pack(&self, pcm: &[u8], out: &mut [u8]) -> usize {
        let frame_len = self.output_frame_size();
        if out.len() < frame_len {
            return 0;
        }

        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let energy = if samples.is_empty() {
            0
        } else {
            samples.iter().map(|s| s.unsigned_abs() as u32).sum::<u32>() / samples.len() as u32
        };
        let frame_type = if self.dtx && energy < SILENCE_THRESHOLD {
            FRAME_NO_DATA
        } else {
            FRAME_SPEECH
        };

        let mut cursor = 0;
        if !self.mime_mode {
            out[..HEADER_SIZE].copy_from_slice(&frame_type.to_le_bytes());
            cursor = HEADER_SIZE;
        }

        let payload = &mut out[cursor..cursor + PAYLOAD_SIZE];
        if frame_type == FRAME_NO_DATA {
            payload.fill(0);
        } else {
            let stride = (self.input_frame_size / 2 / PAYLOAD_SIZE).max(1);
            for (i, byte) in payload.iter_mut().enumerate() {
                let sample = samples.get(i * stride).copied().unwrap_or(0);
                *byte = (sample >> 8) as u8;
            }
        }
        frame_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<u8> {
        (0..len / 2)
            .flat_map(|i| (((i as i32 % 40) - 20) as i16 * 800).to_le_bytes())
            .collect()
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(FramePacker::new(160, false).output_frame_size(), 12);
        assert_eq!(FramePacker::new(160, true).output_frame_size(), 10);
    }

    #[test]
    fn test_pack_speech_frame() {
        let packer = FramePacker::new(160, false);
        let mut out = [0u8; 12];
        assert_eq!(packer.pack(&tone(160), &mut out), 12);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), FRAME_SPEECH);
    }

    #[test]
    fn test_dtx_marks_silence() {
        let mut packer = FramePacker::new(160, false);
        packer.set_dtx(true);
        let mut out = [0xAAu8; 12];
        packer.pack(&[0u8; 160], &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), FRAME_NO_DATA);
        assert!(out[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pack_rejects_small_output() {
        let packer = FramePacker::new(160, false);
        let mut out = [0u8; 4];
        assert_eq!(packer.pack(&tone(160), &mut out), 0);
    }
}
