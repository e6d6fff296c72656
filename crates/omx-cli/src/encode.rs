//! PCM to G.729 frame stream

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

use omx_core::{BufferFlags, ComponentConfig, ComponentState, INPUT_FRAME_SIZE};

use crate::pcm::load_pcm;
use crate::session::{Done, Session};

/// Microseconds of audio in one 10 ms input frame
const FRAME_DURATION_US: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    pub frames_in: usize,
    pub bytes_out: usize,
    pub elapsed: Duration,
}

/// Encode a raw PCM file and write the raw frame stream to `output`
pub fn encode_file(input: &Path, output: &Path, config: ComponentConfig) -> Result<EncodeSummary> {
    let pcm = load_pcm(input)?;
    let (encoded, summary) = encode_pcm(&pcm, config)?;
    fs::write(output, &encoded).with_context(|| format!("writing {}", output.display()))?;
    log::info!(
        "{} → {}: {} frame(s), {} byte(s) in {:?}",
        input.display(),
        output.display(),
        summary.frames_in,
        summary.bytes_out,
        summary.elapsed
    );
    Ok(summary)
}

/// Run 16-bit mono PCM through one component instance
pub fn encode_pcm(pcm: &[u8], config: ComponentConfig) -> Result<(Vec<u8>, EncodeSummary)> {
    let started = Instant::now();
    let mut session = Session::open(config)?;

    session.request(ComponentState::Idle)?;
    session.allocate()?;
    session.wait_state(ComponentState::Idle)?;
    session.request(ComponentState::Executing)?;
    session.wait_state(ComponentState::Executing)?;

    let mut encoded = Vec::new();
    let mut frames = pcm.chunks(INPUT_FRAME_SIZE).peekable();
    let mut frames_in = 0;
    let mut eos_sent = false;

    for header in std::mem::take(&mut session.free_outputs) {
        session
            .component
            .fill_this_buffer(header)
            .map_err(|r| anyhow!(r.error).context("FillThisBuffer"))?;
    }

    loop {
        while !eos_sent {
            let Some(mut header) = session.free_inputs.pop() else {
                break;
            };
            match frames.next() {
                Some(frame) => header.fill_from(frame)?,
                None => header.filled_len = 0,
            }
            header.timestamp = frames_in as i64 * FRAME_DURATION_US;
            header.flags = BufferFlags::NONE;
            if frames.peek().is_none() {
                header.flags.insert(BufferFlags::EOS);
                eos_sent = true;
            }
            frames_in += usize::from(header.filled_len > 0);
            session
                .component
                .empty_this_buffer(header)
                .map_err(|r| anyhow!(r.error).context("EmptyThisBuffer"))?;
        }

        match session.next()? {
            Some(Done::Input(header)) => session.free_inputs.push(header),
            Some(Done::Output(header)) => {
                encoded.extend_from_slice(header.payload());
                if header.flags.contains(BufferFlags::EOS) {
                    session.free_outputs.push(header);
                    break;
                }
                session
                    .component
                    .fill_this_buffer(header)
                    .map_err(|r| anyhow!(r.error).context("FillThisBuffer"))?;
            }
            None => {}
        }
    }

    session.request(ComponentState::Idle)?;
    session.wait_state(ComponentState::Idle)?;
    session.request(ComponentState::Loaded)?;
    session.free_all()?;
    session.wait_state(ComponentState::Loaded)?;
    session.component.deinit();

    let summary = EncodeSummary {
        frames_in,
        bytes_out: encoded.len(),
        elapsed: started.elapsed(),
    };
    Ok((encoded, summary))
}
