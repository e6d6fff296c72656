//! PCM input loading

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Load raw 16-bit little-endian mono PCM at 8 kHz
pub fn load_pcm(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() % 2 != 0 {
        log::warn!("{}: odd byte count, dropping the last byte", path.display());
        bytes.pop();
    }
    log::debug!("Loaded {} samples from {}", bytes.len() / 2, path.display());
    Ok(bytes)
}
