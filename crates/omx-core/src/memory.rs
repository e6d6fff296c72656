//! Buffer memory handles
//!
//! Ledger-allocated buffers are aligned for DMA-style access by the backend.
//! The aligned window is located once at allocation; callers only ever see
//! slices, never the offset arithmetic.

use crate::error::{OmxError, OmxResult};

/// Default alignment of ledger-allocated buffers (cache line)
pub const DEFAULT_ALIGNMENT: usize = 128;

/// Heap block whose usable window starts on an `alignment` boundary
#[derive(Debug)]
pub struct AlignedBlock {
    storage: Vec<u8>,
    start: usize,
    len: usize,
    alignment: usize,
}

impl AlignedBlock {
    /// Allocate `len` zeroed bytes aligned to `alignment` (a power of two)
    pub fn new(len: usize, alignment: usize) -> OmxResult<Self> {
        if len == 0 {
            return Err(OmxError::bad_parameter("zero-sized buffer"));
        }
        if !alignment.is_power_of_two() {
            return Err(OmxError::bad_parameter(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        let padded = len
            .checked_add(alignment)
            .ok_or_else(|| OmxError::InsufficientResources(format!("{len} bytes")))?;
        let storage = vec![0u8; padded];
        let start = storage.as_ptr().align_offset(alignment);
        if start.saturating_add(len) > storage.len() {
            return Err(OmxError::InsufficientResources(format!(
                "cannot align {len} bytes to {alignment}"
            )));
        }
        Ok(Self {
            storage,
            start,
            len,
            alignment,
        })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.start..self.start + self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.start..self.start + self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn is_aligned(&self) -> bool {
        (self.as_slice().as_ptr() as usize) % self.alignment == 0
    }
}

/// Backing store of a buffer header
#[derive(Debug)]
pub enum BufferMemory {
    /// Allocated by the component (AllocateBuffer), released on FreeBuffer
    Owned(AlignedBlock),
    /// Supplied by the client (UseBuffer), handed back on FreeBuffer
    Borrowed(Vec<u8>),
}

impl BufferMemory {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            BufferMemory::Owned(block) => block.as_slice(),
            BufferMemory::Borrowed(vec) => vec.as_slice(),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            BufferMemory::Owned(block) => block.as_mut_slice(),
            BufferMemory::Borrowed(vec) => vec.as_mut_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, BufferMemory::Owned(_))
    }
}
