//! Buffer memory allocation

use omx_core::{AlignedBlock, OmxResult};

/// External allocator used by AllocateBuffer
pub trait BufferAllocator: Send + Sync {
    fn allocate(&self, len: usize, alignment: usize) -> OmxResult<AlignedBlock>;
}

/// Heap allocator producing aligned blocks
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, len: usize, alignment: usize) -> OmxResult<AlignedBlock> {
        AlignedBlock::new(len, alignment)
    }
}
