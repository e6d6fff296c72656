//! Buffer headers and ownership vocabulary
//!
//! A [`BufferHeader`] is moved by value between the client, the component and
//! the bridge. Whoever holds the value owns the memory; the ledger records the
//! same fact as a [`BufferOwner`] so it can be checked and reported.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::{OmxError, OmxResult};
use crate::memory::BufferMemory;
use crate::port::Direction;
use crate::version::SpecVersion;

// ═══════════════════════════════════════════════════════════════════════════════
// FLAGS
// ═══════════════════════════════════════════════════════════════════════════════

/// `nFlags` bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const EOS: BufferFlags = BufferFlags(0x0000_0001);
    pub const STARTTIME: BufferFlags = BufferFlags(0x0000_0002);
    pub const DECODEONLY: BufferFlags = BufferFlags(0x0000_0004);
    pub const DATACORRUPT: BufferFlags = BufferFlags(0x0000_0008);
    pub const ENDOFFRAME: BufferFlags = BufferFlags(0x0000_0010);
    pub const SYNCFRAME: BufferFlags = BufferFlags(0x0000_0020);
    pub const EXTRADATA: BufferFlags = BufferFlags(0x0000_0040);
    pub const CODECCONFIG: BufferFlags = BufferFlags(0x0000_0080);

    pub const fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BufferFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BufferFlags) {
        self.0 &= !other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OWNERSHIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Who currently holds a buffer. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferOwner {
    Client,
    Component,
    Bridge,
}

impl fmt::Display for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferOwner::Client => f.write_str("client"),
            BufferOwner::Component => f.write_str("component"),
            BufferOwner::Bridge => f.write_str("bridge"),
        }
    }
}

/// Where a buffer's memory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationKind {
    /// AllocateBuffer: the component allocated and will release it
    Owned,
    /// UseBuffer: client memory, returned on FreeBuffer
    Borrowed,
}

/// Stable identity of a registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId {
    pub port: Direction,
    pub serial: u32,
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.port {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(f, "{tag}#{}", self.serial)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Component a mark is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkTarget {
    /// Raise `EventMark` when this component consumes the marked buffer
    ThisComponent,
    /// Propagate to the output for a downstream component
    Downstream(u32),
}

/// `OMX_MARKTYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkData {
    pub target: MarkTarget,
    pub data: u64,
}

impl MarkData {
    pub fn for_self(data: u64) -> Self {
        Self {
            target: MarkTarget::ThisComponent,
            data,
        }
    }

    pub fn downstream(component: u32, data: u64) -> Self {
        Self {
            target: MarkTarget::Downstream(component),
            data,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEADER
// ═══════════════════════════════════════════════════════════════════════════════

/// `OMX_BUFFERHEADERTYPE`
#[derive(Debug)]
pub struct BufferHeader {
    id: BufferId,
    memory: BufferMemory,
    /// Structure version stamped by the allocator; checked on every hand-off
    pub version: SpecVersion,
    /// Bytes of valid data starting at `offset`
    pub filled_len: usize,
    pub offset: usize,
    pub flags: BufferFlags,
    /// Presentation timestamp in microseconds
    pub timestamp: i64,
    pub tick_count: u32,
    pub mark: Option<MarkData>,
    /// Opaque client cookie, never interpreted by the component
    pub app_private: u64,
}

impl BufferHeader {
    /// Wrap freshly registered memory. Used by the component's buffer ledger.
    pub fn new(id: BufferId, memory: BufferMemory, version: SpecVersion) -> Self {
        Self {
            id,
            memory,
            version,
            filled_len: 0,
            offset: 0,
            flags: BufferFlags::NONE,
            timestamp: 0,
            tick_count: 0,
            mark: None,
            app_private: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn port(&self) -> Direction {
        self.id.port
    }

    /// Capacity of the backing memory (`nAllocLen`)
    #[inline]
    pub fn alloc_len(&self) -> usize {
        self.memory.len()
    }

    pub fn memory(&self) -> &BufferMemory {
        &self.memory
    }

    pub fn data(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    /// Valid bytes (`offset..offset + filled_len`)
    pub fn payload(&self) -> &[u8] {
        let end = (self.offset + self.filled_len).min(self.alloc_len());
        let start = self.offset.min(end);
        &self.memory.as_slice()[start..end]
    }

    /// Copy `bytes` to the start of the buffer and mark them valid
    pub fn fill_from(&mut self, bytes: &[u8]) -> OmxResult<()> {
        if bytes.len() > self.alloc_len() {
            return Err(OmxError::bad_parameter(format!(
                "{} bytes do not fit into {} ({} bytes)",
                bytes.len(),
                self.id,
                self.alloc_len()
            )));
        }
        self.memory.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        self.filled_len = bytes.len();
        Ok(())
    }

    /// Bounds check of the valid window against the allocation
    pub fn check_bounds(&self) -> OmxResult<()> {
        match self.offset.checked_add(self.filled_len) {
            Some(end) if end <= self.alloc_len() => Ok(()),
            _ => Err(OmxError::bad_parameter(format!(
                "{}: offset {} + filled {} exceeds {}",
                self.id,
                self.offset,
                self.filled_len,
                self.alloc_len()
            ))),
        }
    }

    /// Reset per-transfer fields before handing the buffer out again
    pub fn clear(&mut self) {
        self.filled_len = 0;
        self.offset = 0;
        self.flags = BufferFlags::NONE;
        self.mark = None;
    }

    pub fn into_memory(self) -> BufferMemory {
        self.memory
    }
}
