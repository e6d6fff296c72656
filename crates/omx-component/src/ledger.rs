//! Buffer ledger: who holds which registered buffer

use omx_core::{AllocationKind, BufferId, BufferOwner, OmxError, OmxResult};

/// Ledger entry for one registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRecord {
    pub id: BufferId,
    pub owner: BufferOwner,
    pub kind: AllocationKind,
    pub capacity: usize,
}

/// Registry of the buffers of one port
#[derive(Debug, Default)]
pub struct BufferLedger {
    records: Vec<BufferRecord>,
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new buffer, initially held by the client
    pub fn register(&mut self, id: BufferId, kind: AllocationKind, capacity: usize) -> OmxResult<()> {
        if self.get(id).is_some() {
            return Err(OmxError::bad_parameter(format!("{id} already registered")));
        }
        self.records.push(BufferRecord {
            id,
            owner: BufferOwner::Client,
            kind,
            capacity,
        });
        Ok(())
    }

    /// Forget a buffer. Only client-held buffers can be released.
    pub fn release(&mut self, id: BufferId) -> OmxResult<BufferRecord> {
        let pos = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| OmxError::bad_parameter(format!("unknown buffer {id}")))?;
        let owner = self.records[pos].owner;
        if owner != BufferOwner::Client {
            return Err(OmxError::bad_parameter(format!(
                "{id} is held by the {owner}"
            )));
        }
        Ok(self.records.remove(pos))
    }

    /// Move a buffer between holders, checking the current holder
    pub fn transfer(&mut self, id: BufferId, from: BufferOwner, to: BufferOwner) -> OmxResult<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| OmxError::bad_parameter(format!("unknown buffer {id}")))?;
        if record.owner != from {
            return Err(OmxError::bad_parameter(format!(
                "{id} is held by the {}, not the {from}",
                record.owner
            )));
        }
        record.owner = to;
        Ok(())
    }

    pub fn get(&self, id: BufferId) -> Option<&BufferRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn owner(&self, id: BufferId) -> Option<BufferOwner> {
        self.get(id).map(|r| r.owner)
    }

    pub fn count_owned_by(&self, owner: BufferOwner) -> usize {
        self.records.iter().filter(|r| r.owner == owner).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferRecord> {
        self.records.iter()
    }
}
