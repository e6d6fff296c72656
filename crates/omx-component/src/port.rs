//! Component ports: definition, buffer ledger and pending list

use std::collections::VecDeque;

use omx_core::{
    AllocationKind, BufferHeader, BufferId, BufferOwner, Direction, MAX_BUFFERS_PER_PORT,
    OmxError, OmxResult, PortDefinition,
};

use crate::ledger::{BufferLedger, BufferRecord};

#[derive(Debug)]
pub struct Port {
    definition: PortDefinition,
    ledger: BufferLedger,
    /// Accepted but not yet forwarded to the bridge, in submission order
    pending: VecDeque<BufferHeader>,
}

impl Port {
    pub fn new(definition: PortDefinition) -> Self {
        Self {
            definition,
            ledger: BufferLedger::new(),
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.definition.port
    }

    /// Snapshot with live enabled/populated flags
    pub fn definition(&self) -> PortDefinition {
        self.definition.clone()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.definition.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.definition.enabled = enabled;
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        self.definition.populated
    }

    pub fn buffer_size(&self) -> usize {
        self.definition.buffer_size
    }

    pub fn registered(&self) -> usize {
        self.ledger.len()
    }

    pub fn held_by(&self, owner: BufferOwner) -> usize {
        self.ledger.count_owned_by(owner)
    }

    pub fn ledger(&self) -> &BufferLedger {
        &self.ledger
    }

    /// Register a buffer. Returns true when this call made the port populated.
    pub fn register(&mut self, id: BufferId, kind: AllocationKind, capacity: usize) -> OmxResult<bool> {
        if self.definition.populated {
            return Err(OmxError::bad_parameter(format!(
                "port {} already holds {} buffer(s)",
                self.direction(),
                self.definition.buffer_count_actual
            )));
        }
        if capacity < self.definition.buffer_size {
            return Err(OmxError::bad_parameter(format!(
                "{capacity} bytes is below the port buffer size {}",
                self.definition.buffer_size
            )));
        }
        self.ledger.register(id, kind, capacity)?;
        Ok(self.refresh_population())
    }

    pub fn release(&mut self, id: BufferId) -> OmxResult<BufferRecord> {
        let record = self.ledger.release(id)?;
        self.refresh_population();
        Ok(record)
    }

    pub fn transfer(&mut self, id: BufferId, from: BufferOwner, to: BufferOwner) -> OmxResult<()> {
        self.ledger.transfer(id, from, to)
    }

    /// Returns true when populated flipped from false to true
    fn refresh_population(&mut self) -> bool {
        let now = self.ledger.len() as u32 >= self.definition.buffer_count_actual;
        let flipped = now && !self.definition.populated;
        self.definition.populated = now;
        flipped
    }

    pub fn push_pending(&mut self, header: BufferHeader) {
        self.pending.push_back(header);
    }

    pub fn take_pending(&mut self) -> Vec<BufferHeader> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply the writable fields of a client-supplied definition
    pub fn apply_definition(&mut self, def: &PortDefinition) -> OmxResult<()> {
        if def.port != self.direction() {
            return Err(OmxError::BadPortIndex(def.port.index()));
        }
        if self.registered() > 0 {
            return Err(OmxError::IncorrectStateOperation);
        }
        if def.buffer_count_actual < self.definition.buffer_count_min
            || def.buffer_count_actual > MAX_BUFFERS_PER_PORT
        {
            return Err(OmxError::bad_parameter(format!(
                "buffer_count_actual {} outside {}..={MAX_BUFFERS_PER_PORT}",
                def.buffer_count_actual, self.definition.buffer_count_min
            )));
        }
        if def.buffer_size == 0 {
            return Err(OmxError::bad_parameter("buffer_size cannot be zero"));
        }
        if def.encoding != self.definition.encoding {
            return Err(OmxError::bad_parameter(format!(
                "port {} only supports {:?}",
                self.direction(),
                self.definition.encoding
            )));
        }
        self.definition.buffer_count_actual = def.buffer_count_actual;
        self.definition.buffer_size = def.buffer_size;
        Ok(())
    }
}
