//! Deferred port enable/disable

use omx_core::{CommandKind, Direction, OmxError, OmxResult};

use crate::port::Port;

/// What a pending port operation waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedOn {
    /// Enable: the port becomes populated
    Population,
    /// Disable: the port holds zero registered buffers
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPortOp {
    pub port: Direction,
    pub target_enabled: bool,
    pub blocked_on: BlockedOn,
}

impl PendingPortOp {
    pub fn disable(port: Direction) -> Self {
        Self {
            port,
            target_enabled: false,
            blocked_on: BlockedOn::Drain,
        }
    }

    pub fn enable(port: Direction) -> Self {
        Self {
            port,
            target_enabled: true,
            blocked_on: BlockedOn::Population,
        }
    }

    /// Command reported when the operation completes
    pub fn command(&self) -> CommandKind {
        if self.target_enabled {
            CommandKind::PortEnable
        } else {
            CommandKind::PortDisable
        }
    }

    pub fn is_satisfied(&self, port: &Port) -> bool {
        match self.blocked_on {
            BlockedOn::Population => port.is_populated(),
            BlockedOn::Drain => port.registered() == 0,
        }
    }
}

/// At most one outstanding operation per port
#[derive(Debug, Default)]
pub struct PendingPortOps {
    slots: [Option<PendingPortOp>; 2],
}

impl PendingPortOps {
    pub fn get(&self, port: Direction) -> Option<PendingPortOp> {
        self.slots[port.slot()]
    }

    pub fn is_pending(&self, port: Direction) -> bool {
        self.slots[port.slot()].is_some()
    }

    pub fn insert(&mut self, op: PendingPortOp) -> OmxResult<()> {
        let slot = &mut self.slots[op.port.slot()];
        if slot.is_some() {
            return Err(OmxError::IncorrectStateOperation);
        }
        *slot = Some(op);
        Ok(())
    }

    /// Remove and return every operation whose condition now holds, input first
    pub fn take_satisfied(&mut self, ports: &[Port; 2]) -> Vec<PendingPortOp> {
        let mut done = Vec::new();
        for dir in Direction::BOTH {
            let slot = &mut self.slots[dir.slot()];
            if let Some(op) = *slot {
                if op.is_satisfied(&ports[dir.slot()]) {
                    *slot = None;
                    done.push(op);
                }
            }
        }
        done
    }

    pub fn clear(&mut self) {
        self.slots = [None, None];
    }
}
