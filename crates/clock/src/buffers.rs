//! Clock-owned storage, keyed by node index.

use compute::FieldData;
use graph::NodeRef;

use crate::error::ClockError;

/// Double buffer of a sensor, actuator or recurrence. Kernels and sinks only
/// ever see the slave; the latch writes the master.
#[derive(Debug, Clone)]
pub struct MasterSlave {
    pub master: FieldData,
    pub slave: FieldData,
}

impl MasterSlave {
    pub fn new(value: FieldData) -> Self {
        Self {
            master: value.clone(),
            slave: value,
        }
    }

    /// Phase 1: the slave takes the latched master value.
    pub fn advance(&mut self) {
        self.slave.clone_from(&self.master);
    }
}

#[derive(Debug, Default)]
pub struct BufferArena {
    slots: Vec<Option<MasterSlave>>,
}

impl BufferArena {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn insert(&mut self, node: NodeRef, buffer: MasterSlave) {
        if let Some(slot) = self.slots.get_mut(node.index()) {
            *slot = Some(buffer);
        }
    }

    pub fn get(&self, node: NodeRef) -> Result<&MasterSlave, ClockError> {
        self.slots
            .get(node.index())
            .and_then(Option::as_ref)
            .ok_or(ClockError::MissingValue(node))
    }

    pub fn get_mut(&mut self, node: NodeRef) -> Result<&mut MasterSlave, ClockError> {
        self.slots
            .get_mut(node.index())
            .and_then(Option::as_mut)
            .ok_or(ClockError::MissingValue(node))
    }

    pub fn advance_all(&mut self) {
        for buffer in self.slots.iter_mut().flatten() {
            buffer.advance();
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Values visible to kernels during one Phase-1 propagation.
#[derive(Debug, Clone)]
pub struct Frame {
    values: Vec<Option<FieldData>>,
}

impl Frame {
    pub fn with_len(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }

    pub fn get(&self, node: NodeRef) -> Result<&FieldData, ClockError> {
        self.values
            .get(node.index())
            .and_then(Option::as_ref)
            .ok_or(ClockError::MissingValue(node))
    }

    pub fn set(&mut self, node: NodeRef, value: FieldData) {
        if let Some(slot) = self.values.get_mut(node.index()) {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_copies_master_into_slave() {
        let mut buffer = MasterSlave::new(FieldData::from_slice(&[1.0, 2.0]).unwrap());
        buffer.master = FieldData::from_slice(&[3.0, 4.0]).unwrap();
        assert_eq!(buffer.slave.values(), &[1.0, 2.0]);
        buffer.advance();
        assert_eq!(buffer.slave.values(), &[3.0, 4.0]);
    }
}
