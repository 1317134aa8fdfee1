//! Probe snapshots readable from any thread between steps.

use std::collections::HashMap;
use std::sync::Arc;

use compute::FieldData;
use graph::NodeRef;
use parking_lot::RwLock;

/// Probed values of one completed step.
#[derive(Debug, Clone, Default)]
pub struct ProbeSnapshot {
    /// Steps completed when the snapshot was taken; 0 right after reset.
    pub step: u64,
    pub fields: HashMap<NodeRef, FieldData>,
    pub names: HashMap<String, NodeRef>,
}

impl ProbeSnapshot {
    #[must_use]
    pub fn get(&self, node: NodeRef) -> Option<&FieldData> {
        self.fields.get(&node)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&FieldData> {
        self.names.get(name).and_then(|node| self.fields.get(node))
    }
}

/// Shared handle to the latest snapshot. The clock replaces the snapshot as
/// a whole, under the write lock, so readers never see a mix of steps.
#[derive(Debug, Clone, Default)]
pub struct ProbeHandle {
    inner: Arc<RwLock<ProbeSnapshot>>,
}

impl ProbeHandle {
    pub(crate) fn publish(&self, snapshot: ProbeSnapshot) {
        *self.inner.write() = snapshot;
    }

    /// Copy of the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot {
        self.inner.read().clone()
    }

    #[must_use]
    pub fn read(&self, node: NodeRef) -> Option<FieldData> {
        self.inner.read().get(node).cloned()
    }

    #[must_use]
    pub fn read_named(&self, name: &str) -> Option<FieldData> {
        self.inner.read().by_name(name).cloned()
    }

    #[must_use]
    pub fn step(&self) -> u64 {
        self.inner.read().step
    }
}
