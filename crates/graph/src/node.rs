use compute::{FieldData, FieldType};
use std::fmt;

use crate::custom::InstanceId;
use crate::external::{FieldSink, FieldSource};
use crate::ops::OpKind;

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub(crate) usize);

impl NodeRef {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub enum NodeKind {
    Constant {
        value: FieldData,
    },
    Sensor {
        source: Option<Box<dyn FieldSource>>,
    },
    /// Consumes `input`; produces no field.
    Actuator {
        input: NodeRef,
        sink: Option<Box<dyn FieldSink>>,
    },
    /// A constant whose value is replaced by `feedback` at every latch.
    /// The feedback edge is not part of the feed-forward graph.
    Recurrence {
        init: FieldData,
        feedback: NodeRef,
    },
    Operator {
        op: OpKind,
        inputs: Vec<NodeRef>,
    },
    /// Output `output` of a custom kernel instance.
    KernelOutput {
        instance: InstanceId,
        output: usize,
    },
}

impl NodeKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Sensor { .. } => "sensor",
            Self::Actuator { .. } => "actuator",
            Self::Recurrence { .. } => "recurrence",
            Self::Operator { .. } => "operator",
            Self::KernelOutput { .. } => "kernel output",
        }
    }

    /// True for nodes whose value is held in a clock buffer rather than
    /// computed by a kernel.
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::Constant { .. } | Self::Sensor { .. } | Self::Recurrence { .. }
        )
    }
}

pub struct Node {
    pub kind: NodeKind,
    /// `None` only for actuators.
    pub field_type: Option<FieldType>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind.label())
            .field("field_type", &self.field_type)
            .finish()
    }
}
