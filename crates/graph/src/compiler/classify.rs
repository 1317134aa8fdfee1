use compute::{FieldType, TensorRegime};

use crate::builder::Graph;
use crate::custom::InstanceId;
use crate::node::{NodeKind, NodeRef};
use crate::ops::InputRead;

/// Per-node facts the fusion pass decides on.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub field_type: FieldType,
    /// Big when any operand or the result has more than four elements.
    pub regime: TensorRegime,
    pub element_parallel: bool,
    /// How each input is read, in input order.
    pub reads: Vec<InputRead>,
    pub instance: Option<InstanceId>,
}

fn regime_of<'a>(types: impl IntoIterator<Item = &'a FieldType>) -> TensorRegime {
    types
        .into_iter()
        .map(FieldType::regime)
        .max()
        .unwrap_or(TensorRegime::Small)
}

/// Classifies computed nodes; source nodes and actuators yield `None`.
pub fn classify(graph: &Graph, node: NodeRef) -> Option<NodeInfo> {
    let entry = graph.nodes.get(node.0)?;
    let field_type = entry.field_type.clone()?;
    let deps = graph.dependencies(node);
    let dep_types: Vec<&FieldType> = deps
        .iter()
        .filter_map(|d| graph.nodes.get(d.0)?.field_type.as_ref())
        .collect();
    match &entry.kind {
        NodeKind::Operator { op, .. } => Some(NodeInfo {
            regime: regime_of(dep_types.iter().copied().chain(Some(&field_type))),
            element_parallel: op.is_element_parallel(),
            reads: deps.iter().map(|_| op.input_read()).collect(),
            instance: None,
            field_type,
        }),
        NodeKind::KernelOutput { instance, .. } => {
            let outputs = &graph.instances.get(instance.0)?.outputs;
            let output_types = outputs
                .iter()
                .filter_map(|o| graph.nodes.get(o.0)?.field_type.as_ref());
            Some(NodeInfo {
                regime: regime_of(dep_types.iter().copied().chain(output_types)),
                element_parallel: false,
                reads: deps.iter().map(|_| InputRead::Buffer).collect(),
                instance: Some(*instance),
                field_type,
            })
        }
        _ => None,
    }
}
