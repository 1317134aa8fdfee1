//! Graph construction.
//!
//! Nodes live in an arena and reference their inputs by [`NodeRef`]. Inputs
//! must exist before the node that reads them, so the feed-forward graph is
//! acyclic by construction; the only way back is a recurrence feedback edge.

use std::sync::Arc;

use compute::{FieldData, FieldType, TensorElement};
use tracing::debug;

use crate::compiler::{self, CompiledGraph};
use crate::config::CompilerConfig;
use crate::custom::{InstanceId, KernelInstance, KernelTemplate, TemplateId};
use crate::error::{CompileError, GraphError};
use crate::external::{FieldSink, FieldSource};
use crate::node::{Node, NodeKind, NodeRef};
use crate::ops::OpKind;

/// A named probe on a node, retained as its own buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDecl {
    pub node: NodeRef,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) templates: Vec<Arc<KernelTemplate>>,
    pub(crate) instances: Vec<KernelInstance>,
    pub(crate) probes: Vec<ProbeDecl>,
    frozen: bool,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_open(&self) -> Result<(), GraphError> {
        if self.frozen {
            Err(GraphError::GraphFrozen)
        } else {
            Ok(())
        }
    }

    pub(crate) fn node(&self, node: NodeRef) -> Result<&Node, GraphError> {
        self.nodes.get(node.0).ok_or(GraphError::UnknownNode(node))
    }

    /// Type of the field produced by `node`.
    pub fn field_type(&self, node: NodeRef) -> Result<&FieldType, GraphError> {
        self.node(node)?
            .field_type
            .as_ref()
            .ok_or(GraphError::NotAField(node))
    }

    #[must_use]
    pub fn probes(&self) -> &[ProbeDecl] {
        &self.probes
    }

    /// Feed-forward inputs of `node`; recurrence feedback is excluded.
    pub(crate) fn dependencies(&self, node: NodeRef) -> Vec<NodeRef> {
        match self.nodes.get(node.0).map(|n| &n.kind) {
            Some(NodeKind::Operator { inputs, .. }) => inputs.clone(),
            Some(NodeKind::Actuator { input, .. }) => vec![*input],
            Some(NodeKind::KernelOutput { instance, .. }) => self
                .instances
                .get(instance.0)
                .map(|i| i.inputs.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind, field_type: Option<FieldType>) -> NodeRef {
        let node = NodeRef(self.nodes.len());
        debug!(%node, kind = kind.label(), "declared node");
        self.nodes.push(Node { kind, field_type });
        node
    }

    /// Declares a constant initialised element by element.
    pub fn declare_field<F>(&mut self, field_type: FieldType, init: F) -> Result<NodeRef, GraphError>
    where
        F: FnMut(&[usize], usize) -> TensorElement,
    {
        self.check_open()?;
        let value = FieldData::from_fn(field_type, init)?;
        self.declare_constant(value)
    }

    pub fn declare_constant(&mut self, value: FieldData) -> Result<NodeRef, GraphError> {
        self.check_open()?;
        let field_type = value.field_type().clone();
        Ok(self.push(NodeKind::Constant { value }, Some(field_type)))
    }

    /// Declares an input fed by `source` once per step.
    pub fn declare_sensor<S>(&mut self, field_type: FieldType, source: S) -> Result<NodeRef, GraphError>
    where
        S: FieldSource + 'static,
    {
        self.check_open()?;
        Ok(self.push(
            NodeKind::Sensor {
                source: Some(Box::new(source)),
            },
            Some(field_type),
        ))
    }

    /// Declares an output draining the value of `input` once per step.
    pub fn declare_actuator<S>(&mut self, input: NodeRef, sink: S) -> Result<NodeRef, GraphError>
    where
        S: FieldSink + 'static,
    {
        self.check_open()?;
        self.field_type(input)?;
        Ok(self.push(
            NodeKind::Actuator {
                input,
                sink: Some(Box::new(sink)),
            },
            None,
        ))
    }

    pub fn declare_operator(&mut self, op: OpKind, inputs: &[NodeRef]) -> Result<NodeRef, GraphError> {
        self.check_open()?;
        let types = inputs
            .iter()
            .map(|&i| self.field_type(i))
            .collect::<Result<Vec<_>, _>>()?;
        let field_type = op.output_type(&types)?;
        Ok(self.push(
            NodeKind::Operator {
                op,
                inputs: inputs.to_vec(),
            },
            Some(field_type),
        ))
    }

    /// Turns `constant` into a recurrence latched from `source` every step.
    pub fn bind_recurrence(&mut self, constant: NodeRef, source: NodeRef) -> Result<(), GraphError> {
        self.check_open()?;
        let found = self.field_type(source)?.clone();
        let target = self.nodes.get_mut(constant.0).ok_or(GraphError::UnknownNode(constant))?;
        let init = match &target.kind {
            NodeKind::Constant { value } => value.clone(),
            NodeKind::Recurrence { .. } => return Err(GraphError::AlreadyBound(constant)),
            _ => return Err(GraphError::NotAConstant(constant)),
        };
        if init.field_type() != &found {
            return Err(GraphError::TypeMismatch {
                expected: init.field_type().clone(),
                found,
            });
        }
        target.kind = NodeKind::Recurrence {
            init,
            feedback: source,
        };
        debug!(recurrence = %constant, feedback = %source, "bound recurrence");
        Ok(())
    }

    pub fn register_kernel(&mut self, template: KernelTemplate) -> Result<TemplateId, GraphError> {
        self.check_open()?;
        template.validate()?;
        let id = TemplateId(self.templates.len());
        self.templates.push(Arc::new(template));
        Ok(id)
    }

    /// Instantiates a registered kernel; returns one node per output.
    pub fn declare_custom_kernel(
        &mut self,
        template: TemplateId,
        inputs: &[NodeRef],
    ) -> Result<Vec<NodeRef>, GraphError> {
        self.check_open()?;
        let kernel = Arc::clone(self.templates.get(template.0).ok_or_else(|| {
            GraphError::invalid("custom kernel", format!("template {} is not registered", template.0))
        })?);
        let types = inputs
            .iter()
            .map(|&i| self.field_type(i))
            .collect::<Result<Vec<_>, _>>()?;
        let output_types = kernel.output_types(&types)?;

        let instance = InstanceId(self.instances.len());
        let outputs: Vec<NodeRef> = output_types
            .into_iter()
            .enumerate()
            .map(|(output, ty)| self.push(NodeKind::KernelOutput { instance, output }, Some(ty)))
            .collect();
        self.instances.push(KernelInstance {
            template,
            inputs: inputs.to_vec(),
            outputs: outputs.clone(),
        });
        Ok(outputs)
    }

    /// Keeps the value of `node` readable between steps under `name`.
    pub fn probe(&mut self, node: NodeRef, name: impl Into<String>) -> Result<(), GraphError> {
        self.check_open()?;
        self.field_type(node)?;
        self.probes.push(ProbeDecl {
            node,
            name: name.into(),
        });
        Ok(())
    }

    /// Compiles the graph. The graph accepts no further declarations
    /// afterwards, whether or not compilation succeeds.
    pub fn freeze(&mut self, config: &CompilerConfig) -> Result<CompiledGraph, CompileError> {
        if self.frozen {
            return Err(CompileError::GraphFrozen);
        }
        self.frozen = true;
        compiler::compile(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ExternalError;
    use compute::kernel::BinaryOp;
    use compute::Shape;

    fn line(n: usize) -> FieldType {
        FieldType::scalar(Shape::new(&[n]).unwrap())
    }

    #[test]
    fn recurrence_binding_rules() {
        let mut g = Graph::new();
        let x = g.declare_field(line(4), |_, _| 0.0f32.into()).unwrap();
        let y = g.declare_field(line(5), |_, _| 0.0f32.into()).unwrap();
        let next = g
            .declare_operator(OpKind::BinaryScalar(BinaryOp::Add, compute::Complex::ONE), &[x])
            .unwrap();
        assert!(matches!(
            g.bind_recurrence(y, next),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert!(matches!(
            g.bind_recurrence(next, x),
            Err(GraphError::NotAConstant(_))
        ));
        g.bind_recurrence(x, next).unwrap();
        assert_eq!(g.bind_recurrence(x, next), Err(GraphError::AlreadyBound(x)));
    }

    #[test]
    fn actuators_produce_no_field() {
        let mut g = Graph::new();
        let x = g.declare_field(line(2), |_, _| 1.0f32.into()).unwrap();
        let sink = |_: &FieldData| -> Result<(), ExternalError> { Ok(()) };
        let act = g.declare_actuator(x, sink).unwrap();
        assert_eq!(g.field_type(act), Err(GraphError::NotAField(act)));
        assert!(matches!(g.probe(act, "nope"), Err(GraphError::NotAField(_))));
        assert!(matches!(
            g.declare_operator(OpKind::Unary(compute::kernel::UnaryOp::Neg), &[act]),
            Err(GraphError::NotAField(_))
        ));
    }

    #[test]
    fn unknown_nodes_are_rejected() {
        let mut g = Graph::new();
        let ghost = NodeRef(7);
        assert_eq!(
            g.declare_operator(OpKind::Transpose, &[ghost]),
            Err(GraphError::UnknownNode(ghost))
        );
    }
}
