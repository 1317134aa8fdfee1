//! Lowering of fused groups and custom kernel instances to kernel programs.

use std::collections::HashMap;
use std::sync::Arc;

use compute::kernel::{CodeStrategy, ElementIndex, Expr, KernelProgram, Stmt, ThreadAddressing};
use compute::{ComputeError, FieldType, TensorRegime, WorkGroupLayout};
use tracing::debug;

use super::analysis;
use super::classify::NodeInfo;
use super::FusedKernel;
use crate::builder::Graph;
use crate::config::CompilerConfig;
use crate::custom::{InstanceId, TemplateId};
use crate::error::{CompileError, FusionRule};
use crate::node::{NodeKind, NodeRef};
use crate::ops::Operand;

fn layout_error(kernel: &str, err: &ComputeError) -> CompileError {
    let reason = match err {
        ComputeError::AddressingOrder(_) => "thread space exceeds three dimensions",
        ComputeError::InvalidWorkGroup(_) => "local work-group size does not fit the thread space",
        _ => "thread layout could not be allocated",
    };
    CompileError::IllegalAddressing {
        kernel: kernel.to_owned(),
        reason,
    }
}

fn field_types(graph: &Graph, nodes: &[NodeRef]) -> Result<Vec<FieldType>, CompileError> {
    nodes
        .iter()
        .map(|&n| {
            graph.field_type(n).cloned().map_err(|e| CompileError::ShapeMismatch {
                kernel: format!("node {n}"),
                detail: e.to_string(),
            })
        })
        .collect()
}

/// Lowers a group of operators that passed the fusion rules.
pub fn lower_group(
    graph: &Graph,
    infos: &[Option<NodeInfo>],
    id: usize,
    members: &[NodeRef],
    outputs: &[NodeRef],
    config: &CompilerConfig,
) -> Result<FusedKernel, CompileError> {
    let name = format!("kernel_{id}");
    let position = |n: NodeRef| members.iter().position(|&m| m == n);

    let mut inputs: Vec<NodeRef> = Vec::new();
    let mut lets = Vec::with_capacity(members.len());
    let mut regime = TensorRegime::Small;
    let mut extent = 1;
    for (temp, &node) in members.iter().enumerate() {
        let NodeKind::Operator { op, inputs: deps } = &graph.nodes[node.0].kind else {
            return Err(CompileError::IllegalFusion {
                producer: node,
                consumer: node,
                rule: FusionRule::CustomKernelBoundary,
            });
        };
        let operands: Vec<Operand> = deps
            .iter()
            .map(|&dep| match position(dep) {
                Some(p) => Operand::Temp(p),
                None => Operand::Slot(match inputs.iter().position(|&i| i == dep) {
                    Some(s) => s,
                    None => {
                        inputs.push(dep);
                        inputs.len() - 1
                    }
                }),
            })
            .collect();
        let value = op.lower(&operands).ok_or_else(|| CompileError::IllegalFusion {
            producer: deps
                .iter()
                .copied()
                .find(|&d| position(d).is_some())
                .unwrap_or(node),
            consumer: node,
            rule: FusionRule::NonlocalAccess,
        })?;
        lets.push(Stmt::Let { temp, value });
        if let Some(info) = infos.get(node.0).and_then(Option::as_ref) {
            regime = regime.max(info.regime);
            extent = extent.max(info.field_type.logical_tensor_len());
        }
    }

    let writes = outputs.iter().enumerate().filter_map(|(slot, &out)| {
        position(out).map(|temp| (slot, Expr::Temp(temp)))
    });
    let (strategy, body) = match regime {
        TensorRegime::Small => {
            let mut body = lets;
            body.extend(writes.map(|(output, value)| Stmt::WriteTensor { output, value }));
            (CodeStrategy::SmallTensor, body)
        }
        TensorRegime::Big => {
            let mut looped = lets;
            looped.extend(writes.map(|(output, value)| Stmt::WriteElement {
                output,
                element: ElementIndex::Loop,
                value,
            }));
            (
                CodeStrategy::BigTensor,
                vec![Stmt::ForEachElement {
                    extent,
                    body: looped,
                }],
            )
        }
    };

    let output_types = field_types(graph, outputs)?;
    let space = output_types
        .first()
        .map(|t| t.field_shape.dims().to_vec())
        .unwrap_or_default();
    let layout = WorkGroupLayout::allocate(&space, None, &config.local_sizes)
        .map_err(|e| layout_error(&name, &e))?;

    let program = KernelProgram {
        name,
        inputs: field_types(graph, &inputs)?,
        outputs: output_types,
        strategy,
        addressing: ThreadAddressing::PerOutputTensor,
        layout,
        temps: members.len(),
        body,
    };
    Ok(FusedKernel {
        id,
        nodes: members.to_vec(),
        inputs,
        outputs: outputs.to_vec(),
        program: Arc::new(program),
        template: None,
    })
}

/// One compiled program per distinct (template, input types) pair.
#[derive(Debug, Default)]
pub struct Specializer {
    cache: HashMap<(TemplateId, Vec<FieldType>), Arc<KernelProgram>>,
}

impl Specializer {
    /// Number of distinct programs produced so far.
    pub fn count(&self) -> usize {
        self.cache.len()
    }

    pub fn specialize(
        &mut self,
        graph: &Graph,
        template_id: TemplateId,
        inputs: &[FieldType],
        outputs: &[FieldType],
        config: &CompilerConfig,
    ) -> Result<Arc<KernelProgram>, CompileError> {
        let key = (template_id, inputs.to_vec());
        if let Some(program) = self.cache.get(&key) {
            return Ok(Arc::clone(program));
        }
        let template = graph.templates.get(template_id.0).ok_or_else(|| CompileError::ShapeMismatch {
            kernel: format!("template {}", template_id.0),
            detail: "template is not registered".to_owned(),
        })?;
        let name = template.name.clone();

        let regime = inputs
            .iter()
            .chain(outputs)
            .map(FieldType::regime)
            .max()
            .unwrap_or(TensorRegime::Small);
        let strategy = match regime {
            TensorRegime::Small => CodeStrategy::SmallTensor,
            TensorRegime::Big => CodeStrategy::BigTensor,
        };
        let body = template.bodies.select(regime).to_vec();
        analysis::check_slots(&name, &body, inputs.len(), outputs.len())?;
        analysis::check_addressing(&name, template.addressing, &body)?;
        analysis::check_trailing_writes(&name, &body)?;

        let addressed = match template.addressing {
            ThreadAddressing::PerOutputTensor => outputs.first(),
            ThreadAddressing::PerInputTensor(slot) | ThreadAddressing::PerInputElement(slot) => {
                inputs.get(slot)
            }
        }
        .ok_or_else(|| CompileError::IllegalAddressing {
            kernel: name.clone(),
            reason: "addressed field does not exist",
        })?;
        let mut space = addressed.field_shape.dims().to_vec();
        if let ThreadAddressing::PerInputElement(_) = template.addressing {
            space.push(addressed.logical_tensor_len());
        }
        let layout = WorkGroupLayout::allocate(&space, template.local_size.as_deref(), &config.local_sizes)
            .map_err(|e| layout_error(&name, &e))?;

        debug!(kernel = %name, ?strategy, inputs = inputs.len(), "specialized custom kernel");
        let program = Arc::new(KernelProgram {
            name,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            strategy,
            addressing: template.addressing,
            layout,
            temps: template.temps,
            body,
        });
        self.cache.insert(key, Arc::clone(&program));
        Ok(program)
    }
}

/// Lowers the kernel of a custom kernel instance.
pub fn lower_instance(
    graph: &Graph,
    specializer: &mut Specializer,
    id: usize,
    instance: InstanceId,
    config: &CompilerConfig,
) -> Result<FusedKernel, CompileError> {
    let call = graph.instances.get(instance.0).ok_or_else(|| CompileError::ShapeMismatch {
        kernel: format!("instance {}", instance.0),
        detail: "instance does not exist".to_owned(),
    })?;
    let input_types = field_types(graph, &call.inputs)?;
    let output_types = field_types(graph, &call.outputs)?;
    let program = specializer.specialize(graph, call.template, &input_types, &output_types, config)?;
    Ok(FusedKernel {
        id,
        nodes: call.outputs.clone(),
        inputs: call.inputs.clone(),
        outputs: call.outputs.clone(),
        program,
        template: Some(call.template),
    })
}
