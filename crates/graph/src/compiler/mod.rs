//! Kernel fusion compiler.
//!
//! `compile` runs once per graph: it orders the feed-forward graph, prunes
//! operators nothing observes, fuses the rest into kernels, specializes
//! custom kernels per signature and schedules the kernels into waves.

mod analysis;
mod classify;
mod fusion;
mod lower;
mod schedule;
mod topo;
mod verify;

use std::fmt;
use std::sync::Arc;

use compute::kernel::KernelProgram;
use compute::{FieldData, FieldType};
use tracing::{debug, info};

use crate::builder::{Graph, ProbeDecl};
use crate::config::CompilerConfig;
use crate::custom::TemplateId;
use crate::error::CompileError;
use crate::external::{FieldSink, FieldSource};
use crate::node::{NodeKind, NodeRef};

/// One dispatch unit: a fused group of operators or a custom kernel call.
#[derive(Debug, Clone)]
pub struct FusedKernel {
    /// Position in [`CompiledGraph::kernels`].
    pub id: usize,
    /// Contributing nodes in evaluation order.
    pub nodes: Vec<NodeRef>,
    /// Node bound to each input slot.
    pub inputs: Vec<NodeRef>,
    /// Node materialized by each output slot.
    pub outputs: Vec<NodeRef>,
    pub program: Arc<KernelProgram>,
    pub template: Option<TemplateId>,
}

impl FusedKernel {
    #[must_use]
    pub fn workgroups(&self) -> [u32; 3] {
        self.program.layout.workgroups()
    }
}

pub struct SensorBinding {
    pub node: NodeRef,
    pub field_type: FieldType,
    pub source: Box<dyn FieldSource>,
}

pub struct ActuatorBinding {
    pub node: NodeRef,
    pub input: NodeRef,
    pub sink: Box<dyn FieldSink>,
}

#[derive(Debug, Clone)]
pub struct RecurrenceBinding {
    pub node: NodeRef,
    pub init: FieldData,
    pub feedback: NodeRef,
}

#[derive(Debug, Clone)]
pub struct ConstantBinding {
    pub node: NodeRef,
    pub value: FieldData,
}

/// Output of [`Graph::freeze`]: the kernel schedule plus every buffer the
/// clock has to own.
pub struct CompiledGraph {
    /// Field type per node; `None` for actuators.
    pub node_types: Vec<Option<FieldType>>,
    /// Kernels in a valid execution order.
    pub kernels: Vec<FusedKernel>,
    /// Kernel indices grouped by dependency level.
    pub waves: Vec<Vec<usize>>,
    pub sensors: Vec<SensorBinding>,
    pub actuators: Vec<ActuatorBinding>,
    pub recurrences: Vec<RecurrenceBinding>,
    pub constants: Vec<ConstantBinding>,
    pub probes: Vec<ProbeDecl>,
    /// Distinct custom kernel specializations.
    pub specializations: usize,
    /// Operators dropped because nothing observes them.
    pub pruned: Vec<NodeRef>,
}

impl CompiledGraph {
    /// Kernel computing `node`, if any.
    #[must_use]
    pub fn kernel_of(&self, node: NodeRef) -> Option<&FusedKernel> {
        self.kernels.iter().find(|k| k.nodes.contains(&node))
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.node_types.len())
            .field("kernels", &self.kernels)
            .field("waves", &self.waves)
            .field("sensors", &self.sensors.len())
            .field("actuators", &self.actuators.len())
            .field("recurrences", &self.recurrences)
            .field("constants", &self.constants.len())
            .field("probes", &self.probes)
            .field("specializations", &self.specializations)
            .field("pruned", &self.pruned)
            .finish()
    }
}

/// Observed nodes: actuator inputs, recurrence feedback sources and probes.
fn observed(graph: &Graph) -> Vec<bool> {
    let mut roots = vec![false; graph.len()];
    for node in &graph.nodes {
        match &node.kind {
            NodeKind::Actuator { input, .. } => roots[input.0] = true,
            NodeKind::Recurrence { feedback, .. } => roots[feedback.0] = true,
            _ => {}
        }
    }
    for probe in &graph.probes {
        roots[probe.node.0] = true;
    }
    roots
}

fn liveness(graph: &Graph, roots: &[bool], prune: bool) -> Vec<bool> {
    if !prune {
        return vec![true; graph.len()];
    }
    let mut live = vec![false; graph.len()];
    let mut stack: Vec<NodeRef> = (0..graph.len())
        .map(NodeRef)
        .filter(|n| {
            let kind = &graph.nodes[n.0].kind;
            roots[n.0] || kind.is_source() || matches!(kind, NodeKind::Actuator { .. })
        })
        .collect();
    while let Some(node) = stack.pop() {
        if std::mem::replace(&mut live[node.0], true) {
            continue;
        }
        stack.extend(graph.dependencies(node));
        if let NodeKind::KernelOutput { instance, .. } = &graph.nodes[node.0].kind {
            if let Some(call) = graph.instances.get(instance.0) {
                stack.extend(call.outputs.iter().copied());
            }
        }
    }
    live
}

#[derive(Default)]
struct Bindings {
    sensors: Vec<SensorBinding>,
    actuators: Vec<ActuatorBinding>,
    recurrences: Vec<RecurrenceBinding>,
    constants: Vec<ConstantBinding>,
}

/// Moves sources and sinks out of the graph into clock bindings.
fn take_bindings(graph: &mut Graph) -> Bindings {
    let mut out = Bindings::default();
    for (i, entry) in graph.nodes.iter_mut().enumerate() {
        let node = NodeRef(i);
        match &mut entry.kind {
            NodeKind::Constant { value } => out.constants.push(ConstantBinding {
                node,
                value: value.clone(),
            }),
            NodeKind::Sensor { source } => {
                if let (Some(source), Some(field_type)) = (source.take(), entry.field_type.clone()) {
                    out.sensors.push(SensorBinding {
                        node,
                        field_type,
                        source,
                    });
                }
            }
            NodeKind::Actuator { input, sink } => {
                if let Some(sink) = sink.take() {
                    out.actuators.push(ActuatorBinding {
                        node,
                        input: *input,
                        sink,
                    });
                }
            }
            NodeKind::Recurrence { init, feedback } => out.recurrences.push(RecurrenceBinding {
                node,
                init: init.clone(),
                feedback: *feedback,
            }),
            NodeKind::Operator { .. } | NodeKind::KernelOutput { .. } => {}
        }
    }
    out
}

/// Compiles a frozen graph.
pub(crate) fn compile(graph: &mut Graph, config: &CompilerConfig) -> Result<CompiledGraph, CompileError> {
    let order = topo::order(graph)?;
    let roots = observed(graph);
    let live = liveness(graph, &roots, config.prune_unreachable);
    let pruned: Vec<NodeRef> = order
        .iter()
        .copied()
        .filter(|n| !live[n.0])
        .collect();
    if !pruned.is_empty() {
        debug!(count = pruned.len(), "pruned unobserved operators");
    }

    let consumers = topo::consumers(graph, &live);
    let infos: Vec<_> = (0..graph.len())
        .map(|i| classify::classify(graph, NodeRef(i)))
        .collect();
    let fuser = fusion::Fusion::new(graph, &infos, &consumers, &roots, config);
    let (groups, group_of) = fuser.run(&order, &live, config.fusion);

    let producers: Vec<_> = groups.iter().map(|g| g.producers.clone()).collect();
    let (schedule, levels) = schedule::schedule(&producers);
    if schedule.len() != groups.len() {
        let nodes = groups
            .iter()
            .enumerate()
            .filter(|(g, _)| !schedule.contains(g))
            .flat_map(|(_, group)| group.nodes.iter().copied())
            .collect();
        return Err(CompileError::CyclicGraph { nodes });
    }

    let limit = config.output_limit();
    let mut specializer = lower::Specializer::default();
    let mut kernels = Vec::with_capacity(groups.len());
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for (id, &g) in schedule.iter().enumerate() {
        let group = &groups[g];
        let kernel = match group.instance {
            Some(instance) => lower::lower_instance(graph, &mut specializer, id, instance, config)?,
            None => {
                let outputs: Vec<NodeRef> = group
                    .nodes
                    .iter()
                    .copied()
                    .filter(|&n| {
                        roots[n.0]
                            || consumers[n.0].is_empty()
                            || consumers[n.0].iter().any(|c| group_of[c.0] != Some(g))
                    })
                    .collect();
                lower::lower_group(graph, &infos, id, &group.nodes, &outputs, config)?
            }
        };
        verify::verify(graph, &infos, &kernel, limit)?;
        debug!(
            kernel = %kernel.program.name,
            nodes = kernel.nodes.len(),
            outputs = kernel.outputs.len(),
            strategy = ?kernel.program.strategy,
            "lowered kernel"
        );
        let level = levels[g];
        if waves.len() <= level {
            waves.resize(level + 1, Vec::new());
        }
        waves[level].push(id);
        kernels.push(kernel);
    }

    let node_types = graph.nodes.iter().map(|n| n.field_type.clone()).collect();
    let Bindings {
        sensors,
        actuators,
        recurrences,
        constants,
    } = take_bindings(graph);

    info!(
        kernels = kernels.len(),
        waves = waves.len(),
        pruned = pruned.len(),
        specializations = specializer.count(),
        "compiled graph"
    );
    Ok(CompiledGraph {
        node_types,
        kernels,
        waves,
        sensors,
        actuators,
        recurrences,
        constants,
        probes: graph.probes.clone(),
        specializations: specializer.count(),
        pruned,
    })
}
