//! Independent re-check of compiled kernels against the fusion rules.

use super::classify::NodeInfo;
use super::fusion::edge_rule;
use super::FusedKernel;
use crate::builder::Graph;
use crate::error::{CompileError, FusionRule};
use crate::node::NodeKind;

pub fn verify(
    graph: &Graph,
    infos: &[Option<NodeInfo>],
    kernel: &FusedKernel,
    limit: usize,
) -> Result<(), CompileError> {
    let (Some(&first), Some(&last)) = (kernel.nodes.first(), kernel.nodes.last()) else {
        return Ok(());
    };
    if kernel.template.is_some() {
        let mut instances = kernel.nodes.iter().map(|n| match graph.nodes.get(n.0).map(|e| &e.kind) {
            Some(NodeKind::KernelOutput { instance, .. }) => Some(*instance),
            _ => None,
        });
        let head = instances.next().flatten();
        if head.is_none() || instances.any(|i| i != head) {
            return Err(CompileError::IllegalFusion {
                producer: first,
                consumer: last,
                rule: FusionRule::CustomKernelBoundary,
            });
        }
        return Ok(());
    }

    if kernel.outputs.len() > limit {
        return Err(CompileError::IllegalFusion {
            producer: first,
            consumer: last,
            rule: FusionRule::OutputLimit,
        });
    }
    for &consumer in &kernel.nodes {
        let info = infos
            .get(consumer.0)
            .and_then(Option::as_ref)
            .filter(|i| i.instance.is_none())
            .ok_or(CompileError::IllegalFusion {
                producer: first,
                consumer,
                rule: FusionRule::CustomKernelBoundary,
            })?;
        for (read, producer) in info.reads.iter().zip(graph.dependencies(consumer)) {
            if !kernel.nodes.contains(&producer) {
                continue;
            }
            let Some(from) = infos.get(producer.0).and_then(Option::as_ref) else {
                continue;
            };
            edge_rule(from, info, read).map_err(|rule| CompileError::IllegalFusion {
                producer,
                consumer,
                rule,
            })?;
        }
    }
    Ok(())
}
