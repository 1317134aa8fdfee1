//! Greedy fusion of operators into kernels.
//!
//! Nodes are visited in topological order. A node joins the group of its
//! first input whose edge is fusable; otherwise it starts a new group. A
//! second pass then folds producer groups into their consumers wherever
//! every edge between the two is fusable, so branches that only read kernel
//! inputs end up in the kernel that combines them.

use std::collections::BTreeSet;

use compute::TensorRegime;
use tracing::debug;

use super::classify::NodeInfo;
use crate::builder::Graph;
use crate::config::CompilerConfig;
use crate::custom::InstanceId;
use crate::error::FusionRule;
use crate::node::NodeRef;
use crate::ops::InputRead;

/// Legality of computing `consumer` in the same kernel as `producer`.
pub fn edge_rule(producer: &NodeInfo, consumer: &NodeInfo, read: &InputRead) -> Result<(), FusionRule> {
    if producer.instance.is_some() || consumer.instance.is_some() {
        return Err(FusionRule::CustomKernelBoundary);
    }
    if producer.field_type.field_shape != consumer.field_type.field_shape {
        return Err(FusionRule::FieldShapeMismatch);
    }
    if !read.is_local() {
        return Err(FusionRule::NonlocalAccess);
    }
    if producer.regime != consumer.regime {
        return Err(FusionRule::TensorRegimeMismatch);
    }
    if consumer.regime == TensorRegime::Big
        && !(producer.element_parallel
            && consumer.element_parallel
            && producer.field_type.logical_tensor_len() == consumer.field_type.logical_tensor_len())
    {
        return Err(FusionRule::BigTensorLooping);
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub nodes: Vec<NodeRef>,
    pub instance: Option<InstanceId>,
    /// Groups this one reads from.
    pub producers: BTreeSet<usize>,
}

pub struct Fusion<'a> {
    graph: &'a Graph,
    infos: &'a [Option<NodeInfo>],
    consumers: &'a [Vec<NodeRef>],
    roots: &'a [bool],
    limit: usize,
    pub group_of: Vec<Option<usize>>,
    pub groups: Vec<Group>,
}

impl<'a> Fusion<'a> {
    pub fn new(
        graph: &'a Graph,
        infos: &'a [Option<NodeInfo>],
        consumers: &'a [Vec<NodeRef>],
        roots: &'a [bool],
        config: &CompilerConfig,
    ) -> Self {
        Self {
            graph,
            infos,
            consumers,
            roots,
            limit: config.output_limit(),
            group_of: vec![None; graph.len()],
            groups: Vec::new(),
        }
    }

    fn info(&self, node: NodeRef) -> Option<&'a NodeInfo> {
        self.infos.get(node.0).and_then(Option::as_ref)
    }

    /// True when `from` feeds `to`, directly or transitively.
    fn feeds(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![to];
        let mut seen = BTreeSet::new();
        while let Some(g) = stack.pop() {
            if g == from {
                return true;
            }
            if seen.insert(g) {
                stack.extend(self.groups[g].producers.iter().copied());
            }
        }
        false
    }

    /// Whether `node` must be written out of group `group`, once `joining`
    /// is part of it. Consumers not yet placed count as outside.
    pub fn escapes(&self, node: NodeRef, group: usize, joining: Option<NodeRef>) -> bool {
        let consumers = &self.consumers[node.0];
        self.roots[node.0]
            || consumers.is_empty()
            || consumers
                .iter()
                .any(|&c| Some(c) != joining && self.group_of[c.0] != Some(group))
    }

    fn try_join(&self, group: usize, node: NodeRef, info: &NodeInfo, deps: &[NodeRef]) -> Result<(), FusionRule> {
        if self.groups[group].instance.is_some() {
            return Err(FusionRule::CustomKernelBoundary);
        }
        for (i, &dep) in deps.iter().enumerate() {
            match self.group_of[dep.0] {
                Some(g) if g == group => {
                    let producer = self.info(dep).ok_or(FusionRule::CustomKernelBoundary)?;
                    edge_rule(producer, info, &info.reads[i])?;
                }
                Some(g) if self.feeds(group, g) => return Err(FusionRule::KernelCycle),
                _ => {}
            }
        }
        // The joining node has no placed consumers yet, so it always escapes.
        let escaping = self.groups[group]
            .nodes
            .iter()
            .filter(|&&m| self.escapes(m, group, Some(node)))
            .count()
            + 1;
        if escaping > self.limit {
            return Err(FusionRule::OutputLimit);
        }
        Ok(())
    }

    fn place(&mut self, node: NodeRef, group: usize, deps: &[NodeRef]) {
        self.group_of[node.0] = Some(group);
        self.groups[group].nodes.push(node);
        for dep in deps {
            if let Some(g) = self.group_of[dep.0] {
                if g != group {
                    self.groups[group].producers.insert(g);
                }
            }
        }
    }

    fn open(&mut self, instance: Option<InstanceId>) -> usize {
        self.groups.push(Group {
            instance,
            ..Group::default()
        });
        self.groups.len() - 1
    }

    /// Groups every live computed node in `order`.
    pub fn run(mut self, order: &[NodeRef], live: &[bool], fuse: bool) -> (Vec<Group>, Vec<Option<usize>>) {
        for &node in order {
            if !live[node.0] {
                continue;
            }
            let Some(info) = self.info(node) else {
                continue;
            };
            let deps = self.graph.dependencies(node);

            if let Some(instance) = info.instance {
                let existing = self.groups.iter().position(|g| g.instance == Some(instance));
                let group = match existing {
                    Some(g) => g,
                    None => self.open(Some(instance)),
                };
                self.place(node, group, &deps);
                continue;
            }

            let mut target = None;
            if fuse {
                for &dep in &deps {
                    let Some(group) = self.group_of[dep.0] else {
                        continue;
                    };
                    match self.try_join(group, node, info, &deps) {
                        Ok(()) => {
                            target = Some(group);
                            break;
                        }
                        Err(rule) => {
                            debug!(producer = %dep, consumer = %node, %rule, "fusion rejected");
                        }
                    }
                }
            }
            let group = match target {
                Some(g) => g,
                None => self.open(None),
            };
            self.place(node, group, &deps);
        }
        if fuse {
            self.merge_producers(order);
        }
        self.compact()
    }

    /// Whether every edge from group `producer` into group `consumer` is
    /// fusable.
    fn edges_fuse(&self, producer: usize, consumer: usize) -> Result<(), FusionRule> {
        for &node in &self.groups[consumer].nodes {
            let info = self.info(node).ok_or(FusionRule::CustomKernelBoundary)?;
            for (read, dep) in info.reads.iter().zip(self.graph.dependencies(node)) {
                if self.group_of[dep.0] != Some(producer) {
                    continue;
                }
                let from = self.info(dep).ok_or(FusionRule::CustomKernelBoundary)?;
                edge_rule(from, info, read)?;
            }
        }
        Ok(())
    }

    fn try_merge(&self, producer: usize, consumer: usize) -> Result<(), FusionRule> {
        if self.groups[producer].instance.is_some() || self.groups[consumer].instance.is_some() {
            return Err(FusionRule::CustomKernelBoundary);
        }
        self.edges_fuse(producer, consumer)?;
        let detour = self.groups[consumer]
            .producers
            .iter()
            .any(|&other| other != producer && self.feeds(producer, other));
        if detour {
            return Err(FusionRule::KernelCycle);
        }
        let merged = [producer, consumer];
        let escaping = merged
            .iter()
            .flat_map(|&g| self.groups[g].nodes.iter())
            .filter(|&&m| {
                let consumers = &self.consumers[m.0];
                self.roots[m.0]
                    || consumers.is_empty()
                    || consumers
                        .iter()
                        .any(|c| !matches!(self.group_of[c.0], Some(g) if merged.contains(&g)))
            })
            .count();
        if escaping > self.limit {
            return Err(FusionRule::OutputLimit);
        }
        Ok(())
    }

    /// Moves every node of `producer` into `consumer`. `producer` is left
    /// empty and dropped by [`Fusion::compact`].
    fn merge(&mut self, producer: usize, consumer: usize, rank: &[usize]) {
        let moved = std::mem::take(&mut self.groups[producer]);
        for &node in &moved.nodes {
            self.group_of[node.0] = Some(consumer);
        }
        let target = &mut self.groups[consumer];
        target.nodes.extend(moved.nodes);
        target.nodes.sort_by_key(|n| rank[n.0]);
        target.producers.extend(moved.producers);
        target.producers.remove(&producer);
        target.producers.remove(&consumer);
        for group in &mut self.groups {
            if group.producers.remove(&producer) {
                group.producers.insert(consumer);
            }
        }
        self.groups[consumer].producers.remove(&consumer);
    }

    fn producers_of(&self, group: usize) -> Vec<usize> {
        self.groups[group].producers.iter().copied().collect()
    }

    /// Folds producer groups into consumer groups until nothing changes.
    /// Consumers are tried in creation order, their producers in ascending
    /// order.
    fn merge_producers(&mut self, order: &[NodeRef]) {
        let mut rank = vec![usize::MAX; self.graph.len()];
        for (position, node) in order.iter().enumerate() {
            rank[node.0] = position;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for consumer in 0..self.groups.len() {
                for producer in self.producers_of(consumer) {
                    match self.try_merge(producer, consumer) {
                        Ok(()) => {
                            self.merge(producer, consumer, &rank);
                            changed = true;
                        }
                        Err(rule) => {
                            debug!(producer, consumer, %rule, "group merge rejected");
                        }
                    }
                }
            }
        }
    }

    /// Drops emptied groups and renumbers the rest.
    fn compact(self) -> (Vec<Group>, Vec<Option<usize>>) {
        let mut renumber = vec![None; self.groups.len()];
        let mut groups = Vec::new();
        for (old, group) in self.groups.into_iter().enumerate() {
            if group.nodes.is_empty() {
                continue;
            }
            renumber[old] = Some(groups.len());
            groups.push(group);
        }
        for group in &mut groups {
            group.producers = group.producers.iter().filter_map(|&g| renumber[g]).collect();
        }
        let group_of = self
            .group_of
            .into_iter()
            .map(|g| g.and_then(|g| renumber[g]))
            .collect();
        (groups, group_of)
    }
}
