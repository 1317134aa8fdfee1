use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::builder::Graph;
use crate::error::CompileError;
use crate::node::NodeRef;

/// Topological order of the feed-forward graph; ties resolve to declaration
/// order.
pub fn order(graph: &Graph) -> Result<Vec<NodeRef>, CompileError> {
    let n = graph.len();
    let mut indegree = vec![0usize; n];
    let mut consumers: Vec<Vec<NodeRef>> = vec![Vec::new(); n];
    for i in 0..n {
        for dep in graph.dependencies(NodeRef(i)) {
            indegree[i] += 1;
            consumers[dep.0].push(NodeRef(i));
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeRef>> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| Reverse(NodeRef(i)))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &consumer in &consumers[node.0] {
            indegree[consumer.0] -= 1;
            if indegree[consumer.0] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        let nodes = (0..n)
            .filter(|&i| indegree[i] > 0)
            .map(NodeRef)
            .collect();
        Err(CompileError::CyclicGraph { nodes })
    }
}

/// Consumers of every node, restricted to nodes accepted by `keep`.
pub fn consumers(graph: &Graph, keep: &[bool]) -> Vec<Vec<NodeRef>> {
    let mut consumers = vec![Vec::new(); graph.len()];
    for (i, &kept) in keep.iter().enumerate() {
        if !kept {
            continue;
        }
        for dep in graph.dependencies(NodeRef(i)) {
            if !consumers[dep.0].contains(&NodeRef(i)) {
                consumers[dep.0].push(NodeRef(i));
            }
        }
    }
    consumers
}
