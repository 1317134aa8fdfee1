mod common;

use common::{constant, freeze, grid, kernel_index, line, vectors};
use compute::kernel::{BorderPolicy, CodeStrategy, ReduceOp};
use graph::{CompilerConfig, Graph};

#[test]
fn elementwise_chain_fuses_into_one_kernel() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let b = g.scale(a, 2.0).unwrap();
    let c = g.neg(b).unwrap();
    g.probe(c, "c").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 1);
    let kernel = &compiled.kernels[0];
    assert_eq!(kernel.nodes, vec![a, b, c]);
    assert_eq!(kernel.inputs, vec![x]);
    assert_eq!(kernel.outputs, vec![c]);
    assert_eq!(kernel.program.strategy, CodeStrategy::SmallTensor);
    assert_eq!(kernel.program.layout.global[0], 256);
}

#[test]
fn nonlocal_edge_splits_kernels() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let s = g.offset(x, 1.0).unwrap();
    let y = g.shift(s, &[1], BorderPolicy::Zero).unwrap();
    let z = g.offset(y, 1.0).unwrap();
    g.probe(z, "z").unwrap();

    let compiled = freeze(&mut g);
    assert!(compiled.kernels.len() >= 2);
    assert_ne!(kernel_index(&compiled, s), kernel_index(&compiled, y));
    assert_eq!(kernel_index(&compiled, y), kernel_index(&compiled, z));

    let consumer = compiled.kernel_of(y).unwrap();
    assert_eq!(consumer.inputs, vec![s]);
    let producer = compiled.kernel_of(s).unwrap();
    assert_eq!(producer.outputs, vec![s]);
}

#[test]
fn different_field_shapes_do_not_fuse() {
    let mut g = Graph::new();
    let x = constant(&mut g, grid(4, 4), 1.0);
    let t = g.trim(x, &[2, 2]).unwrap();
    let u = g.offset(t, 1.0).unwrap();
    let w = g.offset(x, 1.0).unwrap();
    let v = g.expand(u, &[4, 4], BorderPolicy::Zero).unwrap();
    let sum = g.add(v, w).unwrap();
    g.probe(sum, "sum").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(kernel_index(&compiled, t), kernel_index(&compiled, u));
    assert_ne!(kernel_index(&compiled, u), kernel_index(&compiled, v));
    assert_eq!(kernel_index(&compiled, v), kernel_index(&compiled, sum));
}

#[test]
fn disabled_fusion_gives_one_kernel_per_operator() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let b = g.scale(a, 2.0).unwrap();
    g.probe(b, "b").unwrap();

    let config = CompilerConfig {
        fusion: false,
        ..CompilerConfig::default()
    };
    let compiled = g.freeze(&config).unwrap();
    assert_eq!(compiled.kernels.len(), 2);
    assert_eq!(compiled.waves, vec![vec![0], vec![1]]);
}

#[test]
fn unobserved_operators_are_pruned() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let dead = g.offset(x, 5.0).unwrap();
    g.probe(a, "a").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.pruned, vec![dead]);
    assert!(compiled.kernel_of(dead).is_none());
    assert_eq!(compiled.kernels.len(), 1);
}

#[test]
fn pruning_can_be_turned_off() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let kept = g.offset(x, 5.0).unwrap();
    g.probe(a, "a").unwrap();

    let config = CompilerConfig {
        prune_unreachable: false,
        ..CompilerConfig::default()
    };
    let compiled = g.freeze(&config).unwrap();
    assert!(compiled.pruned.is_empty());
    let kernel = compiled.kernel_of(kept).unwrap();
    assert!(kernel.outputs.contains(&kept));
}

#[test]
fn independent_kernels_share_a_wave() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let left = g.shift(x, &[1], BorderPolicy::Cyclic).unwrap();
    let right = g.shift(x, &[-1], BorderPolicy::Cyclic).unwrap();
    g.probe(left, "left").unwrap();
    g.probe(right, "right").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 2);
    assert_eq!(compiled.waves, vec![vec![0, 1]]);
}

#[test]
fn sibling_shifts_of_an_input_share_the_consumer_kernel() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let left = g.shift(x, &[1], BorderPolicy::Cyclic).unwrap();
    let right = g.shift(x, &[-1], BorderPolicy::Cyclic).unwrap();
    let sum = g.add(left, right).unwrap();
    g.probe(sum, "sum").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 1);
    let kernel = &compiled.kernels[0];
    assert_eq!(kernel.nodes, vec![left, right, sum]);
    assert_eq!(kernel.inputs, vec![x]);
    assert_eq!(kernel.outputs, vec![sum]);
    assert_eq!(compiled.waves, vec![vec![0]]);
}

#[test]
fn diamond_over_a_constant_is_one_kernel() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let b = g.scale(x, 2.0).unwrap();
    let c = g.add(a, b).unwrap();
    g.probe(c, "c").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 1);
    assert_eq!(compiled.kernels[0].nodes, vec![a, b, c]);
    assert_eq!(compiled.kernels[0].outputs, vec![c]);
}

#[test]
fn five_point_laplacian_is_one_kernel() {
    let mut g = Graph::new();
    let heat = constant(&mut g, grid(16, 16), 0.5);
    let mut sum = g.scale(heat, -4.0).unwrap();
    for offsets in [[1, 0], [-1, 0], [0, 1], [0, -1]] {
        let neighbour = g.shift(heat, &offsets, BorderPolicy::Cyclic).unwrap();
        sum = g.add(sum, neighbour).unwrap();
    }
    g.probe(sum, "laplacian").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 1);
    assert_eq!(compiled.kernels[0].inputs, vec![heat]);
    assert_eq!(compiled.kernels[0].outputs, vec![sum]);
}

#[test]
fn merging_keeps_nonlocal_edges_apart() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let shifted = g.shift(a, &[1], BorderPolicy::Zero).unwrap();
    let b = g.scale(x, 2.0).unwrap();
    let c = g.add(shifted, b).unwrap();
    g.probe(c, "c").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(compiled.kernels.len(), 2);
    assert_ne!(kernel_index(&compiled, a), kernel_index(&compiled, shifted));
    assert_eq!(kernel_index(&compiled, b), kernel_index(&compiled, c));
    assert_eq!(kernel_index(&compiled, shifted), kernel_index(&compiled, c));
    assert!(kernel_index(&compiled, a) < kernel_index(&compiled, c));
}

#[test]
fn output_limit_starts_a_new_kernel() {
    let mut g = Graph::new();
    let x = constant(&mut g, line(8), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let b = g.offset(a, 1.0).unwrap();
    let c = g.offset(b, 1.0).unwrap();
    for (node, name) in [(a, "a"), (b, "b"), (c, "c")] {
        g.probe(node, name).unwrap();
    }

    let config = CompilerConfig {
        max_kernel_outputs: 2,
        ..CompilerConfig::default()
    };
    let compiled = g.freeze(&config).unwrap();
    assert_eq!(compiled.kernels.len(), 2);
    assert_eq!(compiled.kernels[0].outputs, vec![a, b]);
    assert_eq!(compiled.kernels[1].outputs, vec![c]);
}

#[test]
fn big_tensor_reductions_stand_alone() {
    let mut g = Graph::new();
    let x = constant(&mut g, vectors(4, 6), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let b = g.scale(a, 3.0).unwrap();
    let total = g.tensor_reduce(b, ReduceOp::Sum).unwrap();
    g.probe(total, "total").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(kernel_index(&compiled, a), kernel_index(&compiled, b));
    assert_ne!(kernel_index(&compiled, b), kernel_index(&compiled, total));
    let looped = compiled.kernel_of(a).unwrap();
    assert_eq!(looped.program.strategy, CodeStrategy::BigTensor);
}

#[test]
fn small_and_big_tensors_do_not_mix() {
    let mut g = Graph::new();
    let x = constant(&mut g, vectors(4, 2), 1.0);
    let y = constant(&mut g, vectors(4, 6), 1.0);
    let a = g.offset(x, 1.0).unwrap();
    let first = g.tensor_slice(y, 0).unwrap();
    let b = g.add(a, first).unwrap();
    g.probe(b, "b").unwrap();

    let compiled = freeze(&mut g);
    assert_eq!(kernel_index(&compiled, a), kernel_index(&compiled, b));
    assert_ne!(kernel_index(&compiled, first), kernel_index(&compiled, b));
}
