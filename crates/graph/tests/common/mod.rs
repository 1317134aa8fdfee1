#![allow(dead_code)]

use compute::{FieldData, FieldType, Shape};
use graph::{CompiledGraph, CompilerConfig, Graph, NodeRef};

pub fn line(n: usize) -> FieldType {
    FieldType::scalar(Shape::new(&[n]).unwrap())
}

pub fn grid(rows: usize, cols: usize) -> FieldType {
    FieldType::scalar(Shape::new(&[rows, cols]).unwrap())
}

pub fn vectors(n: usize, len: usize) -> FieldType {
    FieldType::vector(Shape::new(&[n]).unwrap(), len).unwrap()
}

/// Constant field of `ty` filled with `value`.
pub fn constant(g: &mut Graph, ty: FieldType, value: f32) -> NodeRef {
    g.declare_constant(FieldData::filled(ty, value.into()).unwrap())
        .unwrap()
}

pub fn freeze(g: &mut Graph) -> CompiledGraph {
    g.freeze(&CompilerConfig::default()).unwrap()
}

/// Kernel index computing `node`.
pub fn kernel_index(compiled: &CompiledGraph, node: NodeRef) -> usize {
    compiled.kernel_of(node).map(|k| k.id).unwrap()
}
