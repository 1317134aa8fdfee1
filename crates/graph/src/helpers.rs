//! Shorthand constructors for the built-in operators.

use compute::kernel::{BinaryOp, BorderPolicy, ReduceOp, UnaryOp};
use compute::{Complex, Shape};

use crate::builder::Graph;
use crate::error::GraphError;
use crate::node::NodeRef;
use crate::ops::OpKind;

type NodeResult = Result<NodeRef, GraphError>;

impl Graph {
    pub fn unary(&mut self, op: UnaryOp, x: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::Unary(op), &[x])
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeRef, b: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::Binary(op), &[a, b])
    }

    pub fn add(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn max(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Max, a, b)
    }

    pub fn min(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Min, a, b)
    }

    /// 1 where `a > b`, else 0.
    pub fn greater(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Greater, a, b)
    }

    /// 1 where `a < b`, else 0.
    pub fn less(&mut self, a: NodeRef, b: NodeRef) -> NodeResult {
        self.binary(BinaryOp::Less, a, b)
    }

    /// `x * factor`.
    pub fn scale(&mut self, x: NodeRef, factor: f32) -> NodeResult {
        self.declare_operator(OpKind::BinaryScalar(BinaryOp::Mul, Complex::real(factor)), &[x])
    }

    /// `x + value`.
    pub fn offset(&mut self, x: NodeRef, value: f32) -> NodeResult {
        self.declare_operator(OpKind::BinaryScalar(BinaryOp::Add, Complex::real(value)), &[x])
    }

    pub fn neg(&mut self, x: NodeRef) -> NodeResult {
        self.unary(UnaryOp::Neg, x)
    }

    /// `a` where `cond` is non-zero, else `b`.
    pub fn select(&mut self, cond: NodeRef, a: NodeRef, b: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::Select, &[cond, a, b])
    }

    /// `out[p] = x[p - offsets]`.
    pub fn shift(&mut self, x: NodeRef, offsets: &[isize], border: BorderPolicy) -> NodeResult {
        self.declare_operator(
            OpKind::Shift {
                offsets: offsets.to_vec(),
                border,
            },
            &[x],
        )
    }

    pub fn expand(&mut self, x: NodeRef, dims: &[usize], border: BorderPolicy) -> NodeResult {
        let shape = Shape::new(dims).map_err(|e| GraphError::from_field("expand", e))?;
        self.declare_operator(OpKind::Expand { shape, border }, &[x])
    }

    pub fn trim(&mut self, x: NodeRef, dims: &[usize]) -> NodeResult {
        let shape = Shape::new(dims).map_err(|e| GraphError::from_field("trim", e))?;
        self.declare_operator(OpKind::Trim { shape }, &[x])
    }

    pub fn transpose(&mut self, x: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::Transpose, &[x])
    }

    pub fn downsample(&mut self, x: NodeRef, factor: usize) -> NodeResult {
        self.declare_operator(OpKind::Downsample(factor), &[x])
    }

    pub fn upsample(&mut self, x: NodeRef, factor: usize) -> NodeResult {
        self.declare_operator(OpKind::Upsample(factor), &[x])
    }

    pub fn field_slice(&mut self, x: NodeRef, index: usize) -> NodeResult {
        self.declare_operator(OpKind::FieldSlice(index), &[x])
    }

    pub fn stack_fields(&mut self, fields: &[NodeRef]) -> NodeResult {
        self.declare_operator(OpKind::StackFields, fields)
    }

    pub fn stack_tensors(&mut self, fields: &[NodeRef]) -> NodeResult {
        self.declare_operator(OpKind::StackTensors, fields)
    }

    pub fn tensor_slice(&mut self, x: NodeRef, index: usize) -> NodeResult {
        self.declare_operator(OpKind::TensorSlice(index), &[x])
    }

    pub fn tensor_reduce(&mut self, x: NodeRef, op: ReduceOp) -> NodeResult {
        self.declare_operator(OpKind::TensorReduce(op), &[x])
    }

    pub fn color_to_vector(&mut self, x: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::ColorToVector, &[x])
    }

    pub fn convolve(&mut self, x: NodeRef, filter: NodeRef, border: BorderPolicy) -> NodeResult {
        self.declare_operator(OpKind::Convolve { border }, &[x, filter])
    }

    pub fn field_reduce(&mut self, x: NodeRef, op: ReduceOp) -> NodeResult {
        self.declare_operator(OpKind::FieldReduce(op), &[x])
    }

    /// 1 at the first maximum of a real scalar field, 0 elsewhere.
    pub fn winner_take_all(&mut self, x: NodeRef) -> NodeResult {
        self.declare_operator(OpKind::WinnerTakeAll, &[x])
    }
}
