use compute::{ComputeError, ElementKind, FieldError, FieldType};
use std::fmt;
use thiserror::Error;

use crate::node::NodeRef;

/// Errors raised while declaring nodes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("{op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },
    #[error("recurrence expects {expected}, source produces {found}")]
    TypeMismatch { expected: FieldType, found: FieldType },
    #[error("recurrence {0} is already bound")]
    AlreadyBound(NodeRef),
    #[error("{op} does not accept {element} elements")]
    UnsupportedElementKind {
        op: &'static str,
        element: ElementKind,
    },
    #[error("graph is frozen")]
    GraphFrozen,
    #[error("node {0} does not exist")]
    UnknownNode(NodeRef),
    #[error("node {0} is not a constant")]
    NotAConstant(NodeRef),
    #[error("node {0} produces no field")]
    NotAField(NodeRef),
    #[error("{op}: {reason}")]
    InvalidParameter { op: &'static str, reason: String },
    #[error("kernel `{kernel}` declares {count} outputs, more than the limit of 10")]
    TooManyOutputs { kernel: String, count: usize },
    #[error("invalid field data: {0}")]
    Field(FieldError),
}

impl GraphError {
    /// Attributes a field-model failure to operator `op`.
    pub(crate) fn from_field(op: &'static str, err: FieldError) -> Self {
        match err {
            FieldError::ShapeMismatch { .. } => Self::ShapeMismatch {
                op,
                detail: err.to_string(),
            },
            FieldError::UnsupportedElementKind(element) => {
                Self::UnsupportedElementKind { op, element }
            }
            other => Self::Field(other),
        }
    }

    pub(crate) fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            op,
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }
}

impl From<FieldError> for GraphError {
    fn from(err: FieldError) -> Self {
        Self::from_field("field", err)
    }
}

/// Legality rule broken by a fusion candidate edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusionRule {
    /// Producer and consumer run over different field shapes.
    FieldShapeMismatch,
    /// The consumer reads the producer at other coordinates than its own.
    NonlocalAccess,
    /// One side is a small-tensor node, the other a big-tensor node.
    TensorRegimeMismatch,
    /// A big-tensor node whose elements depend on other elements.
    BigTensorLooping,
    /// Custom kernels always compile alone.
    CustomKernelBoundary,
    /// Joining would make the kernel graph cyclic.
    KernelCycle,
    /// Joining would exceed the per-kernel output limit.
    OutputLimit,
}

impl fmt::Display for FusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::FieldShapeMismatch => "field shapes differ",
            Self::NonlocalAccess => "nonlocal read",
            Self::TensorRegimeMismatch => "small and big tensors mixed",
            Self::BigTensorLooping => "big tensor is not element-parallel",
            Self::CustomKernelBoundary => "custom kernel boundary",
            Self::KernelCycle => "kernel graph would become cyclic",
            Self::OutputLimit => "too many kernel outputs",
        };
        f.write_str(text)
    }
}

/// Errors raised by [`crate::Graph::freeze`]. No compiled graph is produced.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("feed-forward cycle through nodes {nodes:?}")]
    CyclicGraph { nodes: Vec<NodeRef> },
    #[error("illegal fusion of {producer} into {consumer}: {rule}")]
    IllegalFusion {
        producer: NodeRef,
        consumer: NodeRef,
        rule: FusionRule,
    },
    #[error("kernel `{kernel}`: statement {index} follows a whole-tensor write")]
    IllegalTrailingStatement { kernel: String, index: usize },
    #[error("kernel `{kernel}`: {reason}")]
    IllegalAddressing { kernel: String, reason: &'static str },
    #[error("kernel `{kernel}`: {detail}")]
    ShapeMismatch { kernel: String, detail: String },
    #[error("graph is already frozen")]
    GraphFrozen,
    #[error(transparent)]
    Compute(#[from] ComputeError),
}
