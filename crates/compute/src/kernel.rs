//! Kernel IR consumed by compute backends.
//!
//! A [`KernelProgram`] is one GPU dispatch: a list of input buffers, up to
//! [`MAX_KERNEL_OUTPUTS`] output buffers and a statement body executed once
//! per thread. Code generators for real devices translate this IR into their
//! own source language; the CPU backend interprets it directly.

use crate::field::{Complex, FieldType};
use crate::layout::WorkGroupLayout;
use serde::{Deserialize, Serialize};

/// Upper bound on the number of fields one kernel may write.
pub const MAX_KERNEL_OUTPUTS: usize = 10;

pub type TempId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tanh,
    Sigmoid,
    Rectify,
    Floor,
    Square,
    Reciprocal,
    RealPart,
    ImaginaryPart,
    Conjugate,
    Magnitude,
}

impl UnaryOp {
    /// Ops that are only defined on the real line.
    #[must_use]
    pub const fn requires_real(self) -> bool {
        matches!(
            self,
            Self::Sin | Self::Cos | Self::Tanh | Self::Sigmoid | Self::Rectify | Self::Floor
        )
    }

    /// Ops whose result is always real, whatever the operand.
    #[must_use]
    pub const fn yields_real(self) -> bool {
        matches!(
            self,
            Self::RealPart | Self::ImaginaryPart | Self::Magnitude | Self::Abs
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    /// 1 where `a > b`, else 0.
    Greater,
    /// 1 where `a < b`, else 0.
    Less,
}

impl BinaryOp {
    #[must_use]
    pub const fn requires_real(self) -> bool {
        matches!(self, Self::Max | Self::Min | Self::Greater | Self::Less)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

impl ReduceOp {
    #[must_use]
    pub const fn requires_real(self) -> bool {
        matches!(self, Self::Max | Self::Min)
    }
}

/// How reads outside a field are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorderPolicy {
    /// Outside values are zero.
    Zero,
    /// Coordinates are clamped to the nearest edge.
    Clamp,
    /// Coordinates wrap around.
    Cyclic,
}

/// Mapping from a thread's coordinates to the coordinates read in a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Access {
    /// Same coordinates; a 0-D source broadcasts to every thread.
    Local,
    /// `source[p - delta]`.
    Offset {
        delta: Vec<isize>,
        border: BorderPolicy,
    },
    /// Thread space is larger than the source; outside reads use `border`.
    Expanded { border: BorderPolicy },
    /// Thread space is a leading sub-window of the source.
    Trimmed,
    /// `source[p[1], p[0]]`.
    Transposed,
    /// `source[p * factor]`.
    Downsampled { factor: usize },
    /// `source[p / factor]`.
    Upsampled { factor: usize },
    /// `source[index, p...]`.
    Row { index: usize },
}

impl Access {
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Read {
        input: usize,
        access: Access,
    },
    /// Read at coordinates computed per thread; out-of-range reads are zero.
    ReadAt {
        input: usize,
        coords: Vec<Expr>,
    },
    Temp(TempId),
    Const(Complex),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a` where `cond` is non-zero, else `b`.
    Select {
        cond: Box<Expr>,
        a: Box<Expr>,
        b: Box<Expr>,
    },
    TensorReduce(ReduceOp, Box<Expr>),
    TensorSlice {
        arg: Box<Expr>,
        index: usize,
    },
    StackTensors(Vec<Expr>),
    /// Output point `(i, p...)` reads input `inputs[i]` at `p`.
    StackFields(Vec<usize>),
    Convolve {
        input: usize,
        filter: usize,
        border: BorderPolicy,
    },
    FieldReduce {
        op: ReduceOp,
        input: usize,
    },
    /// 1 at the first maximum of a scalar field, 0 elsewhere.
    WinnerTakeAll {
        input: usize,
    },
    ThreadCoord(usize),
    /// Tensor element owned by the thread under per-element addressing.
    ThreadElement,
}

impl Expr {
    #[must_use]
    pub fn read(input: usize) -> Self {
        Self::Read {
            input,
            access: Access::Local,
        }
    }

    #[must_use]
    pub fn constant(value: f32) -> Self {
        Self::Const(Complex::real(value))
    }

    #[must_use]
    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Self::Unary(op, Box::new(arg))
    }

    #[must_use]
    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        Self::Binary(op, Box::new(a), Box::new(b))
    }

    /// Calls `visit` on this expression and every sub-expression.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Self::ReadAt { coords, .. } => coords.iter().for_each(|c| c.walk(visit)),
            Self::Unary(_, arg) | Self::TensorReduce(_, arg) | Self::TensorSlice { arg, .. } => {
                arg.walk(visit);
            }
            Self::Binary(_, a, b) => {
                a.walk(visit);
                b.walk(visit);
            }
            Self::Select { cond, a, b } => {
                cond.walk(visit);
                a.walk(visit);
                b.walk(visit);
            }
            Self::StackTensors(args) => args.iter().for_each(|a| a.walk(visit)),
            Self::Read { .. }
            | Self::Temp(_)
            | Self::Const(_)
            | Self::StackFields(_)
            | Self::Convolve { .. }
            | Self::FieldReduce { .. }
            | Self::WinnerTakeAll { .. }
            | Self::ThreadCoord(_)
            | Self::ThreadElement => {}
        }
    }

    /// True when the expression reads the thread's tensor element.
    #[must_use]
    pub fn uses_thread_element(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::ThreadElement));
        found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementIndex {
    Fixed(usize),
    /// Index of the enclosing [`Stmt::ForEachElement`] loop.
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        temp: TempId,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    /// Big-tensor loop; expressions inside evaluate one element at a time.
    ForEachElement {
        extent: usize,
        body: Vec<Stmt>,
    },
    /// Whole-tensor write at the thread's own coordinates.
    WriteTensor {
        output: usize,
        value: Expr,
    },
    /// Whole-tensor write at explicit coordinates.
    WriteTensorAt {
        output: usize,
        coords: Vec<Expr>,
        value: Expr,
    },
    WriteElement {
        output: usize,
        element: ElementIndex,
        value: Expr,
    },
}

impl Stmt {
    #[must_use]
    pub fn is_tensor_write(&self) -> bool {
        matches!(self, Self::WriteTensor { .. } | Self::WriteTensorAt { .. })
    }

    /// Expressions directly owned by this statement (not nested blocks).
    #[must_use]
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Let { value, .. }
            | Self::WriteTensor { value, .. }
            | Self::WriteElement { value, .. } => vec![value],
            Self::WriteTensorAt { coords, value, .. } => {
                coords.iter().chain(std::iter::once(value)).collect()
            }
            Self::If { cond, .. } => vec![cond],
            Self::ForEachElement { .. } => Vec::new(),
        }
    }

    /// Nested statement blocks.
    #[must_use]
    pub fn blocks(&self) -> Vec<&[Stmt]> {
        match self {
            Self::If {
                then_branch,
                else_branch,
                ..
            } => vec![then_branch.as_slice(), else_branch.as_slice()],
            Self::ForEachElement { body, .. } => vec![body.as_slice()],
            _ => Vec::new(),
        }
    }
}

/// Calls `visit` on every expression reachable from `block`.
pub fn walk_block<'a>(block: &'a [Stmt], visit: &mut dyn FnMut(&'a Expr)) {
    for stmt in block {
        for expr in stmt.exprs() {
            expr.walk(visit);
        }
        for nested in stmt.blocks() {
            walk_block(nested, visit);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeStrategy {
    /// Register-resident whole tensors.
    SmallTensor,
    /// Element-looped reads and writes.
    BigTensor,
}

/// Which field the thread grid is laid over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ThreadAddressing {
    /// One thread per output tensor.
    #[default]
    PerOutputTensor,
    /// One thread per tensor of the given input.
    PerInputTensor(usize),
    /// One thread per tensor element of the given input.
    PerInputElement(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelProgram {
    pub name: String,
    pub inputs: Vec<FieldType>,
    pub outputs: Vec<FieldType>,
    pub strategy: CodeStrategy,
    pub addressing: ThreadAddressing,
    pub layout: WorkGroupLayout,
    pub temps: usize,
    pub body: Vec<Stmt>,
}

impl KernelProgram {
    /// Field type whose points (or elements) define the thread grid.
    #[must_use]
    pub fn addressing_field(&self) -> Option<&FieldType> {
        match self.addressing {
            ThreadAddressing::PerOutputTensor => self.outputs.first(),
            ThreadAddressing::PerInputTensor(slot) | ThreadAddressing::PerInputElement(slot) => {
                self.inputs.get(slot)
            }
        }
    }
}
