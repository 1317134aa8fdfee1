//! Per-thread interpretation of kernel statements.
//!
//! Expressions evaluate in one of two modes. Tensor mode yields a whole
//! tensor (length 1 broadcasts); element mode yields a single element and is
//! used inside [`Stmt::ForEachElement`] loops and for element writes.

use std::collections::HashMap;

use super::access::{bordered, resolve};
use super::elementwise::{apply_binary, apply_unary, broadcast_len, pick, reduce, zip_with};
use super::field_ops::{
    convolve_at, field_reduce, logical_element, logical_tensor, stack_fields_at, winner,
};
use crate::field::{Complex, FieldData};
use crate::kernel::{walk_block, BorderPolicy, ElementIndex, Expr, KernelProgram, ReduceOp, Stmt, TempId};
use crate::ComputeError;

/// State owned by one thread of the dispatch.
#[derive(Debug)]
pub struct Thread {
    pub coords: Vec<usize>,
    /// Tensor element owned by the thread under per-element addressing.
    pub element: Option<usize>,
    temps: Vec<Vec<Complex>>,
}

impl Thread {
    #[must_use]
    pub fn new(coords: Vec<usize>, element: Option<usize>, temps: usize) -> Self {
        Self {
            coords,
            element,
            temps: vec![Vec::new(); temps],
        }
    }

    fn temp(&self, id: TempId) -> Result<&[Complex], ComputeError> {
        match self.temps.get(id) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ComputeError::UnboundTemp(id)),
        }
    }

    fn bind(&mut self, id: TempId, value: Vec<Complex>) {
        if id >= self.temps.len() {
            self.temps.resize(id + 1, Vec::new());
        }
        self.temps[id] = value;
    }
}

pub struct Interpreter<'p> {
    program: &'p KernelProgram,
    inputs: Vec<FieldData>,
    reductions: HashMap<(usize, ReduceOp), Vec<Complex>>,
    winners: HashMap<usize, usize>,
}

impl<'p> Interpreter<'p> {
    /// Prepares `inputs` and evaluates whole-field reductions once.
    pub fn new(program: &'p KernelProgram, inputs: Vec<FieldData>) -> Result<Self, ComputeError> {
        let mut wanted_reductions = Vec::new();
        let mut wanted_winners = Vec::new();
        walk_block(&program.body, &mut |expr| match expr {
            Expr::FieldReduce { op, input } => wanted_reductions.push((*input, *op)),
            Expr::WinnerTakeAll { input } => wanted_winners.push(*input),
            _ => {}
        });

        let mut interpreter = Self {
            program,
            inputs,
            reductions: HashMap::new(),
            winners: HashMap::new(),
        };
        for key in wanted_reductions {
            let values = field_reduce(interpreter.input(key.0)?, key.1);
            interpreter.reductions.insert(key, values);
        }
        for slot in wanted_winners {
            let index = winner(interpreter.input(slot)?);
            interpreter.winners.insert(slot, index);
        }
        Ok(interpreter)
    }

    fn input(&self, slot: usize) -> Result<&FieldData, ComputeError> {
        self.inputs.get(slot).ok_or(ComputeError::UnknownSlot(slot))
    }

    fn coordinates(&self, coords: &[Expr], thread: &Thread) -> Result<Vec<isize>, ComputeError> {
        coords
            .iter()
            .map(|c| Ok(pick(&self.tensor(c, thread)?, 0).re.floor() as isize))
            .collect()
    }

    /// Evaluates `expr` to a whole tensor.
    pub fn tensor(&self, expr: &Expr, thread: &Thread) -> Result<Vec<Complex>, ComputeError> {
        Ok(match expr {
            Expr::Read { input, access } => {
                let data = self.input(*input)?;
                match resolve(access, &thread.coords, &data.field_type().field_shape)? {
                    Some(point) => logical_tensor(data, point),
                    None => vec![Complex::ZERO; data.field_type().logical_tensor_len()],
                }
            }
            Expr::ReadAt { input, coords } => {
                let data = self.input(*input)?;
                let at = self.coordinates(coords, thread)?;
                let shape = &data.field_type().field_shape;
                if at.len() != shape.order() {
                    return Err(ComputeError::ShapeMismatch(
                        "read coordinates differ from source order",
                    ));
                }
                match bordered(&at, shape, BorderPolicy::Zero) {
                    Some(point) => logical_tensor(data, point),
                    None => vec![Complex::ZERO; data.field_type().logical_tensor_len()],
                }
            }
            Expr::Temp(id) => thread.temp(*id)?.to_vec(),
            Expr::Const(value) => vec![*value],
            Expr::Unary(op, arg) => self
                .tensor(arg, thread)?
                .into_iter()
                .map(|x| apply_unary(*op, x))
                .collect(),
            Expr::Binary(op, a, b) => {
                let a = self.tensor(a, thread)?;
                let b = self.tensor(b, thread)?;
                zip_with(&a, &b, |x, y| apply_binary(*op, x, y))
                    .ok_or(ComputeError::ShapeMismatch("tensor lengths do not broadcast"))?
            }
            Expr::Select { cond, a, b } => {
                let cond = self.tensor(cond, thread)?;
                let a = self.tensor(a, thread)?;
                let b = self.tensor(b, thread)?;
                let len = broadcast_len(&[cond.len(), a.len(), b.len()])
                    .ok_or(ComputeError::ShapeMismatch("tensor lengths do not broadcast"))?;
                (0..len)
                    .map(|i| {
                        if pick(&cond, i).re == 0.0 {
                            pick(&b, i)
                        } else {
                            pick(&a, i)
                        }
                    })
                    .collect()
            }
            Expr::TensorReduce(op, arg) => vec![reduce(*op, self.tensor(arg, thread)?)],
            Expr::TensorSlice { arg, index } => {
                let value = self.tensor(arg, thread)?;
                vec![*value
                    .get(*index)
                    .ok_or(ComputeError::ShapeMismatch("tensor slice index out of range"))?]
            }
            Expr::StackTensors(args) => args
                .iter()
                .map(|arg| match self.tensor(arg, thread)?.as_slice() {
                    [single] => Ok(*single),
                    _ => Err(ComputeError::ShapeMismatch("stacked tensors must be scalars")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Expr::StackFields(slots) => {
                let sources = slots
                    .iter()
                    .map(|&slot| self.input(slot))
                    .collect::<Result<Vec<_>, _>>()?;
                stack_fields_at(&sources, &thread.coords)?
            }
            Expr::Convolve {
                input,
                filter,
                border,
            } => convolve_at(self.input(*input)?, self.input(*filter)?, &thread.coords, *border)?,
            Expr::FieldReduce { op, input } => self
                .reductions
                .get(&(*input, *op))
                .cloned()
                .ok_or(ComputeError::UnknownSlot(*input))?,
            Expr::WinnerTakeAll { input } => {
                let shape = &self.input(*input)?.field_type().field_shape;
                let here = shape.linear_index(&thread.coords);
                let best = self.winners.get(input).copied();
                if here.is_some() && here == best {
                    vec![Complex::ONE]
                } else {
                    vec![Complex::ZERO]
                }
            }
            Expr::ThreadCoord(axis) => {
                let c = thread
                    .coords
                    .get(*axis)
                    .ok_or(ComputeError::ShapeMismatch("thread coordinate axis out of range"))?;
                vec![Complex::real(*c as f32)]
            }
            Expr::ThreadElement => {
                let e = thread
                    .element
                    .ok_or(ComputeError::ShapeMismatch("thread owns no tensor element"))?;
                vec![Complex::real(e as f32)]
            }
        })
    }

    /// Evaluates element `e` of `expr`.
    pub fn element(&self, expr: &Expr, thread: &Thread, e: usize) -> Result<Complex, ComputeError> {
        Ok(match expr {
            Expr::Read { input, access } => {
                let data = self.input(*input)?;
                let len = data.field_type().logical_tensor_len();
                let e = if len == 1 { 0 } else { e };
                match resolve(access, &thread.coords, &data.field_type().field_shape)? {
                    Some(point) if e < len => logical_element(data, point, e),
                    _ => Complex::ZERO,
                }
            }
            Expr::Temp(id) => pick(thread.temp(*id)?, e),
            Expr::Const(value) => *value,
            Expr::Unary(op, arg) => apply_unary(*op, self.element(arg, thread, e)?),
            Expr::Binary(op, a, b) => {
                apply_binary(*op, self.element(a, thread, e)?, self.element(b, thread, e)?)
            }
            Expr::Select { cond, a, b } => {
                if self.element(cond, thread, e)?.re == 0.0 {
                    self.element(b, thread, e)?
                } else {
                    self.element(a, thread, e)?
                }
            }
            _ => pick(&self.tensor(expr, thread)?, e),
        })
    }

    /// Runs `block` for one thread. `lane` is the enclosing loop index.
    pub fn exec(
        &self,
        block: &[Stmt],
        thread: &mut Thread,
        lane: Option<usize>,
        outputs: &mut [FieldData],
    ) -> Result<(), ComputeError> {
        for stmt in block {
            match stmt {
                Stmt::Let { temp, value } => {
                    let value = match lane {
                        Some(e) => vec![self.element(value, thread, e)?],
                        None => self.tensor(value, thread)?,
                    };
                    thread.bind(*temp, value);
                }
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    let taken = match lane {
                        Some(e) => self.element(cond, thread, e)?,
                        None => pick(&self.tensor(cond, thread)?, 0),
                    };
                    let branch = if taken.re == 0.0 { else_branch } else { then_branch };
                    self.exec(branch, thread, lane, outputs)?;
                }
                Stmt::ForEachElement { extent, body } => {
                    if lane.is_some() {
                        return Err(self.invalid("element loops do not nest"));
                    }
                    for e in 0..*extent {
                        self.exec(body, thread, Some(e), outputs)?;
                    }
                }
                Stmt::WriteTensor { output, value } => {
                    if lane.is_some() {
                        return Err(self.invalid("whole-tensor write inside an element loop"));
                    }
                    let value = self.tensor(value, thread)?;
                    let out = output_mut(outputs, *output)?;
                    if let Some(point) = out.field_type().field_shape.linear_index(&thread.coords) {
                        write_tensor(out, point, &value);
                    }
                }
                Stmt::WriteTensorAt {
                    output,
                    coords,
                    value,
                } => {
                    if lane.is_some() {
                        return Err(self.invalid("whole-tensor write inside an element loop"));
                    }
                    let at = self.coordinates(coords, thread)?;
                    let value = self.tensor(value, thread)?;
                    let out = output_mut(outputs, *output)?;
                    let shape = &out.field_type().field_shape;
                    if at.len() == shape.order() {
                        if let Some(point) = bordered(&at, shape, BorderPolicy::Zero) {
                            write_tensor(out, point, &value);
                        }
                    }
                }
                Stmt::WriteElement {
                    output,
                    element,
                    value,
                } => {
                    let e = match element {
                        ElementIndex::Fixed(e) => *e,
                        ElementIndex::Loop => lane
                            .or(thread.element)
                            .ok_or_else(|| self.invalid("loop element written outside a loop"))?,
                    };
                    let value = self.element(value, thread, e)?;
                    let out = output_mut(outputs, *output)?;
                    let len = out.field_type().tensor_len();
                    if let Some(point) = out.field_type().field_shape.linear_index(&thread.coords) {
                        if e < len {
                            out.set_element(point, e, value);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &'static str) -> ComputeError {
        ComputeError::InvalidProgram {
            kernel: self.program.name.clone(),
            reason,
        }
    }
}

fn output_mut(outputs: &mut [FieldData], slot: usize) -> Result<&mut FieldData, ComputeError> {
    outputs.get_mut(slot).ok_or(ComputeError::UnknownSlot(slot))
}

fn write_tensor(out: &mut FieldData, point: usize, value: &[Complex]) {
    for e in 0..out.field_type().tensor_len() {
        out.set_element(point, e, pick(value, e));
    }
}
