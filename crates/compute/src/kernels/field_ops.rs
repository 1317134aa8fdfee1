//! Whole-field operations evaluated against complete input buffers.
//!
//! Reductions and winner-take-all depend on every point of their input, so
//! the interpreter computes them once per dispatch and each thread picks its
//! share. Convolution and field stacking are gathered per thread.

use super::access::{bordered, resolve};
use super::elementwise::reduce;
use crate::field::{Complex, FieldData};
use crate::kernel::{Access, BorderPolicy, ReduceOp};
use crate::ComputeError;

/// Logical tensor element `e` of `data` at linear point `point`.
///
/// Color fields are read channel by channel as real elements.
pub fn logical_element(data: &FieldData, point: usize, e: usize) -> Complex {
    let ty = data.field_type();
    if ty.element.is_color() {
        let at = point * ty.logical_tensor_len() + e;
        Complex::real(data.values().get(at).copied().unwrap_or(0.0))
    } else {
        data.element(point, e)
    }
}

pub fn logical_tensor(data: &FieldData, point: usize) -> Vec<Complex> {
    (0..data.field_type().logical_tensor_len())
        .map(|e| logical_element(data, point, e))
        .collect()
}

/// Reduces every point of `data`, element by element, to one tensor.
pub fn field_reduce(data: &FieldData, op: ReduceOp) -> Vec<Complex> {
    let points = data.field_type().points();
    (0..data.field_type().logical_tensor_len())
        .map(|e| reduce(op, (0..points).map(|p| logical_element(data, p, e))))
        .collect()
}

/// Linear index of the first maximum; ties go to the lowest index.
pub fn winner(data: &FieldData) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for p in 0..data.field_type().points() {
        let value = logical_element(data, p, 0).re;
        if value > best_value {
            best = p;
            best_value = value;
        }
    }
    best
}

/// `out[p] = sum_k input[p + c - k] * filter[k]`, `c` being the filter centre.
pub fn convolve_at(
    input: &FieldData,
    filter: &FieldData,
    thread: &[usize],
    border: BorderPolicy,
) -> Result<Vec<Complex>, ComputeError> {
    let in_shape = &input.field_type().field_shape;
    let filter_shape = &filter.field_type().field_shape;
    if filter_shape.order() != in_shape.order() || thread.len() != in_shape.order() {
        return Err(ComputeError::ShapeMismatch("filter order differs from input order"));
    }
    let centre: Vec<isize> = filter_shape.dims().iter().map(|&d| (d / 2) as isize).collect();
    let len = input.field_type().logical_tensor_len();
    let mut acc = vec![Complex::ZERO; len];
    for k in 0..filter_shape.points() {
        let offset = filter_shape.coords_of(k);
        let coords: Vec<isize> = thread
            .iter()
            .zip(&offset)
            .zip(&centre)
            .map(|((&p, &o), &c)| p as isize + c - o as isize)
            .collect();
        let Some(source) = bordered(&coords, in_shape, border) else {
            continue;
        };
        let weight = filter.element(k, 0);
        for (e, slot) in acc.iter_mut().enumerate() {
            *slot = *slot + logical_element(input, source, e) * weight;
        }
    }
    Ok(acc)
}

/// Tensor at `thread = (i, p...)` of the field stacking `sources` along a new
/// leading axis.
pub fn stack_fields_at(
    sources: &[&FieldData],
    thread: &[usize],
) -> Result<Vec<Complex>, ComputeError> {
    let (&layer, rest) = thread
        .split_first()
        .ok_or(ComputeError::ShapeMismatch("stacked field needs a leading axis"))?;
    let source = sources
        .get(layer)
        .ok_or(ComputeError::ShapeMismatch("stack index exceeds the number of fields"))?;
    let len = source.field_type().logical_tensor_len();
    Ok(
        match resolve(&Access::Local, rest, &source.field_type().field_shape)? {
            Some(point) => logical_tensor(source, point),
            None => vec![Complex::ZERO; len],
        },
    )
}
