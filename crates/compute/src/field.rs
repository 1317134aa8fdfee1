//! # Tensor Field Model
//!
//! A *field* is an array of identically shaped tensors indexed over zero to
//! three spatial dimensions. Every other layer of the workspace speaks in
//! terms of the types defined here:
//!
//! -   [`Shape`] describes either the field layout ([`FieldType::field_shape`])
//!     or the layout of each tensor ([`FieldType::tensor_shape`]).
//! -   [`ElementKind`] says how many `f32` components make up one tensor
//!     element (real, complex or color).
//! -   [`FieldType`] ties the three together, and [`combine`] implements the
//!     broadcast rule used by elementwise operators.
//! -   [`FieldData`] holds concrete values in the flat layout shared by the
//!     kernel interpreter and the clock.
//!
//! Field points are stored row-major: the last axis (column) varies fastest,
//! then row, then layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;
use thiserror::Error;

use crate::BufferView;

/// Highest supported order for both field and tensor shapes.
pub const MAX_ORDER: usize = 3;

/// Tensors with at most this many elements are register resident.
pub const SMALL_TENSOR_LIMIT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("cannot combine {left} with {right}: unequal non-degenerate {axis} shapes")]
    ShapeMismatch {
        axis: &'static str,
        left: Shape,
        right: Shape,
    },
    #[error("element kind {0} is not supported here")]
    UnsupportedElementKind(ElementKind),
    #[error("shape order {0} exceeds the supported maximum of 3")]
    OrderTooHigh(usize),
    #[error("shape {0:?} has a zero extent")]
    ZeroExtent(Vec<usize>),
    #[error("expected {expected} values for {field_type}, found {found}")]
    ValueCountMismatch {
        field_type: FieldType,
        expected: usize,
        found: usize,
    },
}

/// Ordered tuple of 0–3 positive extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Builds a shape, rejecting orders above three and zero extents.
    pub fn new(dims: &[usize]) -> Result<Self, FieldError> {
        if dims.len() > MAX_ORDER {
            return Err(FieldError::OrderTooHigh(dims.len()));
        }
        if dims.contains(&0) {
            return Err(FieldError::ZeroExtent(dims.to_vec()));
        }
        Ok(Self(dims.to_vec()))
    }

    /// The degenerate, order-0 shape.
    #[must_use]
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of positions described by the shape; 1 for order 0.
    #[must_use]
    pub fn points(&self) -> usize {
        self.0.iter().product()
    }

    /// Row-major linear index of `coords`, or `None` when out of range.
    #[must_use]
    pub fn linear_index(&self, coords: &[usize]) -> Option<usize> {
        if coords.len() != self.0.len() {
            return None;
        }
        let mut index = 0;
        for (&c, &extent) in coords.iter().zip(&self.0) {
            if c >= extent {
                return None;
            }
            index = index * extent + c;
        }
        Some(index)
    }

    /// Inverse of [`Shape::linear_index`].
    #[must_use]
    pub fn coords_of(&self, mut index: usize) -> Vec<usize> {
        let mut coords = vec![0; self.0.len()];
        for (slot, &extent) in coords.iter_mut().zip(&self.0).rev() {
            *slot = index % extent;
            index /= extent;
        }
        coords
    }
}

impl TryFrom<Vec<usize>> for Shape {
    type Error = FieldError;

    fn try_from(dims: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(&dims)
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Real,
    Complex,
    /// RGB pixels, or RGBA when `alpha` is set.
    Color { alpha: bool },
}

impl ElementKind {
    /// Number of `f32` components stored per tensor element.
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            Self::Real => 1,
            Self::Complex => 2,
            Self::Color { alpha: false } => 3,
            Self::Color { alpha: true } => 4,
        }
    }

    #[must_use]
    pub const fn is_color(self) -> bool {
        matches!(self, Self::Color { .. })
    }

    /// Arithmetic promotion: complex wins over real, color never combines.
    pub fn promote(self, other: Self) -> Result<Self, FieldError> {
        match (self, other) {
            (Self::Color { .. }, _) => Err(FieldError::UnsupportedElementKind(self)),
            (_, Self::Color { .. }) => Err(FieldError::UnsupportedElementKind(other)),
            (Self::Real, Self::Real) => Ok(Self::Real),
            _ => Ok(Self::Complex),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Complex => write!(f, "complex"),
            Self::Color { alpha: false } => write!(f, "color"),
            Self::Color { alpha: true } => write!(f, "color+alpha"),
        }
    }
}

/// Code path selected for a tensor size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TensorRegime {
    /// Whole tensors live in registers.
    Small,
    /// Tensors are processed one element at a time in a loop.
    Big,
}

impl TensorRegime {
    #[must_use]
    pub const fn of_len(tensor_len: usize) -> Self {
        if tensor_len <= SMALL_TENSOR_LIMIT {
            Self::Small
        } else {
            Self::Big
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldType {
    pub field_shape: Shape,
    pub tensor_shape: Shape,
    pub element: ElementKind,
}

impl FieldType {
    #[must_use]
    pub fn new(field_shape: Shape, tensor_shape: Shape, element: ElementKind) -> Self {
        Self {
            field_shape,
            tensor_shape,
            element,
        }
    }

    /// Real scalar field over `field_shape`.
    #[must_use]
    pub fn scalar(field_shape: Shape) -> Self {
        Self::new(field_shape, Shape::scalar(), ElementKind::Real)
    }

    /// Real vector field with `len`-element tensors.
    pub fn vector(field_shape: Shape, len: usize) -> Result<Self, FieldError> {
        Ok(Self::new(field_shape, Shape::new(&[len])?, ElementKind::Real))
    }

    #[must_use]
    pub fn with_element(&self, element: ElementKind) -> Self {
        Self::new(self.field_shape.clone(), self.tensor_shape.clone(), element)
    }

    #[must_use]
    pub fn points(&self) -> usize {
        self.field_shape.points()
    }

    /// Elements per tensor as stored; a color pixel counts as one element.
    #[must_use]
    pub fn tensor_len(&self) -> usize {
        self.tensor_shape.points()
    }

    /// Elements per tensor as seen by kernels; color channels are elements.
    #[must_use]
    pub fn logical_tensor_len(&self) -> usize {
        if self.element.is_color() {
            self.element.components()
        } else {
            self.tensor_len()
        }
    }

    /// Total `f32` count of a field of this type.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.points() * self.tensor_len() * self.element.components()
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.value_count() * std::mem::size_of::<f32>()
    }

    #[must_use]
    pub fn regime(&self) -> TensorRegime {
        TensorRegime::of_len(self.logical_tensor_len())
    }

    /// Reinterprets a color field as a real vector field, channel order kept.
    pub fn color_as_vector(&self) -> Result<Self, FieldError> {
        match self.element {
            ElementKind::Color { .. } if self.tensor_shape.is_degenerate() => Ok(Self::new(
                self.field_shape.clone(),
                Shape::new(&[self.element.components()])?,
                ElementKind::Real,
            )),
            other => Err(FieldError::UnsupportedElementKind(other)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} field",
            self.field_shape, self.tensor_shape, self.element
        )
    }
}

fn combine_axis(axis: &'static str, left: &Shape, right: &Shape) -> Result<Shape, FieldError> {
    if left == right || right.is_degenerate() {
        Ok(left.clone())
    } else if left.is_degenerate() {
        Ok(right.clone())
    } else {
        Err(FieldError::ShapeMismatch {
            axis,
            left: left.clone(),
            right: right.clone(),
        })
    }
}

/// Result type of an elementwise operation on `a` and `b`.
///
/// Field shapes and tensor shapes are resolved independently: equal shapes
/// pass through, a degenerate operand broadcasts against the other one.
pub fn combine(a: &FieldType, b: &FieldType) -> Result<FieldType, FieldError> {
    let element = a.element.promote(b.element)?;
    let field_shape = combine_axis("field", &a.field_shape, &b.field_shape)?;
    let tensor_shape = combine_axis("tensor", &a.tensor_shape, &b.tensor_shape)?;
    Ok(FieldType::new(field_shape, tensor_shape, element))
}

/// One real or complex element, as seen by kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Complex {
    pub re: f32,
    pub im: f32,
}

impl Complex {
    pub const ZERO: Self = Self { re: 0.0, im: 0.0 };
    pub const ONE: Self = Self { re: 1.0, im: 0.0 };

    #[must_use]
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    #[must_use]
    pub const fn real(re: f32) -> Self {
        Self { re, im: 0.0 }
    }

    #[must_use]
    pub fn norm_sqr(self) -> f32 {
        self.re * self.re + self.im * self.im
    }

    #[must_use]
    pub fn abs(self) -> f32 {
        self.norm_sqr().sqrt()
    }

    #[must_use]
    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }

    #[must_use]
    pub fn exp(self) -> Self {
        let scale = self.re.exp();
        Self::new(scale * self.im.cos(), scale * self.im.sin())
    }

    #[must_use]
    pub fn ln(self) -> Self {
        Self::new(self.abs().ln(), self.im.atan2(self.re))
    }

    #[must_use]
    pub fn sqrt(self) -> Self {
        if self.im == 0.0 && self.re >= 0.0 {
            return Self::real(self.re.sqrt());
        }
        let r = self.abs().sqrt();
        let theta = self.im.atan2(self.re) / 2.0;
        Self::new(r * theta.cos(), r * theta.sin())
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        if rhs.im == 0.0 {
            return Self::new(self.re / rhs.re, self.im / rhs.re);
        }
        let denom = rhs.norm_sqr();
        Self::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

impl Neg for Complex {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }
}

/// Scalar value used to initialize fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorElement {
    Real(f32),
    Complex(f32, f32),
}

impl From<TensorElement> for Complex {
    fn from(element: TensorElement) -> Self {
        match element {
            TensorElement::Real(re) => Complex::real(re),
            TensorElement::Complex(re, im) => Complex::new(re, im),
        }
    }
}

impl From<f32> for TensorElement {
    fn from(value: f32) -> Self {
        TensorElement::Real(value)
    }
}

/// Concrete values of a field in the flat layout described at module level.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    field_type: FieldType,
    values: Vec<f32>,
}

impl FieldData {
    #[must_use]
    pub fn zeros(field_type: FieldType) -> Self {
        let values = vec![0.0; field_type.value_count()];
        Self { field_type, values }
    }

    /// Wraps raw component values, checking their count.
    pub fn from_values(field_type: FieldType, values: Vec<f32>) -> Result<Self, FieldError> {
        let expected = field_type.value_count();
        if values.len() != expected {
            return Err(FieldError::ValueCountMismatch {
                field_type,
                expected,
                found: values.len(),
            });
        }
        Ok(Self { field_type, values })
    }

    /// Real scalar field over a 1-D shape holding `values`.
    pub fn from_slice(values: &[f32]) -> Result<Self, FieldError> {
        let field_type = FieldType::scalar(Shape::new(&[values.len()])?);
        Self::from_values(field_type, values.to_vec())
    }

    /// Fills every tensor element from `init(point_coords, element_index)`.
    pub fn from_fn<F>(field_type: FieldType, mut init: F) -> Result<Self, FieldError>
    where
        F: FnMut(&[usize], usize) -> TensorElement,
    {
        if field_type.element.is_color() {
            return Err(FieldError::UnsupportedElementKind(field_type.element));
        }
        let mut data = Self::zeros(field_type);
        let tensor_len = data.field_type.tensor_len();
        for point in 0..data.field_type.points() {
            let coords = data.field_type.field_shape.coords_of(point);
            for element in 0..tensor_len {
                data.set_element(point, element, init(&coords, element).into());
            }
        }
        Ok(data)
    }

    /// Every tensor element set to `value`.
    pub fn filled(field_type: FieldType, value: TensorElement) -> Result<Self, FieldError> {
        Self::from_fn(field_type, |_, _| value)
    }

    /// Decodes bytes produced by a compute backend.
    pub fn from_bytes(field_type: FieldType, bytes: &[u8]) -> Result<Self, FieldError> {
        if bytes.len() != field_type.byte_len() {
            return Err(FieldError::ValueCountMismatch {
                expected: field_type.value_count(),
                found: bytes.len() / std::mem::size_of::<f32>(),
                field_type,
            });
        }
        let values = bytes
            .chunks_exact(std::mem::size_of::<f32>())
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        Ok(Self { field_type, values })
    }

    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    fn offset(&self, point: usize, element: usize) -> usize {
        let components = self.field_type.element.components();
        (point * self.field_type.tensor_len() + element) * components
    }

    /// Element `element` of the tensor at linear field index `point`.
    ///
    /// Color fields expose their first channel; use [`FieldData::values`]
    /// for raw channel access.
    #[must_use]
    pub fn element(&self, point: usize, element: usize) -> Complex {
        let at = self.offset(point, element);
        match self.field_type.element {
            ElementKind::Complex => Complex::new(self.values[at], self.values[at + 1]),
            _ => Complex::real(self.values[at]),
        }
    }

    /// Writes one element; the imaginary part is dropped for real fields.
    pub fn set_element(&mut self, point: usize, element: usize, value: Complex) {
        let at = self.offset(point, element);
        self.values[at] = value.re;
        if self.field_type.element == ElementKind::Complex {
            self.values[at + 1] = value.im;
        }
    }

    /// Copies the values into a [`BufferView`] for backend dispatch.
    #[must_use]
    pub fn to_buffer_view(&self) -> BufferView {
        let bytes: Arc<[u8]> = bytemuck::cast_slice(&self.values).to_vec().into();
        BufferView::new(bytes, self.field_type.clone())
    }
}
