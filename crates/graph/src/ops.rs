//! Built-in operators: their type rules, how they read their inputs, and the
//! kernel expression each one lowers to.

use compute::kernel::{Access, BinaryOp, BorderPolicy, Expr, ReduceOp, UnaryOp};
use compute::{combine, Complex, ElementKind, FieldType, Shape};

use crate::error::GraphError;

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `field op value`, with the constant folded into the kernel.
    BinaryScalar(BinaryOp, Complex),
    /// Inputs `(cond, a, b)`.
    Select,
    TensorReduce(ReduceOp),
    TensorSlice(usize),
    StackTensors,
    ColorToVector,
    /// `out[p] = in[p - offsets]`.
    Shift {
        offsets: Vec<isize>,
        border: BorderPolicy,
    },
    Expand {
        shape: Shape,
        border: BorderPolicy,
    },
    Trim {
        shape: Shape,
    },
    Transpose,
    Downsample(usize),
    Upsample(usize),
    /// Fixes the first field axis at `index`.
    FieldSlice(usize),
    StackFields,
    /// Inputs `(field, filter)`.
    Convolve {
        border: BorderPolicy,
    },
    FieldReduce(ReduceOp),
    WinnerTakeAll,
}

/// How a consumer reads one of its inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRead {
    /// Through an access pattern evaluated per thread.
    Access(Access),
    /// As a whole buffer (gathers, reductions).
    Buffer,
}

impl InputRead {
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Access(access) if access.is_local())
    }
}

/// Operand of a node inside a kernel body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Value computed earlier in the same kernel.
    Temp(usize),
    /// Kernel input buffer.
    Slot(usize),
}

impl Operand {
    fn local(self) -> Expr {
        match self {
            Self::Temp(t) => Expr::Temp(t),
            Self::Slot(s) => Expr::read(s),
        }
    }
}

fn real_only(op: &'static str, ty: &FieldType) -> Result<(), GraphError> {
    if ty.element == ElementKind::Real {
        Ok(())
    } else {
        Err(GraphError::UnsupportedElementKind {
            op,
            element: ty.element,
        })
    }
}

fn no_color(op: &'static str, ty: &FieldType) -> Result<(), GraphError> {
    if ty.element.is_color() {
        Err(GraphError::UnsupportedElementKind {
            op,
            element: ty.element,
        })
    } else {
        Ok(())
    }
}

fn with_field_shape(ty: &FieldType, dims: &[usize]) -> Result<FieldType, GraphError> {
    Ok(FieldType::new(
        Shape::new(dims)?,
        ty.tensor_shape.clone(),
        ty.element,
    ))
}

impl OpKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unary(_) => "unary",
            Self::Binary(_) => "binary",
            Self::BinaryScalar(..) => "binary with constant",
            Self::Select => "select",
            Self::TensorReduce(_) => "tensor reduce",
            Self::TensorSlice(_) => "tensor slice",
            Self::StackTensors => "stack tensors",
            Self::ColorToVector => "color to vector",
            Self::Shift { .. } => "shift",
            Self::Expand { .. } => "expand",
            Self::Trim { .. } => "trim",
            Self::Transpose => "transpose",
            Self::Downsample(_) => "downsample",
            Self::Upsample(_) => "upsample",
            Self::FieldSlice(_) => "field slice",
            Self::StackFields => "stack fields",
            Self::Convolve { .. } => "convolve",
            Self::FieldReduce(_) => "field reduce",
            Self::WinnerTakeAll => "winner take all",
        }
    }

    fn arity(&self) -> Option<usize> {
        match self {
            Self::Binary(_) | Self::Convolve { .. } => Some(2),
            Self::Select => Some(3),
            Self::StackTensors | Self::StackFields => None,
            _ => Some(1),
        }
    }

    /// Output type for `inputs`, or the rule they break.
    pub fn output_type(&self, inputs: &[&FieldType]) -> Result<FieldType, GraphError> {
        let op = self.name();
        match self.arity() {
            Some(n) if inputs.len() != n => {
                return Err(GraphError::invalid(
                    op,
                    format!("expects {n} inputs, got {}", inputs.len()),
                ));
            }
            None if inputs.is_empty() => {
                return Err(GraphError::invalid(op, "expects at least one input"));
            }
            _ => {}
        }
        if !matches!(self, Self::ColorToVector) {
            for ty in inputs {
                no_color(op, ty)?;
            }
        }
        let x = inputs[0];
        let order = x.field_shape.order();
        match self {
            Self::Unary(u) => {
                if u.requires_real() {
                    real_only(op, x)?;
                }
                Ok(if u.yields_real() {
                    x.with_element(ElementKind::Real)
                } else {
                    x.clone()
                })
            }
            Self::Binary(b) => {
                if b.requires_real() {
                    real_only(op, x)?;
                    real_only(op, inputs[1])?;
                }
                combine(x, inputs[1]).map_err(|e| GraphError::from_field(op, e))
            }
            Self::BinaryScalar(b, value) => {
                if b.requires_real() {
                    real_only(op, x)?;
                }
                if value.im == 0.0 {
                    Ok(x.clone())
                } else if b.requires_real() {
                    Err(GraphError::invalid(op, "comparison against a complex constant"))
                } else {
                    Ok(x.with_element(ElementKind::Complex))
                }
            }
            Self::Select => {
                real_only(op, x)?;
                let out = combine(inputs[1], inputs[2]).map_err(|e| GraphError::from_field(op, e))?;
                combine(&out, &x.with_element(out.element))
                    .map_err(|e| GraphError::from_field(op, e))
            }
            Self::TensorReduce(r) => {
                if r.requires_real() {
                    real_only(op, x)?;
                }
                Ok(FieldType::new(x.field_shape.clone(), Shape::scalar(), x.element))
            }
            Self::TensorSlice(index) => match x.tensor_shape.dims() {
                [len] if index < len => {
                    Ok(FieldType::new(x.field_shape.clone(), Shape::scalar(), x.element))
                }
                [len] => Err(GraphError::invalid(
                    op,
                    format!("index {index} out of range for length {len}"),
                )),
                _ => Err(GraphError::shape(op, "input must be a vector field")),
            },
            Self::StackTensors => {
                for ty in inputs {
                    if !ty.tensor_shape.is_degenerate()
                        || ty.field_shape != x.field_shape
                        || ty.element != x.element
                    {
                        return Err(GraphError::shape(
                            op,
                            "inputs must be scalar fields of one shape and element kind",
                        ));
                    }
                }
                Ok(FieldType::new(
                    x.field_shape.clone(),
                    Shape::new(&[inputs.len()])?,
                    x.element,
                ))
            }
            Self::ColorToVector => x.color_as_vector().map_err(|e| GraphError::from_field(op, e)),
            Self::Shift { offsets, .. } => {
                if offsets.len() == order {
                    Ok(x.clone())
                } else {
                    Err(GraphError::invalid(
                        op,
                        format!("{} offsets for a field of order {order}", offsets.len()),
                    ))
                }
            }
            Self::Expand { shape, .. } | Self::Trim { shape } => {
                let growing = matches!(self, Self::Expand { .. });
                let fits = shape.order() == order
                    && shape.dims().iter().zip(x.field_shape.dims()).all(|(&to, &from)| {
                        if growing {
                            to >= from
                        } else {
                            to <= from
                        }
                    });
                if fits {
                    with_field_shape(x, shape.dims())
                } else {
                    Err(GraphError::shape(
                        op,
                        format!("cannot resize {} to {shape}", x.field_shape),
                    ))
                }
            }
            Self::Transpose => match x.field_shape.dims() {
                [rows, cols] => with_field_shape(x, &[*cols, *rows]),
                _ => Err(GraphError::shape(op, "input must be a 2-D field")),
            },
            Self::Downsample(factor) | Self::Upsample(factor) if *factor == 0 => {
                Err(GraphError::invalid(op, "factor must be positive"))
            }
            Self::Downsample(factor) => {
                if x.field_shape.dims().iter().any(|d| d % factor != 0) {
                    return Err(GraphError::shape(
                        op,
                        format!("{} is not divisible by {factor}", x.field_shape),
                    ));
                }
                let dims: Vec<usize> = x.field_shape.dims().iter().map(|d| d / factor).collect();
                with_field_shape(x, &dims)
            }
            Self::Upsample(factor) => {
                let dims = x
                    .field_shape
                    .dims()
                    .iter()
                    .map(|d| d.checked_mul(*factor))
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| GraphError::invalid(op, format!("factor {factor} overflows the field shape")))?;
                with_field_shape(x, &dims)
            }
            Self::FieldSlice(index) => match x.field_shape.dims().split_first() {
                Some((&first, rest)) if *index < first => with_field_shape(x, rest),
                Some(_) => Err(GraphError::invalid(op, format!("index {index} out of range"))),
                None => Err(GraphError::shape(op, "input must have at least one axis")),
            },
            Self::StackFields => {
                if inputs.iter().any(|ty| *ty != x) {
                    return Err(GraphError::shape(op, "inputs must share one field type"));
                }
                let mut dims = vec![inputs.len()];
                dims.extend_from_slice(x.field_shape.dims());
                with_field_shape(x, &dims)
            }
            Self::Convolve { .. } => {
                let filter = inputs[1];
                if filter.field_shape.order() != order {
                    return Err(GraphError::shape(op, "filter order differs from field order"));
                }
                if !filter.tensor_shape.is_degenerate() {
                    return Err(GraphError::shape(op, "filter must be a scalar field"));
                }
                let element = x
                    .element
                    .promote(filter.element)
                    .map_err(|e| GraphError::from_field(op, e))?;
                Ok(x.with_element(element))
            }
            Self::FieldReduce(r) => {
                if r.requires_real() {
                    real_only(op, x)?;
                }
                Ok(FieldType::new(Shape::scalar(), x.tensor_shape.clone(), x.element))
            }
            Self::WinnerTakeAll => {
                real_only(op, x)?;
                if x.tensor_shape.is_degenerate() {
                    Ok(x.clone())
                } else {
                    Err(GraphError::shape(op, "input must be a scalar field"))
                }
            }
        }
    }

    /// How the inputs are read; every input of an operator is read alike.
    #[must_use]
    pub fn input_read(&self) -> InputRead {
        match self {
            Self::Shift { offsets, border } => InputRead::Access(Access::Offset {
                delta: offsets.clone(),
                border: *border,
            }),
            Self::Expand { border, .. } => InputRead::Access(Access::Expanded { border: *border }),
            Self::Trim { .. } => InputRead::Access(Access::Trimmed),
            Self::Transpose => InputRead::Access(Access::Transposed),
            Self::Downsample(factor) => InputRead::Access(Access::Downsampled { factor: *factor }),
            Self::Upsample(factor) => InputRead::Access(Access::Upsampled { factor: *factor }),
            Self::FieldSlice(index) => InputRead::Access(Access::Row { index: *index }),
            Self::StackFields
            | Self::Convolve { .. }
            | Self::FieldReduce(_)
            | Self::WinnerTakeAll => InputRead::Buffer,
            _ => InputRead::Access(Access::Local),
        }
    }

    /// Output element `e` depends only on input element `e`.
    #[must_use]
    pub fn is_element_parallel(&self) -> bool {
        !matches!(
            self,
            Self::TensorReduce(_)
                | Self::TensorSlice(_)
                | Self::StackTensors
                | Self::StackFields
                | Self::Convolve { .. }
                | Self::FieldReduce(_)
                | Self::WinnerTakeAll
        )
    }

    /// Kernel expression computing this node from `operands`.
    ///
    /// Returns `None` when a non-local input is not a kernel input buffer.
    #[must_use]
    pub fn lower(&self, operands: &[Operand]) -> Option<Expr> {
        let slot = |i: usize| match operands.get(i) {
            Some(Operand::Slot(s)) => Some(*s),
            _ => None,
        };
        let read = |access: Access| {
            Some(Expr::Read {
                input: slot(0)?,
                access,
            })
        };
        Some(match self {
            Self::Unary(u) => Expr::unary(*u, operands.first()?.local()),
            Self::Binary(b) => Expr::binary(*b, operands.first()?.local(), operands.get(1)?.local()),
            Self::BinaryScalar(b, value) => {
                Expr::binary(*b, operands.first()?.local(), Expr::Const(*value))
            }
            Self::Select => Expr::Select {
                cond: Box::new(operands.first()?.local()),
                a: Box::new(operands.get(1)?.local()),
                b: Box::new(operands.get(2)?.local()),
            },
            Self::TensorReduce(r) => Expr::TensorReduce(*r, Box::new(operands.first()?.local())),
            Self::TensorSlice(index) => Expr::TensorSlice {
                arg: Box::new(operands.first()?.local()),
                index: *index,
            },
            Self::StackTensors => {
                Expr::StackTensors(operands.iter().map(|o| o.local()).collect())
            }
            Self::ColorToVector => operands.first()?.local(),
            Self::StackFields => Expr::StackFields(
                (0..operands.len()).map(&slot).collect::<Option<Vec<_>>>()?,
            ),
            Self::Convolve { border } => Expr::Convolve {
                input: slot(0)?,
                filter: slot(1)?,
                border: *border,
            },
            Self::FieldReduce(r) => Expr::FieldReduce {
                op: *r,
                input: slot(0)?,
            },
            Self::WinnerTakeAll => Expr::WinnerTakeAll { input: slot(0)? },
            Self::Shift { .. }
            | Self::Expand { .. }
            | Self::Trim { .. }
            | Self::Transpose
            | Self::Downsample(_)
            | Self::Upsample(_)
            | Self::FieldSlice(_) => match self.input_read() {
                InputRead::Access(access) => read(access)?,
                InputRead::Buffer => return None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(dims: &[usize]) -> FieldType {
        FieldType::scalar(Shape::new(dims).unwrap())
    }

    #[test]
    fn nonlocal_shape_rules() {
        let x = scalar(&[4, 6]);
        let expand = OpKind::Expand {
            shape: Shape::new(&[5, 6]).unwrap(),
            border: BorderPolicy::Zero,
        };
        assert_eq!(expand.output_type(&[&x]).unwrap(), scalar(&[5, 6]));
        let shrink = OpKind::Expand {
            shape: Shape::new(&[3, 6]).unwrap(),
            border: BorderPolicy::Zero,
        };
        assert!(matches!(shrink.output_type(&[&x]), Err(GraphError::ShapeMismatch { .. })));
        assert_eq!(OpKind::Transpose.output_type(&[&x]).unwrap(), scalar(&[6, 4]));
        assert_eq!(OpKind::Downsample(2).output_type(&[&x]).unwrap(), scalar(&[2, 3]));
        assert!(OpKind::Downsample(4).output_type(&[&x]).is_err());
        assert_eq!(OpKind::FieldSlice(3).output_type(&[&x]).unwrap(), scalar(&[6]));
        assert_eq!(
            OpKind::StackFields.output_type(&[&x, &x]).unwrap(),
            scalar(&[2, 4, 6])
        );
        let shift = OpKind::Shift {
            offsets: vec![1],
            border: BorderPolicy::Cyclic,
        };
        assert!(matches!(shift.output_type(&[&x]), Err(GraphError::InvalidParameter { .. })));
    }

    #[test]
    fn upsample_rejects_overflowing_factors() {
        let x = scalar(&[4, 6]);
        assert_eq!(OpKind::Upsample(2).output_type(&[&x]).unwrap(), scalar(&[8, 12]));
        let huge = scalar(&[usize::MAX / 2 + 1]);
        assert!(matches!(
            OpKind::Upsample(2).output_type(&[&huge]),
            Err(GraphError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn ordering_ops_reject_complex() {
        let z = scalar(&[3]).with_element(ElementKind::Complex);
        assert!(matches!(
            OpKind::Binary(BinaryOp::Max).output_type(&[&z, &z]),
            Err(GraphError::UnsupportedElementKind { .. })
        ));
        assert!(OpKind::WinnerTakeAll.output_type(&[&z]).is_err());
        let magnitude = OpKind::Unary(UnaryOp::Magnitude).output_type(&[&z]).unwrap();
        assert_eq!(magnitude.element, ElementKind::Real);
    }

    #[test]
    fn color_must_be_converted_first() {
        let rgb = scalar(&[2]).with_element(ElementKind::Color { alpha: false });
        assert!(matches!(
            OpKind::Unary(UnaryOp::Neg).output_type(&[&rgb]),
            Err(GraphError::UnsupportedElementKind { .. })
        ));
        let v = OpKind::ColorToVector.output_type(&[&rgb]).unwrap();
        assert_eq!(v.tensor_len(), 3);
    }

    #[test]
    fn nonlocal_lowering_needs_a_buffer() {
        let shift = OpKind::Shift {
            offsets: vec![1],
            border: BorderPolicy::Zero,
        };
        assert!(shift.lower(&[Operand::Temp(0)]).is_none());
        assert!(matches!(
            shift.lower(&[Operand::Slot(2)]),
            Some(Expr::Read { input: 2, .. })
        ));
        let add = OpKind::Binary(BinaryOp::Add);
        assert!(add.lower(&[Operand::Temp(0), Operand::Slot(1)]).is_some());
    }
}
