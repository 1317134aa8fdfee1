use crate::field::Complex;
use crate::kernel::{BinaryOp, ReduceOp, UnaryOp};

fn flag(condition: bool) -> Complex {
    if condition {
        Complex::ONE
    } else {
        Complex::ZERO
    }
}

pub fn apply_unary(op: UnaryOp, x: Complex) -> Complex {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Abs | UnaryOp::Magnitude => Complex::real(x.abs()),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log if x.im == 0.0 => Complex::real(x.re.ln()),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Sin => Complex::real(x.re.sin()),
        UnaryOp::Cos => Complex::real(x.re.cos()),
        UnaryOp::Tanh => Complex::real(x.re.tanh()),
        UnaryOp::Sigmoid => Complex::real(1.0 / (1.0 + (-x.re).exp())),
        UnaryOp::Rectify => Complex::real(x.re.max(0.0)),
        UnaryOp::Floor => Complex::real(x.re.floor()),
        UnaryOp::Square => x * x,
        UnaryOp::Reciprocal => Complex::ONE / x,
        UnaryOp::RealPart => Complex::real(x.re),
        UnaryOp::ImaginaryPart => Complex::real(x.im),
        UnaryOp::Conjugate => x.conj(),
    }
}

pub fn apply_binary(op: BinaryOp, a: Complex, b: Complex) -> Complex {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Max => Complex::real(a.re.max(b.re)),
        BinaryOp::Min => Complex::real(a.re.min(b.re)),
        BinaryOp::Greater => flag(a.re > b.re),
        BinaryOp::Less => flag(a.re < b.re),
    }
}

/// Folds `values` with `op`; an empty input reduces to zero.
pub fn reduce(op: ReduceOp, values: impl IntoIterator<Item = Complex>) -> Complex {
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return Complex::ZERO;
    };
    let mut count = 1usize;
    let folded = iter.fold(first, |acc, v| {
        count += 1;
        match op {
            ReduceOp::Sum | ReduceOp::Mean => acc + v,
            ReduceOp::Max => Complex::real(acc.re.max(v.re)),
            ReduceOp::Min => Complex::real(acc.re.min(v.re)),
        }
    });
    match op {
        ReduceOp::Mean => folded / Complex::real(count as f32),
        _ => folded,
    }
}

/// Broadcasting elementwise combination of whole tensors.
pub fn zip_with(
    a: &[Complex],
    b: &[Complex],
    f: impl Fn(Complex, Complex) -> Complex,
) -> Option<Vec<Complex>> {
    let len = broadcast_len(&[a.len(), b.len()])?;
    Some((0..len).map(|i| f(pick(a, i), pick(b, i))).collect())
}

/// Common length of tensors where length 1 broadcasts.
pub fn broadcast_len(lens: &[usize]) -> Option<usize> {
    let mut len = 1;
    for &l in lens {
        if l == len || l == 1 {
            continue;
        }
        if len != 1 {
            return None;
        }
        len = l;
    }
    Some(len)
}

pub fn pick(tensor: &[Complex], index: usize) -> Complex {
    if tensor.len() == 1 {
        tensor[0]
    } else {
        tensor.get(index).copied().unwrap_or(Complex::ZERO)
    }
}
