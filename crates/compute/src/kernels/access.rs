//! Resolution of [`Access`] patterns to source points.

use crate::field::Shape;
use crate::kernel::{Access, BorderPolicy};
use crate::ComputeError;

/// Applies `border` to signed coordinates, returning the linear source index
/// or `None` when the read falls outside and the policy is `Zero`.
pub fn bordered(coords: &[isize], shape: &Shape, border: BorderPolicy) -> Option<usize> {
    let dims = shape.dims();
    let mut index = 0usize;
    for (&c, &extent) in coords.iter().zip(dims) {
        let n = extent as isize;
        let c = if (0..n).contains(&c) {
            c
        } else {
            match border {
                BorderPolicy::Zero => return None,
                BorderPolicy::Clamp => c.clamp(0, n - 1),
                BorderPolicy::Cyclic => c.rem_euclid(n),
            }
        };
        index = index * extent + c as usize;
    }
    Some(index)
}

fn signed(coords: &[usize]) -> Vec<isize> {
    coords.iter().map(|&c| c as isize).collect()
}

/// Source point read by a thread at field coordinates `thread` through `access`.
pub fn resolve(access: &Access, thread: &[usize], source: &Shape) -> Result<Option<usize>, ComputeError> {
    if source.is_degenerate() {
        return Ok(Some(0));
    }
    let (coords, border) = match access {
        Access::Local | Access::Trimmed => (signed(thread), BorderPolicy::Zero),
        Access::Offset { delta, border } => {
            if delta.len() != thread.len() {
                return Err(ComputeError::ShapeMismatch("offset count differs from field order"));
            }
            let coords = thread
                .iter()
                .zip(delta)
                .map(|(&c, &d)| c as isize - d)
                .collect();
            (coords, *border)
        }
        Access::Expanded { border } => (signed(thread), *border),
        Access::Transposed => match thread {
            [row, col] => (vec![*col as isize, *row as isize], BorderPolicy::Zero),
            _ => return Err(ComputeError::ShapeMismatch("transpose needs a 2-D thread space")),
        },
        Access::Downsampled { factor } => (
            thread.iter().map(|&c| (c * factor) as isize).collect(),
            BorderPolicy::Zero,
        ),
        Access::Upsampled { factor } => (
            thread.iter().map(|&c| (c / factor) as isize).collect(),
            BorderPolicy::Zero,
        ),
        Access::Row { index } => {
            let mut coords = vec![*index as isize];
            coords.extend(signed(thread));
            (coords, BorderPolicy::Zero)
        }
    };
    if coords.len() != source.order() {
        return Err(ComputeError::ShapeMismatch("read coordinates differ from source order"));
    }
    Ok(bordered(&coords, source, border))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> Shape {
        Shape::new(dims).unwrap()
    }

    #[test]
    fn border_policies() {
        let s = shape(&[4]);
        assert_eq!(bordered(&[-1], &s, BorderPolicy::Zero), None);
        assert_eq!(bordered(&[-1], &s, BorderPolicy::Clamp), Some(0));
        assert_eq!(bordered(&[-1], &s, BorderPolicy::Cyclic), Some(3));
        assert_eq!(bordered(&[5], &s, BorderPolicy::Cyclic), Some(1));
        assert_eq!(bordered(&[2], &s, BorderPolicy::Zero), Some(2));
    }

    #[test]
    fn offset_reads_behind_the_thread() {
        let s = shape(&[3, 3]);
        let access = Access::Offset {
            delta: vec![1, 0],
            border: BorderPolicy::Zero,
        };
        assert_eq!(resolve(&access, &[1, 2], &s).unwrap(), Some(2));
        assert_eq!(resolve(&access, &[0, 2], &s).unwrap(), None);
    }

    #[test]
    fn structural_accesses() {
        let s = shape(&[2, 3]);
        assert_eq!(resolve(&Access::Transposed, &[2, 1], &s).unwrap(), Some(5));
        assert_eq!(resolve(&Access::Row { index: 1 }, &[2], &s).unwrap(), Some(5));
        let line = shape(&[8]);
        assert_eq!(resolve(&Access::Downsampled { factor: 2 }, &[3], &line).unwrap(), Some(6));
        assert_eq!(resolve(&Access::Upsampled { factor: 2 }, &[3], &line).unwrap(), Some(1));
        assert_eq!(resolve(&Access::Local, &[5, 5], &Shape::scalar()).unwrap(), Some(0));
    }
}
