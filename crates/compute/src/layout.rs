//! Thread allocation for kernel dispatch.
//!
//! The global grid covers the thread space (one thread per addressed tensor or
//! tensor element), rounded up per dimension to a multiple of the local
//! work-group size. Threads past the real extent do nothing.

use crate::field::Shape;
use crate::ComputeError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCAL_1D: [usize; 1] = [256];
pub const DEFAULT_LOCAL_2D: [usize; 2] = [16, 16];
pub const DEFAULT_LOCAL_3D: [usize; 3] = [4, 8, 8];

const _: () = assert!(DEFAULT_LOCAL_3D[0] * DEFAULT_LOCAL_3D[1] * DEFAULT_LOCAL_3D[2] == 256);

/// Platform work-group sizes used when a kernel has no override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSizeDefaults {
    pub one_d: [usize; 1],
    pub two_d: [usize; 2],
    pub three_d: [usize; 3],
}

impl Default for LocalSizeDefaults {
    fn default() -> Self {
        Self {
            one_d: DEFAULT_LOCAL_1D,
            two_d: DEFAULT_LOCAL_2D,
            three_d: DEFAULT_LOCAL_3D,
        }
    }
}

impl LocalSizeDefaults {
    #[must_use]
    pub fn for_order(&self, order: usize) -> Vec<usize> {
        match order {
            0 => Vec::new(),
            1 => self.one_d.to_vec(),
            2 => self.two_d.to_vec(),
            _ => self.three_d.to_vec(),
        }
    }
}

/// Local and global sizes, padded to three dimensions with 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkGroupLayout {
    pub local: [usize; 3],
    pub global: [usize; 3],
}

impl WorkGroupLayout {
    /// Lays a grid over `thread_space`.
    ///
    /// `local_override`, when given, must have one entry per thread-space
    /// dimension; otherwise `defaults` supplies the local size.
    pub fn allocate(
        thread_space: &[usize],
        local_override: Option<&[usize]>,
        defaults: &LocalSizeDefaults,
    ) -> Result<Self, ComputeError> {
        if thread_space.len() > 3 {
            return Err(ComputeError::AddressingOrder(thread_space.len()));
        }
        let local_dims = match local_override {
            Some(dims) if dims.len() != thread_space.len() || dims.contains(&0) => {
                return Err(ComputeError::InvalidWorkGroup(dims.to_vec()));
            }
            Some(dims) => dims.to_vec(),
            None => defaults.for_order(thread_space.len()),
        };
        let mut local = [1; 3];
        let mut global = [1; 3];
        for (d, (&extent, &size)) in thread_space.iter().zip(&local_dims).enumerate() {
            local[d] = size;
            global[d] = extent.div_ceil(size) * size;
        }
        Ok(Self { local, global })
    }

    /// Convenience for a field shape with default local sizes.
    pub fn for_shape(shape: &Shape) -> Result<Self, ComputeError> {
        Self::allocate(shape.dims(), None, &LocalSizeDefaults::default())
    }

    /// Work-group counts in the form backends dispatch with.
    #[must_use]
    pub fn workgroups(&self) -> [u32; 3] {
        [
            (self.global[0] / self.local[0]) as u32,
            (self.global[1] / self.local[1]) as u32,
            (self.global[2] / self.local[2]) as u32,
        ]
    }

    /// True when `workgroups` groups of this local size cover `extent`.
    #[must_use]
    pub fn covers(&self, workgroups: [u32; 3], extent: &[usize]) -> bool {
        extent
            .iter()
            .enumerate()
            .all(|(d, &e)| workgroups[d] as usize * self.local[d] >= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimensional_space_is_one_thread() {
        let layout = WorkGroupLayout::allocate(&[], None, &LocalSizeDefaults::default()).unwrap();
        assert_eq!(layout.global, [1, 1, 1]);
        assert_eq!(layout.workgroups(), [1, 1, 1]);
    }

    #[test]
    fn global_rounds_up_to_local_multiple() {
        let layout =
            WorkGroupLayout::allocate(&[100, 33], None, &LocalSizeDefaults::default()).unwrap();
        assert_eq!(layout.local, [16, 16, 1]);
        assert_eq!(layout.global, [112, 48, 1]);
        assert_eq!(layout.workgroups(), [7, 3, 1]);
        assert!(layout.covers(layout.workgroups(), &[100, 33]));
        assert!(!layout.covers([6, 3, 1], &[100, 33]));
    }

    #[test]
    fn override_must_match_order() {
        let defaults = LocalSizeDefaults::default();
        let layout = WorkGroupLayout::allocate(&[10], Some(&[8]), &defaults).unwrap();
        assert_eq!(layout.global, [16, 1, 1]);
        assert!(matches!(
            WorkGroupLayout::allocate(&[10], Some(&[8, 8]), &defaults),
            Err(ComputeError::InvalidWorkGroup(_))
        ));
        assert!(matches!(
            WorkGroupLayout::allocate(&[2, 2, 2, 2], None, &defaults),
            Err(ComputeError::AddressingOrder(4))
        ));
    }
}
