use crate::kernel::KernelProgram;
use crate::{BufferView, ComputeError};

pub trait ComputeBackend: Send + Sync + 'static {
    /// Dispatches one fused kernel.
    ///
    /// # Arguments
    /// * `program`: The kernel to run.
    /// * `binds`: One `BufferView` per kernel input, followed by one per
    ///   kernel output. Output buffers carry the initial output contents.
    /// * `workgroups`: Number of work groups along each of the three axes.
    ///
    /// # Returns
    ///
    /// The byte contents of every output buffer, in output order.
    /// Returns `ComputeError::ShapeMismatch` if any buffer disagrees with the
    /// kernel signature.
    fn dispatch(
        &self,
        program: &KernelProgram,
        binds: &[BufferView],
        workgroups: [u32; 3],
    ) -> Result<Vec<Vec<u8>>, ComputeError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;
}
