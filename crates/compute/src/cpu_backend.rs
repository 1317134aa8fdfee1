use crate::kernel::KernelProgram;
use crate::{kernels, BufferView, ComputeBackend, ComputeError};

/// Reference backend interpreting kernel programs on the host.
#[derive(Default, Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for CpuBackend {
    fn dispatch(
        &self,
        program: &KernelProgram,
        binds: &[BufferView],
        workgroups: [u32; 3],
    ) -> Result<Vec<Vec<u8>>, ComputeError> {
        for buffer_view in binds {
            if buffer_view.data.len() != buffer_view.field_type.byte_len() {
                return Err(ComputeError::ShapeMismatch(
                    "Buffer data length does not match the byte length of its field type",
                ));
            }
        }
        tracing::trace!(kernel = %program.name, ?workgroups, "cpu dispatch");
        kernels::handle_program(program, binds, workgroups)
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
