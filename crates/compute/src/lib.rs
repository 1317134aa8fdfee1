#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

use std::sync::Arc;
use thiserror::Error;

pub mod backend;
pub mod cpu_backend;
pub mod field;
pub mod kernel;
pub mod kernels;
pub mod layout;

pub use backend::ComputeBackend;
pub use cpu_backend::CpuBackend;
pub use field::{
    combine, Complex, ElementKind, FieldData, FieldError, FieldType, Shape, TensorElement,
    TensorRegime, SMALL_TENSOR_LIMIT,
};
pub use kernel::{KernelProgram, MAX_KERNEL_OUTPUTS};
pub use layout::{LocalSizeDefaults, WorkGroupLayout};

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("buffer shape mismatch: {0}")]
    ShapeMismatch(&'static str),
    #[error("backend not available")]
    BackendUnavailable,
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("thread space of order {0} exceeds three dimensions")]
    AddressingOrder(usize),
    #[error("invalid work-group size {0:?}")]
    InvalidWorkGroup(Vec<usize>),
    #[error("temporary {0} read before it was bound")]
    UnboundTemp(usize),
    #[error("kernel buffer slot {0} does not exist")]
    UnknownSlot(usize),
    #[error("kernel `{kernel}` is malformed: {reason}")]
    InvalidProgram { kernel: String, reason: &'static str },
}

/// A field-typed byte buffer bound to a kernel slot.
#[derive(Clone, Debug)]
pub struct BufferView {
    pub data: Arc<[u8]>,
    pub field_type: FieldType,
}

impl BufferView {
    #[must_use]
    pub fn new(data: Arc<[u8]>, field_type: FieldType) -> Self {
        Self { data, field_type }
    }

    pub fn to_field_data(&self) -> Result<FieldData, ComputeError> {
        Ok(FieldData::from_bytes(self.field_type.clone(), &self.data)?)
    }
}

/// Returns the compute backend used when the caller does not supply one.
#[must_use]
pub fn default_backend() -> Arc<dyn ComputeBackend> {
    tracing::info!("Using CpuBackend backend.");
    Arc::new(CpuBackend::new())
}
