#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

//! Operator graphs over tensor fields and the compiler that fuses them into
//! kernels.

pub mod builder;
pub mod compiler;
pub mod config;
pub mod custom;
pub mod error;
pub mod external;
mod helpers;
pub mod node;
pub mod ops;

pub use builder::{Graph, ProbeDecl};
pub use compiler::{
    ActuatorBinding, CompiledGraph, ConstantBinding, FusedKernel, RecurrenceBinding, SensorBinding,
};
pub use config::CompilerConfig;
pub use custom::{InstanceId, KernelBodies, KernelTemplate, OutputRule, OutputSpec, TemplateId};
pub use error::{CompileError, FusionRule, GraphError};
pub use external::{ExternalError, FieldSink, FieldSource};
pub use node::NodeRef;
pub use ops::OpKind;
