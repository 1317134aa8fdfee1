// CPU interpretation of kernel programs.

pub mod access;
pub mod elementwise;
pub mod eval;
pub mod field_ops;
pub mod program;

pub use program::{decode_outputs, handle_program};
