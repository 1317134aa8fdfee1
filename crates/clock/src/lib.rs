#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

//! Two-phase clock driving compiled field graphs.

pub mod buffers;
pub mod clock;
pub mod config;
pub mod error;
pub mod probe;
pub mod state;

pub use clock::Clock;
pub use config::ClockConfig;
pub use error::ClockError;
pub use probe::{ProbeHandle, ProbeSnapshot};
pub use state::ClockState;
