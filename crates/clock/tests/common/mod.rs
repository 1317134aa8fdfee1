#![allow(dead_code)]

use std::sync::Arc;

use clock::{Clock, ClockConfig};
use compute::{CpuBackend, FieldData, FieldType, Shape};
use graph::{CompilerConfig, ExternalError, Graph};
use parking_lot::Mutex;

pub fn line(n: usize) -> FieldType {
    FieldType::scalar(Shape::new(&[n]).unwrap())
}

pub fn grid(rows: usize, cols: usize) -> FieldType {
    FieldType::scalar(Shape::new(&[rows, cols]).unwrap())
}

pub fn field(values: &[f32]) -> FieldData {
    FieldData::from_slice(values).unwrap()
}

/// Freezes `g` and wraps it in a clock on the CPU backend.
pub fn start(g: &mut Graph, config: ClockConfig) -> Clock {
    let compiled = g.freeze(&CompilerConfig::default()).unwrap();
    Clock::new(compiled, Arc::new(CpuBackend::new()), config).unwrap()
}

pub fn sequential() -> ClockConfig {
    ClockConfig {
        parallel: false,
        worker_threads: None,
    }
}

/// Sink recording every drained value.
pub fn recorder() -> (
    Arc<Mutex<Vec<Vec<f32>>>>,
    impl FnMut(&FieldData) -> Result<(), ExternalError> + Send + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = move |value: &FieldData| -> Result<(), ExternalError> {
        sink_seen.lock().push(value.values().to_vec());
        Ok(())
    };
    (seen, sink)
}
