use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Run the kernels of a wave on the worker pool, alongside sensor
    /// fetches and actuator drains.
    pub parallel: bool,
    /// Dedicated pool size; the global rayon pool is used when unset.
    pub worker_threads: Option<usize>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: None,
        }
    }
}
