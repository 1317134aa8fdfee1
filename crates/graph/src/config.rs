use compute::{LocalSizeDefaults, MAX_KERNEL_OUTPUTS};
use serde::{Deserialize, Serialize};

/// Knobs for [`crate::Graph::freeze`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// When false every operator compiles to its own kernel.
    pub fusion: bool,
    /// Per-kernel output limit, capped at the hard limit of 10.
    pub max_kernel_outputs: usize,
    /// Drop operators that feed no actuator, recurrence or probe.
    pub prune_unreachable: bool,
    pub local_sizes: LocalSizeDefaults,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            fusion: true,
            max_kernel_outputs: MAX_KERNEL_OUTPUTS,
            prune_unreachable: true,
            local_sizes: LocalSizeDefaults::default(),
        }
    }
}

impl CompilerConfig {
    #[must_use]
    pub fn output_limit(&self) -> usize {
        self.max_kernel_outputs.clamp(1, MAX_KERNEL_OUTPUTS)
    }
}
