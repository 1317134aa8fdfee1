use std::fmt;

use crate::error::ClockError;

/// Lifecycle of a [`crate::Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Unreset,
    Primed,
    Stepping,
    Released,
    /// A step failed; only `release` is accepted.
    Failed,
}

impl ClockState {
    /// Whether `reset` may run.
    pub fn check_reset(self) -> Result<(), ClockError> {
        match self {
            Self::Released => Err(ClockError::GraphReleased),
            Self::Failed => Err(ClockError::GraphFailed),
            Self::Unreset | Self::Primed | Self::Stepping => Ok(()),
        }
    }

    /// Whether `step` may run.
    pub fn check_step(self) -> Result<(), ClockError> {
        match self {
            Self::Unreset => Err(ClockError::NotReset),
            Self::Released => Err(ClockError::GraphReleased),
            Self::Failed => Err(ClockError::GraphFailed),
            Self::Primed | Self::Stepping => Ok(()),
        }
    }
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unreset => "unreset",
            Self::Primed => "primed",
            Self::Stepping => "stepping",
            Self::Released => "released",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        assert!(ClockState::Unreset.check_reset().is_ok());
        assert!(matches!(ClockState::Unreset.check_step(), Err(ClockError::NotReset)));
        assert!(ClockState::Stepping.check_step().is_ok());
        assert!(matches!(ClockState::Failed.check_reset(), Err(ClockError::GraphFailed)));
        assert!(matches!(ClockState::Released.check_step(), Err(ClockError::GraphReleased)));
    }
}
