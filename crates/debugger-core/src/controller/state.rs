//! Execution-state machine surface exposed to the UI layer.

use std::fmt;

/// Lifecycle state of the assemble/load/run pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionState {
    /// No program loaded.
    #[default]
    Idle,
    /// Assemble (and auto-load) request in flight.
    Assembling,
    /// Program loaded; not executing.
    Ready,
    /// Continuous execution on the CPU worker.
    Running,
    /// Continuous execution stopped by the user.
    Paused,
    /// Program executed `HLT`.
    Halted,
    /// Assembly, load, or runtime failure.
    Error,
    /// Continuous execution stopped at a breakpoint.
    BreakpointHit,
}

impl ExecutionState {
    /// States from which `run` and `step` may start.
    #[must_use]
    pub const fn can_execute(self) -> bool {
        matches!(self, Self::Ready | Self::Paused | Self::BreakpointHit)
    }

    /// Short display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Assembling => "Assembling",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Halted => "Halted",
            Self::Error => "Error",
            Self::BreakpointHit => "Breakpoint",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Enablement of each toolbar control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct Controls {
    /// Assemble button.
    pub assemble: bool,
    /// Run button.
    pub run: bool,
    /// Pause button.
    pub pause: bool,
    /// Step button.
    pub step: bool,
    /// Step-back button.
    pub step_back: bool,
    /// Reset button.
    pub reset: bool,
}

impl Controls {
    /// Every control disabled.
    pub const DISABLED: Self = Self {
        assemble: false,
        run: false,
        pause: false,
        step: false,
        step_back: false,
        reset: false,
    };
}
