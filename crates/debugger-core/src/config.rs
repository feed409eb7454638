//! Controller configuration.

use std::time::Duration;

use crate::history::MAX_HISTORY;
use crate::throttle::DEFAULT_THROTTLE_WINDOW;

/// Scheduling frames per second used to derive the run tick rate.
pub const FRAMES_PER_SECOND: u32 = 60;

/// Default desired CPU clock in instructions per second.
pub const DEFAULT_CLOCK_HZ: u32 = 60;

/// Tunables for an [`ExecutionController`](crate::ExecutionController).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ControllerConfig {
    /// Desired instructions per second during continuous run.
    pub clock_hz: u32,
    /// Coalescing window for state-update delivery.
    pub throttle_window: Duration,
    /// Maximum step-back snapshots retained.
    pub history_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            clock_hz: DEFAULT_CLOCK_HZ,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            history_capacity: MAX_HISTORY,
        }
    }
}

impl ControllerConfig {
    /// Instructions per frame: `max(1, round(clock_hz / 60))`.
    #[must_use]
    pub const fn tick_rate(&self) -> u32 {
        let rounded = self.clock_hz.saturating_add(FRAMES_PER_SECOND / 2) / FRAMES_PER_SECOND;
        if rounded == 0 {
            1
        } else {
            rounded
        }
    }
}
