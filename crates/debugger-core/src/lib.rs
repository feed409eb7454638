//! Debugging engine for the Micro4 teaching IDE.
//!
//! Correlates assembly source lines with runtime addresses, drives the
//! assemble → load → run/step lifecycle against asynchronous assembler and
//! CPU workers, keeps a rewindable step history, and throttles the CPU's
//! state-update stream without ever dropping a halt, error, or breakpoint.

/// CPU snapshot type and address/line aliases.
pub mod cpu_state;
pub use cpu_state::{Address, CpuState, LineNumber, MEMORY_NIBBLES};

/// Source text to address/line correlation.
pub mod source_map;
pub use source_map::{SourceMap, DB_VALUE_WIDTH, DW_VALUE_WIDTH, INSTRUCTION_WIDTH};

/// Bounded, rewindable CPU snapshot history.
pub mod history;
pub use history::{HistoryEntry, HistoryStore, MAX_HISTORY};

/// Address-keyed breakpoint table.
pub mod breakpoints;
pub use breakpoints::{Breakpoint, BreakpointSink, BreakpointTable};

/// State-update coalescing with terminal-event passthrough.
pub mod throttle;
pub use throttle::{EventThrottle, ListenerId, DEFAULT_THROTTLE_WINDOW};

/// Assembler and CPU worker contracts.
pub mod service;
pub use service::{
    event_channel, AssemblerService, CpuEvent, CpuService, EventPublisher, EventSubscription,
};

/// Error taxonomy for assemble, load, run, and initialization failures.
pub mod error;
pub use error::{AssembleError, AssemblyError, ExecutionError, RuntimeFault, ServiceError};

/// Controller tunables.
pub mod config;
pub use config::{ControllerConfig, DEFAULT_CLOCK_HZ, FRAMES_PER_SECOND};

/// Execution-state machine and lifecycle orchestration.
pub mod controller;
pub use controller::{Controls, ExecutionController, ExecutionState};
