//! Failure taxonomy for the assemble/load/run lifecycle.
//!
//! Service-level errors describe what went wrong on the far side of the
//! worker boundary. [`ExecutionError`] is what the controller records after
//! converting a failure into a state transition.

use thiserror::Error;

use crate::cpu_state::Address;

/// Failure reported by an assembler or CPU worker request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ServiceError {
    /// The backend never started or has gone away.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The backend rejected or failed a single request.
    #[error("{0}")]
    Failed(String),
}

/// Assembler diagnostic pointing at the offending source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct AssemblyError {
    /// 1-indexed source line.
    pub line: usize,
    /// 1-indexed source column (1 when unknown).
    pub column: usize,
    /// Diagnostic text.
    pub message: String,
    /// Optional fix-it hint.
    pub suggestion: Option<String>,
}

impl AssemblyError {
    /// Creates a diagnostic without a suggestion.
    #[must_use]
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attaches a fix-it hint.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Outcome of an unsuccessful assemble request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// Source was processed and rejected.
    #[error(transparent)]
    Rejected(#[from] AssemblyError),
    /// The assembler itself failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Abnormal stop during run or step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{message}")]
pub struct RuntimeFault {
    /// Fault description from the CPU.
    pub message: String,
    /// Address of the faulting instruction, when known.
    pub address: Option<Address>,
}

impl RuntimeFault {
    /// Creates a fault with no address context.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            address: None,
        }
    }

    /// Attaches the faulting address.
    #[must_use]
    pub const fn at(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}

/// Failure recorded by the execution controller for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Source did not assemble; fix the source and reassemble.
    #[error("assembly failed: {0}")]
    Assembly(AssembleError),
    /// CPU rejected the binary.
    #[error("load failed: {0}")]
    Load(ServiceError),
    /// CPU stopped abnormally; recover with reset.
    #[error("runtime error: {0}")]
    Runtime(RuntimeFault),
    /// A backend service failed to start.
    #[error("initialization failed: {0}")]
    Initialization(ServiceError),
}

impl ExecutionError {
    /// Returns `true` for errors that keep dependent controls disabled.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Initialization(_))
    }
}
