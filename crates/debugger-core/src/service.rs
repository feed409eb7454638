//! Contracts for the assembler and CPU workers driven by the controller.
//!
//! Both services sit on the far side of an asynchronous request/response
//! boundary. Requests are `async fn`s; continuous-run progress flows back
//! over an [`EventSubscription`].

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::breakpoints::BreakpointSink;
use crate::cpu_state::{Address, CpuState};
use crate::error::{AssembleError, RuntimeFault, ServiceError};

/// Assembles source text into a Micro4 nibble image.
#[allow(async_fn_in_trait)]
pub trait AssemblerService {
    /// Assembles `source`, returning one nibble per byte on success.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::Rejected`] for source diagnostics and
    /// [`AssembleError::Service`] when the assembler itself fails.
    async fn assemble(&self, source: &str) -> Result<Vec<u8>, AssembleError>;
}

/// Executes Micro4 programs on a concurrent worker.
///
/// Breakpoint arming is fire-and-forget via [`BreakpointSink`].
#[allow(async_fn_in_trait)]
pub trait CpuService: BreakpointSink {
    /// Loads a binary and returns the post-load state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the CPU rejects the binary.
    async fn load(&self, binary: &[u8]) -> Result<CpuState, ServiceError>;

    /// Executes one instruction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the worker fails the request.
    async fn step(&self) -> Result<CpuState, ServiceError>;

    /// Starts continuous execution of `ticks_per_frame` instructions per
    /// frame. Resolves once the worker has accepted the request; progress is
    /// reported through [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the worker cannot start.
    async fn run(&self, ticks_per_frame: u32) -> Result<(), ServiceError>;

    /// Stops continuous execution and returns the final state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the worker fails the request.
    async fn stop(&self) -> Result<CpuState, ServiceError>;

    /// Re-initializes registers, keeping memory.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the worker fails the request.
    async fn reset(&self) -> Result<CpuState, ServiceError>;

    /// Restores a previously captured snapshot.
    ///
    /// Implementations may not honor every field of `state`; callers that
    /// display the PC keep their own copy of the historical value.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the worker fails the request.
    async fn restore_state(&self, state: &CpuState) -> Result<CpuState, ServiceError>;

    /// Opens a new event stream for continuous-run progress.
    fn subscribe(&self) -> EventSubscription;
}

/// Progress and terminal notifications emitted while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuEvent {
    /// Periodic state update; may be coalesced.
    StateUpdate(CpuState),
    /// CPU executed `HLT`.
    Halted(CpuState),
    /// CPU stopped abnormally.
    Error {
        /// State at the time of the fault.
        state: CpuState,
        /// Fault description and optional address.
        fault: RuntimeFault,
    },
    /// CPU reached an armed breakpoint.
    BreakpointHit {
        /// State with the PC at the breakpoint.
        state: CpuState,
        /// Breakpoint address.
        address: Address,
    },
}

impl CpuEvent {
    /// Returns `true` for events that end a run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::StateUpdate(_))
    }

    /// Returns the state carried by any variant.
    #[must_use]
    pub const fn state(&self) -> &CpuState {
        match self {
            Self::StateUpdate(state)
            | Self::Halted(state)
            | Self::Error { state, .. }
            | Self::BreakpointHit { state, .. } => state,
        }
    }
}

/// Creates a connected publisher/subscription pair.
#[must_use]
pub fn event_channel() -> (EventPublisher, EventSubscription) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventPublisher { sender }, EventSubscription { receiver })
}

/// Worker-side handle for emitting [`CpuEvent`]s.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<CpuEvent>,
}

impl EventPublisher {
    /// Queues `event`. Returns `false` once the subscriber has unsubscribed.
    pub fn publish(&self, event: CpuEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Returns `true` while the subscription is open.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Controller-side end of a CPU event stream.
///
/// Dropping the subscription unsubscribes; events still queued are discarded.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<CpuEvent>,
}

impl EventSubscription {
    /// Takes the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<CpuEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Closes the stream. Publishers observe the closure immediately.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}
