//! Orchestration of the assemble → load → run/step lifecycle.
//!
//! The controller is the single owner of the source map, history, and
//! breakpoint table. It talks to the assembler and CPU workers through the
//! [`AssemblerService`] and [`CpuService`] traits and folds every outcome,
//! including failures, into an [`ExecutionState`] transition plus a status
//! string. No method returns an error.
//!
//! All methods take `&self` so several requests can be in flight on one
//! single-threaded executor. Overlapping requests of the same class are
//! dropped by a busy flag, and results that complete after a source edit
//! are discarded.

mod busy;
mod events;
mod state;

pub use state::{Controls, ExecutionState};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use self::busy::{BusyFlags, BusyGuard, OperationClass};
use crate::breakpoints::{Breakpoint, BreakpointTable};
use crate::config::ControllerConfig;
use crate::cpu_state::{Address, CpuState, LineNumber};
use crate::error::{AssembleError, ExecutionError, RuntimeFault, ServiceError};
use crate::history::HistoryStore;
use crate::service::{AssemblerService, CpuEvent, CpuService, EventSubscription};
use crate::source_map::SourceMap;
use crate::throttle::EventThrottle;

/// Controller-owned session data. Never borrowed across an `.await`.
#[derive(Debug)]
struct Session {
    state: ExecutionState,
    status: String,
    source_map: Option<SourceMap>,
    history: HistoryStore,
    breakpoints: BreakpointTable,
    binary: Option<Vec<u8>>,
    cpu_state: Option<CpuState>,
    last_error: Option<ExecutionError>,
    subscription: Option<EventSubscription>,
}

impl Session {
    fn new(history_capacity: usize) -> Self {
        Self {
            state: ExecutionState::Idle,
            status: String::from("Idle"),
            source_map: None,
            history: HistoryStore::with_capacity(history_capacity),
            breakpoints: BreakpointTable::new(),
            binary: None,
            cpu_state: None,
            last_error: None,
            subscription: None,
        }
    }

    fn transition(&mut self, next: ExecutionState, status: impl Into<String>) {
        if self.state != next {
            log::info!("execution state {} -> {}", self.state, next);
        }
        self.state = next;
        self.status = status.into();
    }

    fn record_history(&mut self) {
        if let Some(current) = &self.cpu_state {
            self.history.push(current);
        }
    }

    /// Set once a service failed to start; never cleared.
    fn unavailable(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(ExecutionError::is_persistent)
    }

    /// Adopts a state returned by step/stop, honoring halt and error flags.
    fn adopt_stopped(&mut self, state: CpuState, otherwise: ExecutionState, status: String) {
        if !state.is_stopped() {
            self.cpu_state = Some(state);
            self.transition(otherwise, status);
            return;
        }

        if !state.error_flag {
            self.cpu_state = Some(state);
            self.transition(ExecutionState::Halted, "Halted");
            return;
        }

        let fault = RuntimeFault {
            message: state
                .error_message
                .clone()
                .unwrap_or_else(|| String::from("CPU error")),
            address: Some(state.program_counter),
        };
        self.cpu_state = Some(state);
        self.fail_runtime(fault);
    }

    fn fail_runtime(&mut self, fault: RuntimeFault) {
        let status = format!("Error: {fault}");
        self.last_error = Some(ExecutionError::Runtime(fault));
        self.transition(ExecutionState::Error, status);
    }

    fn fail_service(&mut self, operation: &str, error: &ServiceError) {
        log::warn!("{operation} failed: {error}");
        self.fail_runtime(RuntimeFault::new(error.to_string()));
    }

    fn fail_assembly(&mut self, error: AssembleError) {
        log::warn!("assemble failed: {error}");
        self.source_map = None;
        self.binary = None;
        self.cpu_state = None;
        let status = format!("Assembly failed: {error}");
        self.last_error = Some(ExecutionError::Assembly(error));
        self.transition(ExecutionState::Error, status);
    }

    fn highlighted_line(&self) -> Option<LineNumber> {
        let pc = self.cpu_state.as_ref()?.program_counter;
        self.source_map.as_ref()?.line_for_address(pc)
    }
}

/// Drives the debugging lifecycle for one editor session.
pub struct ExecutionController<A, C> {
    assembler: A,
    cpu: C,
    config: Cell<ControllerConfig>,
    session: RefCell<Session>,
    throttle: RefCell<EventThrottle>,
    inbox: Rc<RefCell<VecDeque<CpuEvent>>>,
    busy: BusyFlags,
    revision: Cell<u64>,
}

#[allow(clippy::future_not_send)]
impl<A: AssemblerService, C: CpuService> ExecutionController<A, C> {
    /// Creates an idle controller over the given services.
    #[must_use]
    pub fn new(assembler: A, cpu: C, config: ControllerConfig) -> Self {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let mut throttle = EventThrottle::new(config.throttle_window);
        let delivered = Rc::clone(&inbox);
        throttle.subscribe(move |event: &CpuEvent| delivered.borrow_mut().push_back(event.clone()));

        Self {
            assembler,
            cpu,
            config: Cell::new(config),
            session: RefCell::new(Session::new(config.history_capacity)),
            throttle: RefCell::new(throttle),
            inbox,
            busy: BusyFlags::default(),
            revision: Cell::new(0),
        }
    }

    /// Checks that the CPU worker answers.
    ///
    /// On failure every control stays disabled for the life of this
    /// controller and the status reports the cause.
    pub async fn initialize(&self) {
        match self.cpu.reset().await {
            Ok(_) => log::info!("CPU service ready"),
            Err(error) => {
                log::warn!("CPU service failed to start: {error}");
                let mut session = self.session.borrow_mut();
                let status = format!("CPU unavailable: {error}");
                session.last_error = Some(ExecutionError::Initialization(error));
                session.transition(ExecutionState::Error, status);
            }
        }
    }

    /// Assembles `source` and, on success, loads the binary into the CPU.
    ///
    /// Dropped while another assemble or an execution request is in flight,
    /// and refused while running.
    pub async fn assemble(&self, source: &str) {
        let Some(_guard) = self.acquire(OperationClass::Assemble, "assemble") else {
            return;
        };
        if self.busy.is_busy(OperationClass::Execution) {
            log::debug!("assemble dropped: execution request in flight");
            return;
        }
        let revision = self.revision.get();

        {
            let mut session = self.session.borrow_mut();
            if session.state == ExecutionState::Running {
                session.status = String::from("Pause before assembling");
                return;
            }
            session.source_map = None;
            session.binary = None;
            session.last_error = None;
            session.transition(ExecutionState::Assembling, "Assembling...");
        }

        let assembled = self.assembler.assemble(source).await;
        if !self.is_current(revision) {
            log::debug!("discarding assemble result for edited source");
            return;
        }
        let binary = match assembled {
            Ok(binary) => binary,
            Err(error) => {
                self.session.borrow_mut().fail_assembly(error);
                return;
            }
        };

        let source_map = SourceMap::build(source);
        let loaded = self.cpu.load(&binary).await;
        if !self.is_current(revision) {
            log::debug!("discarding load result for edited source");
            return;
        }

        let mut session = self.session.borrow_mut();
        match loaded {
            Ok(state) => {
                let nibbles = binary.len();
                log::info!(
                    "loaded {nibbles} nibbles, {} executable lines",
                    source_map.len()
                );
                session.source_map = Some(source_map);
                session.binary = Some(binary);
                session.cpu_state = Some(state);
                session.history.clear();
                session.breakpoints.resync(&self.cpu);
                session.transition(ExecutionState::Ready, format!("Loaded: {nibbles} nibbles"));
            }
            Err(error) => {
                log::warn!("load failed: {error}");
                session.cpu_state = None;
                let status = format!("Load failed: {error}");
                session.last_error = Some(ExecutionError::Load(error));
                session.transition(ExecutionState::Error, status);
            }
        }
    }

    /// Starts continuous execution from Ready, Paused, or BreakpointHit.
    pub async fn run(&self) {
        let Some(_guard) = self.acquire(OperationClass::Execution, "run") else {
            return;
        };
        let revision = self.revision.get();
        let ticks_per_frame = self.config.get().tick_rate();

        {
            let mut session = self.session.borrow_mut();
            if !session.state.can_execute() {
                log::debug!("run ignored in state {}", session.state);
                return;
            }
            session.subscription = Some(self.cpu.subscribe());
            self.inbox.borrow_mut().clear();
            self.throttle.borrow_mut().rearm();
            session.transition(ExecutionState::Running, "Running");
        }

        let started = self.cpu.run(ticks_per_frame).await;
        if !self.is_current(revision) {
            return;
        }
        if let Err(error) = started {
            let mut session = self.session.borrow_mut();
            if session.state == ExecutionState::Running {
                self.detach(&mut session);
                session.fail_service("run", &error);
            }
        }
    }

    /// Stops continuous execution and adopts the worker's final state.
    ///
    /// The event stream is closed before the stop request is sent, so no
    /// event is acted on once this returns.
    pub async fn pause(&self) {
        let Some(_guard) = self.acquire(OperationClass::Execution, "pause") else {
            return;
        };
        let revision = self.revision.get();

        {
            let mut session = self.session.borrow_mut();
            if session.state != ExecutionState::Running {
                return;
            }
            self.detach(&mut session);
        }

        let stopped = self.cpu.stop().await;
        if !self.is_current(revision) {
            return;
        }

        let mut session = self.session.borrow_mut();
        match stopped {
            Ok(state) => {
                let status = format!("Paused at 0x{:02X}", state.program_counter);
                session.adopt_stopped(state, ExecutionState::Paused, status);
            }
            Err(error) => session.fail_service("stop", &error),
        }
    }

    /// Executes one instruction, recording the pre-step state for step-back.
    pub async fn step(&self) {
        let Some(_guard) = self.acquire(OperationClass::Execution, "step") else {
            return;
        };
        let revision = self.revision.get();

        {
            let mut session = self.session.borrow_mut();
            if !session.state.can_execute() {
                log::debug!("step ignored in state {}", session.state);
                return;
            }
            session.record_history();
        }

        let stepped = self.cpu.step().await;
        if !self.is_current(revision) {
            return;
        }

        let mut session = self.session.borrow_mut();
        match stepped {
            Ok(state) => {
                let status = format!("Stepped to 0x{:02X}", state.program_counter);
                session.adopt_stopped(state, ExecutionState::Ready, status);
            }
            Err(error) => session.fail_service("step", &error),
        }
    }

    /// Restores the previous history snapshot.
    ///
    /// The displayed PC is taken from the snapshot, not from the worker's
    /// reply, which reports PC 0 after a restore.
    pub async fn step_back(&self) {
        let Some(_guard) = self.acquire(OperationClass::Execution, "step back") else {
            return;
        };
        let revision = self.revision.get();

        let historical = {
            let mut session = self.session.borrow_mut();
            if !session.state.can_execute() {
                return;
            }
            let Some(entry) = session.history.rewind() else {
                log::debug!("step back ignored: no earlier state");
                return;
            };
            entry.state.clone()
        };

        let restored = self.cpu.restore_state(&historical).await;
        if !self.is_current(revision) {
            return;
        }

        let mut session = self.session.borrow_mut();
        match restored {
            Ok(mut state) => {
                let pc = historical.program_counter;
                state.program_counter = pc;
                let next = if session.state == ExecutionState::Ready {
                    ExecutionState::Ready
                } else {
                    ExecutionState::Paused
                };
                session.cpu_state = Some(state);
                session.transition(next, format!("Stepped back to 0x{pc:02X}"));
            }
            Err(error) => session.fail_service("restore", &error),
        }
    }

    /// Re-initializes the CPU and clears history. Breakpoints are kept.
    ///
    /// A running program is stopped first. Lands in Ready when a program is
    /// loaded, Idle otherwise: the CPU keeps its memory across a reset, so a
    /// loaded program stays runnable without reassembling.
    pub async fn reset(&self) {
        let Some(_guard) = self.acquire(OperationClass::Execution, "reset") else {
            return;
        };
        let revision = self.revision.get();

        let was_running = {
            let mut session = self.session.borrow_mut();
            if session.state == ExecutionState::Assembling {
                return;
            }
            let running = session.state == ExecutionState::Running;
            if running {
                self.detach(&mut session);
            }
            running
        };

        if was_running {
            if let Err(error) = self.cpu.stop().await {
                log::warn!("stop before reset failed: {error}");
            }
            if !self.is_current(revision) {
                return;
            }
        }

        let reset = self.cpu.reset().await;
        if !self.is_current(revision) {
            return;
        }

        let mut session = self.session.borrow_mut();
        session.history.clear();
        match reset {
            Ok(state) => {
                session.last_error = None;
                if session.binary.is_some() {
                    session.cpu_state = Some(state);
                    session.transition(ExecutionState::Ready, "Reset");
                } else {
                    session.cpu_state = None;
                    session.transition(ExecutionState::Idle, "Reset");
                }
            }
            Err(error) => session.fail_service("reset", &error),
        }
    }

    /// Invalidates everything derived from the previous source text.
    ///
    /// Clears the source map, history, breakpoints, binary, and CPU view,
    /// stops a running program, and discards results of requests still in
    /// flight.
    pub async fn source_changed(&self) {
        self.revision.set(self.revision.get().wrapping_add(1));

        let was_running = {
            let mut guard = self.session.borrow_mut();
            let session = &mut *guard;
            if session.unavailable() {
                return;
            }
            let running = session.state == ExecutionState::Running;
            if running {
                self.detach(session);
            }
            session.source_map = None;
            session.history.clear();
            session.breakpoints.clear_all(&self.cpu);
            session.binary = None;
            session.cpu_state = None;
            session.last_error = None;
            session.transition(ExecutionState::Idle, "Source modified");
            running
        };

        if was_running {
            if let Err(error) = self.cpu.stop().await {
                log::warn!("stop after source edit failed: {error}");
            }
        }
    }

    /// Toggles the breakpoint on `line`.
    ///
    /// Returns `Some(true)` when armed, `Some(false)` when removed, and
    /// `None` when the line has no instruction in the current source map.
    pub fn toggle_breakpoint(&self, line: LineNumber) -> Option<bool> {
        let mut guard = self.session.borrow_mut();
        let session = &mut *guard;
        if session.unavailable() {
            return None;
        }
        let Some(source_map) = &session.source_map else {
            session.status = String::from("Assemble before setting breakpoints");
            return None;
        };
        let Some(address) = source_map.address_for_line(line) else {
            session.status = format!("No instruction on line {line}");
            return None;
        };

        if session.breakpoints.remove(address, &self.cpu) {
            log::debug!("breakpoint removed at 0x{address:02X}");
            Some(false)
        } else {
            session.breakpoints.add(address, line, &self.cpu);
            log::debug!("breakpoint set at 0x{address:02X} (line {line})");
            Some(true)
        }
    }

    /// Removes the breakpoint at `address`. Returns `false` when absent.
    pub fn remove_breakpoint(&self, address: Address) -> bool {
        self.session
            .borrow_mut()
            .breakpoints
            .remove(address, &self.cpu)
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.session.borrow_mut().breakpoints.clear_all(&self.cpu);
    }

    /// Changes the desired clock; applies from the next `run`.
    pub fn set_clock_speed(&self, clock_hz: u32) {
        let mut config = self.config.get();
        config.clock_hz = clock_hz;
        self.config.set(config);
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> ControllerConfig {
        self.config.get()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.session.borrow().state
    }

    /// Human-readable status line.
    #[must_use]
    pub fn status(&self) -> String {
        self.session.borrow().status.clone()
    }

    /// Source line of the instruction at the current PC.
    #[must_use]
    pub fn highlighted_line(&self) -> Option<LineNumber> {
        self.session.borrow().highlighted_line()
    }

    /// PC to display; `None` while unknown.
    #[must_use]
    pub fn displayed_pc(&self) -> Option<Address> {
        self.session
            .borrow()
            .cpu_state
            .as_ref()
            .map(|state| state.program_counter)
    }

    /// Latest known CPU state.
    #[must_use]
    pub fn cpu_state(&self) -> Option<CpuState> {
        self.session.borrow().cpu_state.clone()
    }

    /// Breakpoints in ascending address order.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.session.borrow().breakpoints.list()
    }

    /// Whether a step-back target exists.
    #[must_use]
    pub fn history_available(&self) -> bool {
        self.session.borrow().history.can_rewind()
    }

    /// Number of retained history snapshots.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.session.borrow().history.len()
    }

    /// Most recent failure, cleared by the next successful assemble/reset.
    #[must_use]
    pub fn last_error(&self) -> Option<ExecutionError> {
        self.session.borrow().last_error.clone()
    }

    /// Source map of the loaded program.
    #[must_use]
    pub fn source_map(&self) -> Option<SourceMap> {
        self.session.borrow().source_map.clone()
    }

    /// Size of the loaded binary in nibbles.
    #[must_use]
    pub fn binary_len(&self) -> Option<usize> {
        self.session.borrow().binary.as_ref().map(Vec::len)
    }

    /// Enablement of each toolbar control.
    #[must_use]
    pub fn controls(&self) -> Controls {
        let session = self.session.borrow();
        if session.unavailable() {
            return Controls::DISABLED;
        }
        let executing = self.busy.is_busy(OperationClass::Execution);
        let assembling = self.busy.is_busy(OperationClass::Assemble);
        let state = session.state;
        let can_execute = !executing && state.can_execute();

        Controls {
            assemble: !assembling && !executing && state != ExecutionState::Running,
            run: can_execute,
            pause: !executing && state == ExecutionState::Running,
            step: can_execute,
            step_back: can_execute && session.history.can_rewind(),
            reset: !executing && session.binary.is_some() && state != ExecutionState::Assembling,
        }
    }

    fn acquire(&self, class: OperationClass, operation: &str) -> Option<BusyGuard<'_>> {
        if self.session.borrow().unavailable() {
            log::debug!("{operation} ignored: services unavailable");
            return None;
        }
        let guard = self.busy.try_acquire(class);
        if guard.is_none() {
            log::debug!("{operation} dropped: previous request still in flight");
        }
        guard
    }

    fn is_current(&self, revision: u64) -> bool {
        self.revision.get() == revision
    }

    /// Closes the CPU event stream and drops anything not yet applied.
    fn detach(&self, session: &mut Session) {
        if let Some(subscription) = session.subscription.take() {
            subscription.unsubscribe();
        }
        self.throttle.borrow_mut().suspend();
        self.inbox.borrow_mut().clear();
    }
}
