//! In-memory assembler and CPU services for driving the controller.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use debugger_core::{
    event_channel, Address, AssembleError, AssemblerService, BreakpointSink, ControllerConfig,
    CpuEvent, CpuService, CpuState, EventPublisher, EventSubscription, ExecutionController,
    ServiceError,
};

/// Three-instruction program used by most scenarios.
pub const PROGRAM: &str = "; demo\nstart: LDI 1\nADD 15\nHLT\n";

/// Nibble image matching [`PROGRAM`].
pub const BINARY: [u8; 3] = [0x7, 0x3, 0x0];

pub type Controller = ExecutionController<FakeAssembler, FakeCpu>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Load(usize),
    Step,
    Run(u32),
    Stop,
    Reset,
    Restore(Address),
    Subscribe,
    SetBreakpoint(Address),
    ClearBreakpoint(Address),
}

struct AssemblerInner {
    result: RefCell<Result<Vec<u8>, AssembleError>>,
    calls: Cell<usize>,
}

/// Assembler returning a preset result after yielding once.
#[derive(Clone)]
pub struct FakeAssembler {
    inner: Rc<AssemblerInner>,
}

impl FakeAssembler {
    pub fn succeeding(binary: &[u8]) -> Self {
        Self {
            inner: Rc::new(AssemblerInner {
                result: RefCell::new(Ok(binary.to_vec())),
                calls: Cell::new(0),
            }),
        }
    }

    pub fn set_result(&self, result: Result<Vec<u8>, AssembleError>) {
        *self.inner.result.borrow_mut() = result;
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.get()
    }
}

impl AssemblerService for FakeAssembler {
    async fn assemble(&self, _source: &str) -> Result<Vec<u8>, AssembleError> {
        self.inner.calls.set(self.inner.calls.get() + 1);
        tokio::task::yield_now().await;
        self.inner.result.borrow().clone()
    }
}

#[derive(Default)]
struct CpuInner {
    state: RefCell<CpuState>,
    program: RefCell<Vec<u8>>,
    publisher: RefCell<Option<EventPublisher>>,
    calls: RefCell<Vec<Call>>,
    halt_at: Cell<Option<Address>>,
    fault_at: Cell<Option<Address>>,
    fail_load: Cell<bool>,
    fail_run: Cell<bool>,
    fail_reset: Cell<bool>,
    restore_zeroes_pc: Cell<bool>,
}

/// CPU that advances the PC by one instruction width per step and halts at a
/// configured address.
#[derive(Clone, Default)]
pub struct FakeCpu {
    inner: Rc<CpuInner>,
}

impl FakeCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt_at(&self, address: Address) {
        self.inner.halt_at.set(Some(address));
    }

    /// Reports an execution error when stepping from `address`.
    pub fn fault_at(&self, address: Address) {
        self.inner.fault_at.set(Some(address));
    }

    pub fn fail_load(&self, fail: bool) {
        self.inner.fail_load.set(fail);
    }

    pub fn fail_run(&self) {
        self.inner.fail_run.set(true);
    }

    pub fn fail_reset(&self) {
        self.inner.fail_reset.set(true);
    }

    /// Mimics a worker that zeroes its PC when restoring a snapshot.
    pub fn restore_zeroes_pc(&self) {
        self.inner.restore_zeroes_pc.set(true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.borrow().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.inner.calls.borrow().iter().filter(|c| matches(c)).count()
    }

    /// Publishes to the current subscriber; `false` when unsubscribed.
    pub fn emit(&self, event: CpuEvent) -> bool {
        self.inner
            .publisher
            .borrow()
            .as_ref()
            .is_some_and(|publisher| publisher.publish(event))
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner
            .publisher
            .borrow()
            .as_ref()
            .is_some_and(EventPublisher::is_subscribed)
    }

    fn record(&self, call: Call) {
        self.inner.calls.borrow_mut().push(call);
    }
}

/// Snapshot with the given PC.
pub fn at_pc(pc: Address) -> CpuState {
    CpuState {
        program_counter: pc,
        ..CpuState::with_program(&BINARY)
    }
}

impl BreakpointSink for FakeCpu {
    fn set_breakpoint(&self, address: Address) {
        self.record(Call::SetBreakpoint(address));
    }

    fn clear_breakpoint(&self, address: Address) {
        self.record(Call::ClearBreakpoint(address));
    }
}

impl CpuService for FakeCpu {
    async fn load(&self, binary: &[u8]) -> Result<CpuState, ServiceError> {
        self.record(Call::Load(binary.len()));
        tokio::task::yield_now().await;
        if self.inner.fail_load.get() {
            return Err(ServiceError::Failed(String::from("program does not fit")));
        }
        *self.inner.program.borrow_mut() = binary.to_vec();
        let state = CpuState::with_program(binary);
        *self.inner.state.borrow_mut() = state.clone();
        Ok(state)
    }

    async fn step(&self) -> Result<CpuState, ServiceError> {
        self.record(Call::Step);
        tokio::task::yield_now().await;
        let mut state = self.inner.state.borrow_mut();
        if self.inner.fault_at.get() == Some(state.program_counter) {
            state.halted = true;
            state.error_flag = true;
            state.error_message = Some(String::from("invalid opcode 0xF"));
        } else if self.inner.halt_at.get() == Some(state.program_counter) {
            state.halted = true;
        } else {
            state.program_counter += 2;
        }
        state.instruction_count += 1;
        state.cycle_count += 2;
        Ok(state.clone())
    }

    async fn run(&self, ticks_per_frame: u32) -> Result<(), ServiceError> {
        self.record(Call::Run(ticks_per_frame));
        tokio::task::yield_now().await;
        if self.inner.fail_run.get() {
            return Err(ServiceError::Failed(String::from("worker busy")));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<CpuState, ServiceError> {
        self.record(Call::Stop);
        tokio::task::yield_now().await;
        Ok(self.inner.state.borrow().clone())
    }

    async fn reset(&self) -> Result<CpuState, ServiceError> {
        self.record(Call::Reset);
        tokio::task::yield_now().await;
        if self.inner.fail_reset.get() {
            return Err(ServiceError::Unavailable(String::from("wasm module missing")));
        }
        let state = CpuState::with_program(&self.inner.program.borrow());
        *self.inner.state.borrow_mut() = state.clone();
        Ok(state)
    }

    async fn restore_state(&self, state: &CpuState) -> Result<CpuState, ServiceError> {
        self.record(Call::Restore(state.program_counter));
        tokio::task::yield_now().await;
        *self.inner.state.borrow_mut() = state.clone();
        let mut reply = state.clone();
        if self.inner.restore_zeroes_pc.get() {
            reply.program_counter = 0;
        }
        Ok(reply)
    }

    fn subscribe(&self) -> EventSubscription {
        self.record(Call::Subscribe);
        let (publisher, subscription) = event_channel();
        *self.inner.publisher.borrow_mut() = Some(publisher);
        subscription
    }
}

/// Builds a controller over fresh fakes, returning handles to both fakes.
pub fn controller() -> (Controller, FakeAssembler, FakeCpu) {
    controller_with(ControllerConfig::default())
}

pub fn controller_with(config: ControllerConfig) -> (Controller, FakeAssembler, FakeCpu) {
    let assembler = FakeAssembler::succeeding(&BINARY);
    let cpu = FakeCpu::new();
    let controller = ExecutionController::new(assembler.clone(), cpu.clone(), config);
    (controller, assembler, cpu)
}

/// Builds a controller and assembles [`PROGRAM`].
pub async fn loaded_controller() -> (Controller, FakeAssembler, FakeCpu) {
    let (controller, assembler, cpu) = controller();
    controller.assemble(PROGRAM).await;
    (controller, assembler, cpu)
}
