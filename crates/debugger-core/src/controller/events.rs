//! Application of CPU run events to the execution state machine.

use std::time::Instant;

use super::{ExecutionController, ExecutionState};
use crate::service::{AssemblerService, CpuEvent, CpuService, EventSubscription};

#[allow(clippy::future_not_send)]
impl<A: AssemblerService, C: CpuService> ExecutionController<A, C> {
    /// Drains the CPU event stream through the throttle and applies whatever
    /// it delivers.
    ///
    /// Terminal events are applied as soon as they are read, so a state
    /// update queued behind a halt, error, or breakpoint is never applied.
    /// The newest update read is applied in the same call when the previous
    /// one was applied at least a throttle window before `now`.
    pub fn pump(&self, now: Instant) {
        loop {
            let event = self
                .session
                .borrow_mut()
                .subscription
                .as_mut()
                .and_then(EventSubscription::try_next);
            let Some(event) = event else {
                break;
            };
            self.throttle.borrow_mut().push(event);
            self.apply_delivered();
        }

        self.throttle.borrow_mut().flush(now);
        self.apply_delivered();
    }

    /// Pumps events once per throttle window until the run ends.
    pub async fn drive(&self) {
        let window = self.throttle.borrow().window();
        while self.state() == ExecutionState::Running {
            tokio::time::sleep(window).await;
            self.pump(tokio::time::Instant::now().into_std());
        }
    }

    fn apply_delivered(&self) {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            self.apply(event);
        }
    }

    fn apply(&self, event: CpuEvent) {
        let mut guard = self.session.borrow_mut();
        let session = &mut *guard;
        if session.state != ExecutionState::Running {
            log::debug!("ignoring CPU event in state {}", session.state);
            return;
        }

        match event {
            CpuEvent::StateUpdate(state) => session.cpu_state = Some(state),
            CpuEvent::Halted(state) => {
                self.detach(session);
                session.cpu_state = Some(state);
                session.transition(ExecutionState::Halted, "Halted");
            }
            CpuEvent::Error { state, fault } => {
                self.detach(session);
                session.cpu_state = Some(state);
                session.fail_runtime(fault);
            }
            CpuEvent::BreakpointHit { state, address } => {
                self.detach(session);
                session.cpu_state = Some(state);
                session.transition(
                    ExecutionState::BreakpointHit,
                    format!("Breakpoint hit at 0x{address:02X}"),
                );
            }
        }
    }
}
