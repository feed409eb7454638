//! Rate limiting for the CPU state-update stream.
//!
//! State updates are coalesced: only the newest is kept, and
//! [`EventThrottle::flush`] delivers it as long as a full window has passed
//! since the previous delivery. A consumer flushing once per window therefore
//! sees every update no later than one window after it was pushed. Terminal
//! events (halt, error, breakpoint) skip the window, are delivered
//! synchronously, and discard any coalesced update older than themselves.
//! After a terminal event the throttle stays latched, dropping further
//! updates, until [`EventThrottle::rearm`].

use std::fmt;
use std::time::{Duration, Instant};

use crate::cpu_state::CpuState;
use crate::service::CpuEvent;

/// Default coalescing window (~60 Hz).
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(16);

/// Handle returned by [`EventThrottle::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&CpuEvent)>;

/// Coalescing dispatcher between the CPU event stream and its consumers.
pub struct EventThrottle {
    window: Duration,
    pending: Option<CpuState>,
    last_delivery: Option<Instant>,
    latched: bool,
    coalesced: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl fmt::Debug for EventThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventThrottle")
            .field("window", &self.window)
            .field("pending", &self.pending.is_some())
            .field("last_delivery", &self.last_delivery)
            .field("latched", &self.latched)
            .field("coalesced", &self.coalesced)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for EventThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

impl EventThrottle {
    /// Creates an armed throttle with the given coalescing window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            last_delivery: None,
            latched: false,
            coalesced: 0,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a listener. Listeners run in registration order.
    pub fn subscribe(&mut self, listener: impl FnMut(&CpuEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was already removed.
    ///
    /// Once this returns the listener is never invoked again.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    /// Accepts one event from the CPU stream.
    ///
    /// Terminal events are dispatched before this returns. State updates
    /// replace the pending one and wait for [`flush`](Self::flush).
    pub fn push(&mut self, event: CpuEvent) {
        if event.is_terminal() {
            if self.pending.take().is_some() {
                self.coalesced += 1;
            }
            self.latched = true;
            self.dispatch(&event);
            return;
        }

        if self.latched {
            log::trace!("dropping state update received after a terminal event");
            return;
        }

        let CpuEvent::StateUpdate(state) = event else {
            return;
        };
        if self.pending.replace(state).is_some() {
            self.coalesced += 1;
        }
    }

    /// Delivers the pending update unless the previous delivery was less
    /// than one window before `now`.
    ///
    /// Returns `true` when an update was delivered.
    pub fn flush(&mut self, now: Instant) -> bool {
        if !self.window_elapsed(now) {
            return false;
        }
        let Some(state) = self.pending.take() else {
            return false;
        };
        self.last_delivery = Some(now);
        self.dispatch(&CpuEvent::StateUpdate(state));
        true
    }

    /// Discards any pending update and latches until [`rearm`](Self::rearm).
    pub fn suspend(&mut self) {
        self.pending = None;
        self.latched = true;
    }

    /// Accepts state updates again after a terminal event or suspension.
    ///
    /// The first update after rearming is deliverable on the next flush.
    pub fn rearm(&mut self) {
        self.latched = false;
        self.last_delivery = None;
        if self.coalesced > 0 {
            log::trace!("{} state updates coalesced in previous run", self.coalesced);
        }
        self.coalesced = 0;
    }

    /// Returns `true` while a coalesced update awaits delivery.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns `true` while state updates are being dropped.
    #[must_use]
    pub const fn is_latched(&self) -> bool {
        self.latched
    }

    /// Instant from which [`flush`](Self::flush) will deliver the pending
    /// update; `None` when nothing is pending or nothing was delivered yet.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        self.last_delivery.map(|last| last + self.window)
    }

    /// Number of updates superseded since the last [`rearm`](Self::rearm).
    #[must_use]
    pub const fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// The coalescing window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    fn window_elapsed(&self, now: Instant) -> bool {
        match self.last_delivery {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        }
    }

    fn dispatch(&mut self, event: &CpuEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}
