//! Re-entrancy guards for in-flight asynchronous operations.

use std::cell::Cell;

/// Classes of operation that may not overlap with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Assemble and its auto-load.
    Assemble,
    /// Run, pause, step, step-back, and reset.
    Execution,
}

/// One busy flag per [`OperationClass`].
#[derive(Debug, Default)]
pub struct BusyFlags {
    assemble: Cell<bool>,
    execution: Cell<bool>,
}

impl BusyFlags {
    const fn flag(&self, class: OperationClass) -> &Cell<bool> {
        match class {
            OperationClass::Assemble => &self.assemble,
            OperationClass::Execution => &self.execution,
        }
    }

    /// Marks `class` busy, or returns `None` if it already is.
    pub fn try_acquire(&self, class: OperationClass) -> Option<BusyGuard<'_>> {
        let flag = self.flag(class);
        if flag.replace(true) {
            return None;
        }
        Some(BusyGuard { flag })
    }

    #[must_use]
    pub fn is_busy(&self, class: OperationClass) -> bool {
        self.flag(class).get()
    }
}

/// Clears its flag when dropped, including when the owning future is
/// cancelled mid-await.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}
