//! Session breakpoint table keyed by address.

use std::collections::BTreeMap;

use crate::cpu_state::{Address, LineNumber};

/// Receiver of breakpoint changes; implemented by the CPU service.
pub trait BreakpointSink {
    /// Arms a breakpoint at `address`.
    fn set_breakpoint(&self, address: Address);

    /// Disarms the breakpoint at `address`.
    fn clear_breakpoint(&self, address: Address);
}

/// A breakpoint and the source line it was placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Breakpoint {
    /// Instruction address the CPU stops at.
    pub address: Address,
    /// Source line shown in the editor gutter.
    pub line: LineNumber,
}

/// Bidirectional address/line breakpoint table.
///
/// Every mutation that changes the table is forwarded to the sink exactly
/// once; no-op calls are not forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointTable {
    by_address: BTreeMap<Address, LineNumber>,
    by_line: BTreeMap<LineNumber, Address>,
}

impl BreakpointTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            by_address: BTreeMap::new(),
            by_line: BTreeMap::new(),
        }
    }

    /// Inserts a breakpoint. Returns `false` when `address` already has one.
    pub fn add(&mut self, address: Address, line: LineNumber, sink: &impl BreakpointSink) -> bool {
        if self.by_address.contains_key(&address) {
            return false;
        }
        self.by_address.insert(address, line);
        self.by_line.insert(line, address);
        sink.set_breakpoint(address);
        true
    }

    /// Removes the breakpoint at `address`. Returns `false` when absent.
    pub fn remove(&mut self, address: Address, sink: &impl BreakpointSink) -> bool {
        let Some(line) = self.by_address.remove(&address) else {
            return false;
        };
        if self.by_line.get(&line) == Some(&address) {
            self.by_line.remove(&line);
        }
        sink.clear_breakpoint(address);
        true
    }

    /// Removes every breakpoint, notifying the sink once per entry.
    pub fn clear_all(&mut self, sink: &impl BreakpointSink) {
        for address in std::mem::take(&mut self.by_address).into_keys() {
            sink.clear_breakpoint(address);
        }
        self.by_line.clear();
    }

    /// Re-arms every breakpoint on the sink, e.g. after a fresh program load.
    pub fn resync(&self, sink: &impl BreakpointSink) {
        for &address in self.by_address.keys() {
            sink.set_breakpoint(address);
        }
    }

    /// Returns all breakpoints in ascending address order.
    #[must_use]
    pub fn list(&self) -> Vec<Breakpoint> {
        self.by_address
            .iter()
            .map(|(&address, &line)| Breakpoint { address, line })
            .collect()
    }

    /// Returns `true` when `address` has a breakpoint.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        self.by_address.contains_key(&address)
    }

    /// Returns the breakpoint address placed on `line`, if any.
    #[must_use]
    pub fn address_for_line(&self, line: LineNumber) -> Option<Address> {
        self.by_line.get(&line).copied()
    }

    /// Returns the line of the breakpoint at `address`, if any.
    #[must_use]
    pub fn line_for_address(&self, address: Address) -> Option<LineNumber> {
        self.by_address.get(&address).copied()
    }

    /// Number of breakpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// Returns `true` when the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
