//! Bounded, rewindable log of CPU snapshots used by step-back.

use std::collections::VecDeque;
use std::time::Instant;

use crate::cpu_state::CpuState;

/// Default number of snapshots retained.
pub const MAX_HISTORY: usize = 50;

/// One captured pre-step snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Owned copy of the CPU state, including memory.
    pub state: CpuState,
    /// When the snapshot was captured.
    pub timestamp: Instant,
}

/// FIFO-bounded snapshot history with a rewind cursor.
///
/// The cursor is `None` while the store is at "latest"; after a rewind it
/// indexes the entry that was last handed out.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl HistoryStore {
    /// Creates a store holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            cursor: None,
            capacity,
        }
    }

    /// Appends a copy of `state`.
    ///
    /// When rewound, entries after the cursor are discarded first. Oldest
    /// entries are evicted beyond capacity and the cursor returns to latest.
    pub fn push(&mut self, state: &CpuState) {
        self.push_at(state, Instant::now());
    }

    /// [`push`](Self::push) with an explicit capture time.
    pub fn push_at(&mut self, state: &CpuState, timestamp: Instant) {
        if let Some(cursor) = self.cursor.take() {
            self.entries.truncate(cursor + 1);
        }

        self.entries.push_back(HistoryEntry {
            state: state.clone(),
            timestamp,
        });

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Moves one entry back and returns it, or `None` at the oldest entry.
    pub fn rewind(&mut self) -> Option<&HistoryEntry> {
        let target = match self.cursor {
            None => self.entries.len().checked_sub(1)?,
            Some(cursor) => cursor.checked_sub(1)?,
        };
        self.cursor = Some(target);
        self.entries.get(target)
    }

    /// Returns `true` when [`rewind`](Self::rewind) would succeed.
    #[must_use]
    pub fn can_rewind(&self) -> bool {
        match self.cursor {
            None => !self.entries.is_empty(),
            Some(cursor) => cursor > 0,
        }
    }

    /// Drops every entry and returns the cursor to latest.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current rewind position; `None` means latest.
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}
