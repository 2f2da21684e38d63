//! Pend list for tasks waiting on a lock
//!
//! Waiters are kept in service order: higher priority first, and among
//! equal priorities the one that blocked first.

use alloc::vec::Vec;

use crate::types::{OsPrio, TaskId};

/// One waiting task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendEntry {
    pub task: TaskId,
    /// Waiter's effective priority, kept in step with its TCB
    pub prio: OsPrio,
    /// Arrival order
    pub seq: u64,
}

impl PendEntry {
    /// True when `self` must be served before `other`
    #[inline]
    fn precedes(&self, other: &PendEntry) -> bool {
        self.prio > other.prio || (self.prio == other.prio && self.seq < other.seq)
    }
}

/// Wait list of a lock
#[derive(Debug, Clone, Default)]
pub struct PendList {
    entries: Vec<PendEntry>,
}

impl PendList {
    pub const fn new() -> Self {
        PendList {
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Next task to be served
    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.entries.first().map(|e| e.task)
    }

    /// Priority of the most urgent waiter
    #[inline]
    pub fn highest_prio(&self) -> Option<OsPrio> {
        self.entries.first().map(|e| e.prio)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|e| e.task == task)
    }

    /// Insert in priority order, behind waiters of the same priority
    pub fn insert_by_prio(&mut self, entry: PendEntry) {
        let pos = self
            .entries
            .iter()
            .position(|e| entry.precedes(e))
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Remove a specific task
    pub fn remove(&mut self, task: TaskId) -> Option<PendEntry> {
        let pos = self.entries.iter().position(|e| e.task == task)?;
        Some(self.entries.remove(pos))
    }

    /// Take the next task to be served
    pub fn pop_head(&mut self) -> Option<PendEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Re-sort a waiter whose effective priority changed
    ///
    /// The original arrival order is kept for tie-breaking.
    pub fn update_prio(&mut self, task: TaskId, prio: OsPrio) {
        if let Some(mut entry) = self.remove(task) {
            entry.prio = prio;
            self.insert_by_prio(entry);
        }
    }

    /// Waiters in service order
    pub fn iter(&self) -> impl Iterator<Item = &PendEntry> + '_ {
        self.entries.iter()
    }

    /// Whether the service order holds
    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].precedes(&w[1]))
    }
}
