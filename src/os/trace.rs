//! Kernel event trace
//!
//! A bounded ring of timestamped scheduler and lock events. When full, the
//! oldest record is dropped and counted.

use alloc::collections::VecDeque;

use crate::types::{LockId, OsPrio, OsTick, TaskId};

/// Something the kernel did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TraceEvent {
    TaskCreate { task: TaskId, prio: OsPrio },
    TaskDelete { task: TaskId },
    /// Context switch
    Switch { from: TaskId, to: TaskId },
    Delay { task: TaskId, ticks: OsTick },
    /// `task` became the owner of `lock`
    LockAcquire { lock: LockId, task: TaskId },
    /// `task` blocked on `lock` owned by `owner`
    LockBlock { lock: LockId, task: TaskId, owner: TaskId },
    LockRelease { lock: LockId, task: TaskId },
    /// `task` gave up waiting on `lock`
    LockTimeout { lock: LockId, task: TaskId },
    /// Effective priority raised
    PrioInherit { task: TaskId, from: OsPrio, to: OsPrio },
    /// Effective priority lowered
    PrioDisinherit { task: TaskId, from: OsPrio, to: OsPrio },
}

/// One trace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TraceRecord {
    pub tick: OsTick,
    pub event: TraceEvent,
}

/// Bounded trace ring
#[derive(Debug, Clone)]
pub struct Trace {
    records: VecDeque<TraceRecord>,
    capacity: usize,
    dropped: u64,
}

impl Trace {
    pub fn new(capacity: usize) -> Self {
        Trace {
            records: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub(crate) fn record(&mut self, tick: OsTick, event: TraceEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(TraceRecord { tick, event });
    }

    /// Records, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> + '_ {
        self.records.iter()
    }

    /// Events only, oldest first
    pub fn events(&self) -> impl Iterator<Item = TraceEvent> + '_ {
        self.records.iter().map(|r| r.event)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records pushed out of the ring
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.dropped = 0;
    }
}
