//! Core type definitions for the kernel
//!
//! These types provide strong typing for kernel objects.

use core::fmt;

/// Task priority (higher value = more urgent, 0 = idle)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Progress counter type
pub type OsCtr = u32;

/// Handle of a task inside one kernel instance
///
/// Slots of deleted tasks are reused; the generation tells a new task from
/// an old handle to the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    index: u16,
    gen: u16,
}

impl TaskId {
    pub(crate) const fn new(index: u16, gen: u16) -> Self {
        TaskId { index, gen }
    }

    /// Arena index of the task
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// How many times the slot was reused before this task
    #[inline]
    pub const fn generation(self) -> u16 {
        self.gen
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "T{:03}", self.index)?;
        if self.gen > 0 {
            write!(fmt, ".{}", self.gen)?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "T{=u16:03}.{=u16}", self.index, self.gen);
    }
}

/// Handle of a mutex or semaphore inside one kernel instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub(crate) u16);

impl LockId {
    /// Arena index of the lock
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{:02}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LockId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "L{=u16:02}", self.0);
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task owns the CPU
    Running = 1,
    /// Task is delayed
    Delayed = 2,
    /// Task is pending on a lock
    Pend = 3,
    /// Task is pending on a lock with timeout
    PendTimeout = 4,
    /// Task was deleted; only its tombstone remains
    Deleted = 5,
}

impl OsTaskState {
    /// Ready or Running: the task sits in a ready list
    #[inline]
    pub const fn is_runnable(self) -> bool {
        matches!(self, OsTaskState::Ready | OsTaskState::Running)
    }

    /// Delayed or pending
    #[inline]
    pub const fn is_blocked(self) -> bool {
        matches!(self, OsTaskState::Delayed | OsTaskState::Pend | OsTaskState::PendTimeout)
    }

    /// Pending on a lock, with or without timeout
    #[inline]
    pub const fn is_pending(self) -> bool {
        matches!(self, OsTaskState::Pend | OsTaskState::PendTimeout)
    }

    /// Sitting in the tick wheel
    #[inline]
    pub const fn has_deadline(self) -> bool {
        matches!(self, OsTaskState::Delayed | OsTaskState::PendTimeout)
    }
}

/// Outcome of the last pend of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsPendStatus {
    /// Pend succeeded (the lock was handed over)
    Ok = 0,
    /// Timeout occurred
    Timeout = 1,
}

/// Kind of a lock object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LockKind {
    /// Priority-inheriting mutex
    Mutex = 0,
    /// Binary semaphore, no inheritance
    Semaphore = 1,
}

impl LockKind {
    /// Whether waiters lend their priority to the owner
    #[inline]
    pub const fn inherits(self) -> bool {
        matches!(self, LockKind::Mutex)
    }

    pub const fn name(self) -> &'static str {
        match self {
            LockKind::Mutex => "mutex",
            LockKind::Semaphore => "semaphore",
        }
    }
}
