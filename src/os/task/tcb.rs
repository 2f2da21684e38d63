//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use super::TaskCtx;
use crate::error::OsResult;
use crate::types::{LockId, OsPendStatus, OsPrio, OsTaskState, OsTick, TaskId};

/// Task body, called once per cycle while the task is running
pub type TaskEntry = Box<dyn FnMut(&mut TaskCtx<'_>) -> OsResult<()>>;

/// Task Control Block
pub struct OsTcb {
    // ============ Task identification ============
    pub id: TaskId,
    /// Task name
    pub name: &'static str,

    // ============ Priority ============
    /// Current (effective) priority
    pub prio: OsPrio,
    /// Base priority
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,

    // ============ Pend ============
    /// Lock this task is pending on
    pub pend_obj: Option<LockId>,
    /// Result of the last pend operation
    pub pend_status: OsPendStatus,

    // ============ Tick wheel ============
    /// Tick at which a delay or pend timeout expires
    pub wake_at: OsTick,

    // ============ Time slicing ============
    /// Time quanta for this task
    pub time_quanta: OsTick,
    /// Remaining time quanta
    pub time_quanta_ctr: OsTick,

    // ============ Lock ownership ============
    /// Locks owned by this task, in acquisition order
    pub held: Vec<LockId>,

    // ============ Statistics ============
    /// Cycles this task has been given the CPU
    pub run_cycles: u64,

    // ============ Task entry point ============
    pub(crate) entry: Option<TaskEntry>,
}

impl OsTcb {
    pub(crate) fn new(
        id: TaskId,
        name: &'static str,
        prio: OsPrio,
        time_quanta: OsTick,
        entry: Option<TaskEntry>,
    ) -> Self {
        OsTcb {
            id,
            name,
            prio,
            base_prio: prio,
            task_state: OsTaskState::Ready,
            pend_obj: None,
            pend_status: OsPendStatus::Ok,
            wake_at: 0,
            time_quanta,
            time_quanta_ctr: time_quanta,
            held: Vec::new(),
            run_cycles: 0,
            entry,
        }
    }

    /// Check if task is pending on a lock
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.task_state.is_pending()
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.task_state == OsTaskState::Deleted
    }

    pub(crate) fn clear_pend(&mut self) {
        self.pend_obj = None;
    }
}

impl fmt::Debug for OsTcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsTcb")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("prio", &self.prio)
            .field("base_prio", &self.base_prio)
            .field("task_state", &self.task_state)
            .field("pend_obj", &self.pend_obj)
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}
