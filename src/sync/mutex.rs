//! Mutex implementation with priority inheritance
//!
//! While tasks wait on a mutex, its owner runs at no less than the most
//! urgent waiter's priority. Boosts follow chains of owners that are
//! themselves waiting on mutexes, iteratively over the task arena.

use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::types::{LockId, LockKind, OsPrio, TaskId};

use super::{Acquire, Lock};

/// Handle to a priority-inheriting mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mutex(LockId);

impl Mutex {
    /// Create a mutex, initially free
    pub fn new(kernel: &mut Kernel, name: &'static str) -> OsResult<Self> {
        kernel.lock_create(LockKind::Mutex, name).map(Mutex)
    }

    #[inline]
    pub fn id(self) -> LockId {
        self.0
    }

    /// Acquire on behalf of `task`
    pub fn lock(self, kernel: &mut Kernel, task: TaskId) -> OsResult<Acquire> {
        kernel.acquire(task, self)
    }

    /// Release on behalf of `task`
    pub fn unlock(self, kernel: &mut Kernel, task: TaskId) -> OsResult<()> {
        kernel.release(task, self)
    }

    /// Check if mutex is owned
    pub fn is_owned(self, kernel: &Kernel) -> bool {
        matches!(kernel.lock_owner(self), Ok(Some(_)))
    }

    /// Get owner's effective priority
    pub fn owner_prio(self, kernel: &Kernel) -> Option<OsPrio> {
        let owner = kernel.lock_owner(self).ok()??;
        kernel.task_info(owner).ok().map(|info| info.prio)
    }
}

impl From<Mutex> for LockId {
    fn from(m: Mutex) -> LockId {
        m.0
    }
}

impl Lock for Mutex {
    const KIND: LockKind = LockKind::Mutex;

    fn create(kernel: &mut Kernel, name: &'static str) -> OsResult<Self> {
        Mutex::new(kernel, name)
    }
}

impl Kernel {
    /// Priority `task` is owed: its base raised to the most urgent waiter of
    /// every inheriting lock it owns
    pub(crate) fn owed_prio(&self, task: TaskId) -> OsPrio {
        let tcb = &self.tasks[task.index()];
        tcb.held
            .iter()
            .map(|lock| &self.locks[lock.index()])
            .filter(|lock| lock.kind.inherits())
            .filter_map(|lock| lock.pend_list.highest_prio())
            .fold(tcb.base_prio, OsPrio::max)
    }

    /// Walk the owners between `caller` and `lock` before blocking
    ///
    /// Fails with `Deadlock` if the walk comes back to `caller`, and with
    /// `InheritanceDepthExceeded` if an inheriting acquire would have to
    /// boost more owners than the configured bound.
    pub(crate) fn check_wait_chain(&self, caller: TaskId, lock: LockId) -> OsResult<()> {
        let mut boosting = self.locks[lock.index()].kind.inherits();
        let mut boosted = 0;
        let mut via = lock;

        for _ in 0..self.tasks.len() {
            let Some(owner) = self.locks[via.index()].owner else {
                return Ok(());
            };
            if owner == caller {
                return Err(OsError::Deadlock);
            }

            if boosting {
                boosted += 1;
                if boosted > self.cfg.inherit_depth_max {
                    crate::warn!(
                        "inheritance chain from {} deeper than {}",
                        caller,
                        self.cfg.inherit_depth_max
                    );
                    return Err(OsError::InheritanceDepthExceeded);
                }
            }

            let tcb = &self.tasks[owner.index()];
            match tcb.pend_obj {
                Some(next) if tcb.is_pending() => {
                    boosting = boosting && self.locks[next.index()].kind.inherits();
                    via = next;
                }
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    /// Recompute the effective priority of `start` and of every owner
    /// downstream of it
    ///
    /// Stops at the first task whose priority does not change, at a task
    /// that is not waiting on a mutex, or after visiting every task.
    pub(crate) fn propagate_inheritance(&mut self, start: TaskId) {
        let mut task = start;

        for _ in 0..self.tasks.len() {
            let owed = self.owed_prio(task);
            if owed == self.tasks[task.index()].prio {
                return;
            }
            self.change_prio(task, owed);

            let tcb = &self.tasks[task.index()];
            let next = tcb
                .pend_obj
                .filter(|_| tcb.is_pending())
                .map(|lock| &self.locks[lock.index()])
                .filter(|lock| lock.kind.inherits())
                .and_then(|lock| lock.owner);

            match next {
                Some(owner) => task = owner,
                None => return,
            }
        }
    }
}
