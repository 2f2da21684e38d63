//! Synchronization primitives
//!
//! Mutexes and binary semaphores share one lock arena inside the
//! [`Kernel`]. Both hand ownership directly to the most urgent waiter on
//! release; only mutexes lend the waiters' priority to the owner.

pub mod mutex;
pub mod pend_list;
pub mod sem;

pub use pend_list::{PendEntry, PendList};

use alloc::vec::Vec;

use crate::config::CFG_LOCK_MAX;
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::trace::TraceEvent;
use crate::types::{LockId, LockKind, OsPendStatus, OsTaskState, OsTick, TaskId};

/// Lock control block
#[derive(Debug, Clone)]
pub struct OsLock {
    pub id: LockId,
    pub kind: LockKind,
    /// Name for debugging
    pub name: &'static str,
    /// Task that owns the lock
    pub owner: Option<TaskId>,
    /// Tasks waiting for the lock
    pub pend_list: PendList,
}

/// Outcome of a blocking acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Acquire {
    /// The caller owns the lock now
    Owned,
    /// The caller is waiting; it owns the lock when it runs again, unless
    /// a timeout was given and expired first
    Blocked,
}

/// How long an acquire may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendMode {
    NonBlocking,
    /// Timeout in ticks, 0 waits forever
    Blocking(OsTick),
}

/// A lock type usable by scenarios
///
/// Handles are plain ids into the kernel's lock arena, so they are `Copy`
/// and can be captured by any number of task closures.
pub trait Lock: Copy + Into<LockId> {
    const KIND: LockKind;

    /// Create a lock in `kernel`, initially free
    fn create(kernel: &mut Kernel, name: &'static str) -> OsResult<Self>;

    fn id(self) -> LockId {
        self.into()
    }
}

impl Kernel {
    // ============ Public API ============

    /// Owner of a lock
    pub fn lock_owner(&self, lock: impl Into<LockId>) -> OsResult<Option<TaskId>> {
        let lock = lock.into();
        self.check_lock(lock)?;
        Ok(self.locks[lock.index()].owner)
    }

    /// Waiting tasks, in the order they will be served
    pub fn lock_waiters(&self, lock: impl Into<LockId>) -> OsResult<Vec<TaskId>> {
        let lock = lock.into();
        self.check_lock(lock)?;
        Ok(self.locks[lock.index()].pend_list.iter().map(|e| e.task).collect())
    }

    pub fn lock_kind(&self, lock: impl Into<LockId>) -> OsResult<LockKind> {
        let lock = lock.into();
        self.check_lock(lock)?;
        Ok(self.locks[lock.index()].kind)
    }

    pub fn lock_name(&self, lock: impl Into<LockId>) -> OsResult<&'static str> {
        let lock = lock.into();
        self.check_lock(lock)?;
        Ok(self.locks[lock.index()].name)
    }

    /// Acquire `lock` on behalf of a ready task, blocking it if owned
    pub fn acquire(&mut self, task: TaskId, lock: impl Into<LockId>) -> OsResult<Acquire> {
        self.acquire_timeout(task, lock, 0)
    }

    /// Acquire with a bounded wait (0 waits forever)
    pub fn acquire_timeout(
        &mut self,
        task: TaskId,
        lock: impl Into<LockId>,
        ticks: OsTick,
    ) -> OsResult<Acquire> {
        let res = self.lock_acquire(task, lock.into(), PendMode::Blocking(ticks))?;
        self.sched();
        self.post_dispatch()?;
        Ok(res)
    }

    /// Acquire only if free
    pub fn try_acquire(&mut self, task: TaskId, lock: impl Into<LockId>) -> OsResult<()> {
        self.lock_acquire(task, lock.into(), PendMode::NonBlocking)?;
        self.post_dispatch()
    }

    /// Release `lock` owned by `task`
    pub fn release(&mut self, task: TaskId, lock: impl Into<LockId>) -> OsResult<()> {
        self.lock_release(task, lock.into())?;
        self.sched();
        self.post_dispatch()
    }

    // ============ Internals ============

    pub(crate) fn lock_create(&mut self, kind: LockKind, name: &'static str) -> OsResult<LockId> {
        if self.locks.len() >= CFG_LOCK_MAX {
            return Err(OsError::LockNoMore);
        }

        let id = LockId(self.locks.len() as u16);
        self.locks.push(OsLock {
            id,
            kind,
            name,
            owner: None,
            pend_list: PendList::new(),
        });
        crate::debug!("created {} {} '{}'", kind.name(), id, name);
        Ok(id)
    }

    pub(crate) fn lock_acquire(
        &mut self,
        task: TaskId,
        lock: LockId,
        mode: PendMode,
    ) -> OsResult<Acquire> {
        self.check_lock(lock)?;
        let tcb = self.tcb(task)?;
        if task == self.idle || !tcb.task_state.is_runnable() {
            return Err(OsError::StateInvalid);
        }

        let owner = match self.locks[lock.index()].owner {
            None => {
                self.grant(lock, task);
                return Ok(Acquire::Owned);
            }
            Some(owner) if owner == task => return Err(OsError::LockAlreadyHeldBySelf),
            Some(owner) => owner,
        };

        let timeout = match mode {
            PendMode::NonBlocking => return Err(OsError::PendWouldBlock),
            PendMode::Blocking(ticks) => ticks,
        };

        // Nothing is modified until the wait chain is known to be sound
        self.check_wait_chain(task, lock)?;

        self.rdy_list_remove(task);
        let seq = self.pend_seq;
        self.pend_seq += 1;
        let now = self.tick;
        let kind = self.locks[lock.index()].kind;

        let tcb = &mut self.tasks[task.index()];
        tcb.pend_obj = Some(lock);
        tcb.pend_status = OsPendStatus::Ok;
        tcb.task_state = if timeout > 0 {
            OsTaskState::PendTimeout
        } else {
            OsTaskState::Pend
        };
        let prio = tcb.prio;

        if timeout > 0 {
            self.tick_wheel_insert(task, now.wrapping_add(timeout));
        }

        self.locks[lock.index()]
            .pend_list
            .insert_by_prio(PendEntry { task, prio, seq });
        self.record(TraceEvent::LockBlock { lock, task, owner });
        crate::debug!("{} blocked on {} owned by {}", task, lock, owner);

        if kind.inherits() {
            self.propagate_inheritance(owner);
        }
        Ok(Acquire::Blocked)
    }

    pub(crate) fn lock_release(&mut self, task: TaskId, lock: LockId) -> OsResult<()> {
        self.check_lock(lock)?;
        if self.locks[lock.index()].owner != Some(task) {
            return Err(OsError::NotOwner);
        }

        self.tasks[task.index()].held.retain(|&l| l != lock);
        self.locks[lock.index()].owner = None;
        self.record(TraceEvent::LockRelease { lock, task });

        if let Some(next) = self.locks[lock.index()].pend_list.pop_head() {
            let waiter = next.task;
            if self.tasks[waiter.index()].task_state == OsTaskState::PendTimeout {
                self.tick_wheel_remove(waiter);
            }

            let tcb = &mut self.tasks[waiter.index()];
            tcb.clear_pend();
            tcb.pend_status = OsPendStatus::Ok;
            tcb.task_state = OsTaskState::Ready;
            self.rdy_list_insert(waiter);
            self.grant(lock, waiter);

            // The new owner inherits from whoever is still waiting
            self.propagate_inheritance(waiter);
        }

        // Back to base, or to the boost still owed by other held locks
        self.propagate_inheritance(task);
        Ok(())
    }

    fn grant(&mut self, lock: LockId, task: TaskId) {
        self.locks[lock.index()].owner = Some(task);
        self.tasks[task.index()].held.push(lock);
        self.record(TraceEvent::LockAcquire { lock, task });
    }

    /// A timed wait expired
    pub(crate) fn pend_timeout(&mut self, task: TaskId) {
        let Some(lock) = self.pend_remove(task) else {
            return;
        };

        let tcb = &mut self.tasks[task.index()];
        tcb.pend_status = OsPendStatus::Timeout;
        tcb.task_state = OsTaskState::Ready;
        self.rdy_list_insert(task);

        self.record(TraceEvent::LockTimeout { lock, task });
        crate::debug!("{} timed out on {}", task, lock);
    }

    /// Pending task is being deleted
    pub(crate) fn pend_abort(&mut self, task: TaskId) {
        self.pend_remove(task);
    }

    /// Take a waiter off its wait list and drop what it lent the owner
    fn pend_remove(&mut self, task: TaskId) -> Option<LockId> {
        let tcb = &mut self.tasks[task.index()];
        let lock = tcb.pend_obj?;
        tcb.clear_pend();

        let obj = &mut self.locks[lock.index()];
        obj.pend_list.remove(task);
        let (kind, owner) = (obj.kind, obj.owner);

        if let Some(owner) = owner.filter(|_| kind.inherits()) {
            self.propagate_inheritance(owner);
        }
        Some(lock)
    }
}
