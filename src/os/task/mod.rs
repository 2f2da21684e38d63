//! Task management module
//!
//! Provides task creation, deletion, and the context handed to task steps.

mod tcb;

pub use tcb::{OsTcb, TaskEntry};

use alloc::boxed::Box;

use crate::config::{CFG_PRIO_HIGHEST, CFG_PRIO_IDLE, CFG_TASK_MAX};
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::sync::{Acquire, PendMode};
use crate::trace::TraceEvent;
use crate::types::{LockId, OsPendStatus, OsPrio, OsTaskState, OsTick, TaskId};

/// Snapshot of one task, see [`Kernel::task_info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: &'static str,
    pub base_prio: OsPrio,
    /// Effective priority
    pub prio: OsPrio,
    pub state: OsTaskState,
    /// Lock the task is waiting for
    pub pend_on: Option<LockId>,
    /// Number of locks owned
    pub held: usize,
    pub run_cycles: u64,
}

impl Kernel {
    /// Create a new task
    ///
    /// `entry` is called once per cycle while the task runs. The task is
    /// ready immediately and preempts the caller if it is more urgent.
    ///
    /// # Returns
    /// * `Err(OsError::InvalidPriority)` - priority outside `1..=CFG_PRIO_HIGHEST`
    /// * `Err(OsError::TaskNoMoreTcb)` - too many live tasks
    pub fn create_task<F>(&mut self, name: &'static str, prio: OsPrio, entry: F) -> OsResult<TaskId>
    where
        F: FnMut(&mut TaskCtx<'_>) -> OsResult<()> + 'static,
    {
        let id = self.task_create_app(name, prio, Box::new(entry))?;
        self.sched();
        self.post_dispatch()?;
        Ok(id)
    }

    /// Create a task from a plain function and the state it owns
    pub fn create_task_with_arg<A: 'static>(
        &mut self,
        name: &'static str,
        prio: OsPrio,
        entry: fn(&mut TaskCtx<'_>, &mut A) -> OsResult<()>,
        mut arg: A,
    ) -> OsResult<TaskId> {
        self.create_task(name, prio, move |ctx| entry(ctx, &mut arg))
    }

    /// Delete a task
    ///
    /// # Returns
    /// * `Err(OsError::UnknownTask)` - no such live task
    /// * `Err(OsError::TaskDelIdle)` - the idle task cannot be deleted
    /// * `Err(OsError::DeleteWhileOwning)` - the task still owns a lock
    pub fn delete_task(&mut self, id: TaskId) -> OsResult<()> {
        self.task_delete_internal(id)?;
        self.sched();
        self.post_dispatch()
    }

    /// Snapshot of a live task
    pub fn task_info(&self, id: TaskId) -> OsResult<TaskInfo> {
        let tcb = self.tcb(id)?;
        Ok(TaskInfo {
            id,
            name: tcb.name,
            base_prio: tcb.base_prio,
            prio: tcb.prio,
            state: tcb.task_state,
            pend_on: tcb.pend_obj,
            held: tcb.held.len(),
            run_cycles: tcb.run_cycles,
        })
    }

    /// Ids of all live tasks, idle task included
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().filter(|t| !t.is_deleted()).map(|t| t.id)
    }

    pub(crate) fn task_create_app(
        &mut self,
        name: &'static str,
        prio: OsPrio,
        entry: TaskEntry,
    ) -> OsResult<TaskId> {
        if prio == CFG_PRIO_IDLE || prio > CFG_PRIO_HIGHEST {
            return Err(OsError::InvalidPriority);
        }
        self.task_create_internal(name, prio, Some(entry))
    }

    pub(crate) fn task_create_internal(
        &mut self,
        name: &'static str,
        prio: OsPrio,
        entry: Option<TaskEntry>,
    ) -> OsResult<TaskId> {
        if self.live_tasks >= CFG_TASK_MAX {
            return Err(OsError::TaskNoMoreTcb);
        }

        // Reuse the slot of a deleted task before growing the arena
        let id = match self.free_slots.pop() {
            Some(slot) => {
                let old = self.tasks[slot as usize].id;
                let id = TaskId::new(slot, old.generation().wrapping_add(1));
                self.tasks[slot as usize] = OsTcb::new(id, name, prio, self.cfg.time_quanta, entry);
                id
            }
            None => {
                let id = TaskId::new(self.tasks.len() as u16, 0);
                self.tasks.push(OsTcb::new(id, name, prio, self.cfg.time_quanta, entry));
                id
            }
        };
        self.live_tasks += 1;
        self.rdy_list_insert(id);

        self.record(TraceEvent::TaskCreate { task: id, prio });
        crate::debug!("created {} '{}' at prio {}", id, name, prio);
        Ok(id)
    }

    pub(crate) fn task_delete_internal(&mut self, id: TaskId) -> OsResult<()> {
        let tcb = self.tcb(id)?;
        let (state, held) = (tcb.task_state, tcb.held.len());

        if id == self.idle {
            return Err(OsError::TaskDelIdle);
        }

        if held > 0 {
            crate::error!("{} deleted while owning {} lock(s)", id, held);
            return Err(OsError::DeleteWhileOwning);
        }

        match state {
            OsTaskState::Ready | OsTaskState::Running => self.rdy_list_remove(id),
            OsTaskState::Delayed => self.tick_wheel_remove(id),
            OsTaskState::Pend => self.pend_abort(id),
            OsTaskState::PendTimeout => {
                self.tick_wheel_remove(id);
                self.pend_abort(id);
            }
            OsTaskState::Deleted => {}
        }

        let tcb = &mut self.tasks[id.index()];
        tcb.task_state = OsTaskState::Deleted;
        tcb.entry = None;
        self.live_tasks -= 1;
        self.free_slots.push(id.index() as u16);

        self.record(TraceEvent::TaskDelete { task: id });
        crate::debug!("deleted {}", id);
        Ok(())
    }
}

/// Context threaded to every task step
///
/// Gives the running task access to the kernel. A step that suspends
/// (yield, delay, blocking acquire) ends its turn: further suspending or
/// lock calls in the same step fail with [`OsError::TaskSuspended`].
pub struct TaskCtx<'k> {
    kernel: &'k mut Kernel,
    id: TaskId,
    suspended: bool,
    exit: bool,
}

impl<'k> TaskCtx<'k> {
    pub(crate) fn new(kernel: &'k mut Kernel, id: TaskId) -> Self {
        TaskCtx {
            kernel,
            id,
            suspended: false,
            exit: false,
        }
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit
    }

    /// Id of the running task
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Read-only view of the kernel
    #[inline]
    pub fn kernel(&self) -> &Kernel {
        self.kernel
    }

    #[inline]
    pub fn now(&self) -> OsTick {
        self.kernel.now()
    }

    /// Effective priority
    #[inline]
    pub fn prio(&self) -> OsPrio {
        self.tcb().prio
    }

    #[inline]
    pub fn base_prio(&self) -> OsPrio {
        self.tcb().base_prio
    }

    /// Outcome of the last blocking acquire
    #[inline]
    pub fn pend_status(&self) -> OsPendStatus {
        self.tcb().pend_status
    }

    fn tcb(&self) -> &OsTcb {
        &self.kernel.tasks[self.id.index()]
    }

    fn ensure_active(&self) -> OsResult<()> {
        if self.suspended {
            Err(OsError::TaskSuspended)
        } else {
            Ok(())
        }
    }

    /// Move behind same-priority peers
    pub fn yield_now(&mut self) -> OsResult<()> {
        self.ensure_active()?;
        self.kernel.yield_internal(self.id);
        self.suspended = true;
        Ok(())
    }

    /// Sleep for `ticks` ticks (0 yields)
    pub fn delay(&mut self, ticks: OsTick) -> OsResult<()> {
        self.ensure_active()?;
        self.kernel.delay_internal(self.id, ticks);
        self.suspended = true;
        Ok(())
    }

    /// Acquire a lock, blocking while it is owned
    ///
    /// On [`Acquire::Blocked`] the step should return; the task runs again
    /// once it owns the lock.
    pub fn acquire(&mut self, lock: impl Into<LockId>) -> OsResult<Acquire> {
        self.acquire_with(lock.into(), PendMode::Blocking(0))
    }

    /// Acquire a lock, giving up after `ticks` ticks (0 waits forever)
    ///
    /// After a block, [`pend_status`](Self::pend_status) tells whether the
    /// lock was handed over or the wait timed out.
    pub fn acquire_timeout(&mut self, lock: impl Into<LockId>, ticks: OsTick) -> OsResult<Acquire> {
        self.acquire_with(lock.into(), PendMode::Blocking(ticks))
    }

    /// Acquire a lock only if it is free
    pub fn try_acquire(&mut self, lock: impl Into<LockId>) -> OsResult<()> {
        self.acquire_with(lock.into(), PendMode::NonBlocking).map(|_| ())
    }

    fn acquire_with(&mut self, lock: LockId, mode: PendMode) -> OsResult<Acquire> {
        self.ensure_active()?;
        let res = self.kernel.lock_acquire(self.id, lock, mode)?;
        if res == Acquire::Blocked {
            self.suspended = true;
        }
        Ok(res)
    }

    /// Release a lock owned by this task
    pub fn release(&mut self, lock: impl Into<LockId>) -> OsResult<()> {
        self.ensure_active()?;
        self.kernel.lock_release(self.id, lock.into())
    }

    /// Create a task; it is dispatched when this step returns
    pub fn spawn<F>(&mut self, name: &'static str, prio: OsPrio, entry: F) -> OsResult<TaskId>
    where
        F: FnMut(&mut TaskCtx<'_>) -> OsResult<()> + 'static,
    {
        self.kernel.task_create_app(name, prio, Box::new(entry))
    }

    /// Delete another task, or this one at the end of the step
    pub fn delete(&mut self, id: TaskId) -> OsResult<()> {
        if id == self.id {
            self.exit();
            return Ok(());
        }
        self.kernel.task_delete_internal(id)
    }

    /// Delete this task once the step returns
    ///
    /// The task must have released every lock by then, otherwise the run
    /// loop stops with [`OsError::DeleteWhileOwning`].
    pub fn exit(&mut self) {
        self.exit = true;
    }
}
