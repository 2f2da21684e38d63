//! Kernel state and run loop
//!
//! A [`Kernel`] owns every task, lock, and scheduler structure of one
//! simulated single-core system. Nothing is global: tasks reach the kernel
//! through the [`TaskCtx`](crate::TaskCtx) handed to each step.

use alloc::vec::Vec;
use core::fmt;

use crate::cancel::CancelToken;
use crate::config::{KernelConfig, CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_TICK_WHEEL_SIZE};
use crate::error::{OsError, OsResult};
use crate::prio::PrioTable;
use crate::sched::ReadyList;
use crate::sync::OsLock;
use crate::task::{OsTcb, TaskCtx};
use crate::trace::{Trace, TraceEvent};
use crate::types::{LockId, OsTaskState, OsTick, TaskId};

/// Scheduler, task arena and lock arena of one system
pub struct Kernel {
    pub(crate) cfg: KernelConfig,
    pub(crate) running: bool,
    pub(crate) tick: OsTick,

    /// Task arena, indexed by [`TaskId`]; a deleted task stays as a
    /// tombstone until its slot is reused
    pub(crate) tasks: Vec<OsTcb>,
    pub(crate) free_slots: Vec<u16>,
    pub(crate) live_tasks: usize,
    pub(crate) idle: TaskId,
    pub(crate) cur: TaskId,

    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_MAX],
    pub(crate) tick_wheel: [Vec<TaskId>; CFG_TICK_WHEEL_SIZE],

    /// Lock arena, indexed by [`LockId`]
    pub(crate) locks: Vec<OsLock>,
    pub(crate) pend_seq: u64,

    pub(crate) trace: Trace,
    pub(crate) idle_cycles: u64,
    pub(crate) ctx_switches: u64,
}

/// First broken scheduler invariant found by [`Kernel::audit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Violation {
    pub reason: &'static str,
    pub task: Option<TaskId>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task {
            Some(task) => write!(f, "{}: {}", task, self.reason),
            None => f.write_str(self.reason),
        }
    }
}

fn violation(reason: &'static str, task: Option<TaskId>) -> Result<(), Violation> {
    Err(Violation { reason, task })
}

impl Kernel {
    /// Create a kernel with its idle task
    pub fn new(cfg: KernelConfig) -> OsResult<Self> {
        cfg.validate()?;

        let idle = TaskId::new(0, 0);
        let mut kernel = Kernel {
            cfg,
            running: false,
            tick: 0,
            tasks: Vec::new(),
            free_slots: Vec::new(),
            live_tasks: 0,
            idle,
            cur: idle,
            prio_tbl: PrioTable::new(),
            rdy_list: core::array::from_fn(|_| ReadyList::new()),
            tick_wheel: core::array::from_fn(|_| Vec::new()),
            locks: Vec::new(),
            pend_seq: 0,
            trace: Trace::new(cfg.trace_capacity),
            idle_cycles: 0,
            ctx_switches: 0,
        };

        kernel.task_create_internal("Idle", CFG_PRIO_IDLE, None)?;
        Ok(kernel)
    }

    /// Configuration this kernel was built with
    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current tick count
    #[inline]
    pub fn now(&self) -> OsTick {
        self.tick
    }

    /// Task owning the CPU
    #[inline]
    pub fn running_task(&self) -> TaskId {
        self.cur
    }

    /// Id of the idle task
    #[inline]
    pub fn idle_task(&self) -> TaskId {
        self.idle
    }

    /// Cycles spent in the idle task
    #[inline]
    pub fn idle_cycles(&self) -> u64 {
        self.idle_cycles
    }

    /// Number of context switches since start
    #[inline]
    pub fn context_switches(&self) -> u64 {
        self.ctx_switches
    }

    #[inline]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub(crate) fn record(&mut self, event: TraceEvent) {
        self.trace.record(self.tick, event);
    }

    pub(crate) fn tcb(&self, id: TaskId) -> OsResult<&OsTcb> {
        match self.tasks.get(id.index()) {
            Some(tcb) if tcb.id == id && !tcb.is_deleted() => Ok(tcb),
            _ => Err(OsError::UnknownTask),
        }
    }

    pub(crate) fn check_lock(&self, id: LockId) -> OsResult<()> {
        if id.index() < self.locks.len() {
            Ok(())
        } else {
            Err(OsError::UnknownLock)
        }
    }

    // ============ Run loop ============

    /// Start multitasking
    ///
    /// Dispatches the highest priority ready task. Ticks are driven by
    /// [`run`](Self::run), [`run_for`](Self::run_for) or
    /// [`run_until`](Self::run_until).
    pub fn start(&mut self) -> OsResult<()> {
        if self.running {
            return Err(OsError::OsRunning);
        }

        self.running = true;
        crate::info!("kernel started with {} tasks", self.live_tasks);
        self.sched();
        self.post_dispatch()
    }

    /// [`start`](Self::start) then [`run`](Self::run)
    pub fn start_scheduler(&mut self, token: &CancelToken) -> OsResult<()> {
        self.start()?;
        self.run(token)
    }

    /// Execute ticks until `token` is cancelled
    pub fn run(&mut self, token: &CancelToken) -> OsResult<()> {
        self.ensure_running()?;
        while !token.is_cancelled() {
            self.run_tick()?;
        }
        crate::info!("run loop cancelled at tick {}", self.tick);
        Ok(())
    }

    /// Execute exactly `ticks` ticks
    pub fn run_for(&mut self, ticks: OsTick) -> OsResult<()> {
        self.ensure_running()?;
        for _ in 0..ticks {
            self.run_tick()?;
        }
        Ok(())
    }

    /// Execute ticks until `done` holds, for at most `limit` ticks
    ///
    /// Returns whether `done` held when the loop stopped.
    pub fn run_until<F>(&mut self, limit: OsTick, mut done: F) -> OsResult<bool>
    where
        F: FnMut(&Kernel) -> bool,
    {
        self.ensure_running()?;
        for _ in 0..limit {
            if done(self) {
                return Ok(true);
            }
            self.run_tick()?;
        }
        Ok(done(self))
    }

    fn ensure_running(&self) -> OsResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(OsError::OsNotRunning)
        }
    }

    /// `cycles_per_tick` steps of the running task(s), then the tick handler
    fn run_tick(&mut self) -> OsResult<()> {
        for _ in 0..self.cfg.cycles_per_tick {
            self.run_cycle()?;
        }
        self.tick();
        self.post_dispatch()
    }

    /// Give the CPU to the running task for one step
    fn run_cycle(&mut self) -> OsResult<()> {
        let id = self.cur;
        let tcb = &mut self.tasks[id.index()];
        tcb.run_cycles += 1;

        let Some(mut entry) = tcb.entry.take() else {
            self.idle_cycles += 1;
            return Ok(());
        };

        let mut ctx = TaskCtx::new(self, id);
        let res = entry(&mut ctx);
        let exit = ctx.exit_requested();

        let tcb = &mut self.tasks[id.index()];
        if !tcb.is_deleted() {
            tcb.entry = Some(entry);
        }

        if let Err(err) = res {
            crate::error!("task {} failed: error {}", id, err.code());
            return Err(err);
        }

        if exit && !self.tasks[id.index()].is_deleted() {
            if let Err(err) = self.task_delete_internal(id) {
                crate::error!("task {} exit failed: error {}", id, err.code());
                return Err(err);
            }
        }

        self.sched();
        self.post_dispatch()
    }

    /// Audit after a dispatch point when enabled
    pub(crate) fn post_dispatch(&self) -> OsResult<()> {
        if !self.cfg.audit {
            return Ok(());
        }
        self.audit().map_err(|v| {
            crate::error!("invariant violated: {}", v.reason);
            OsError::InvariantViolated
        })
    }

    // ============ Audit ============

    /// Verify the scheduler and lock invariants
    pub fn audit(&self) -> Result<(), Violation> {
        self.audit_ready_lists()?;
        self.audit_locks()?;
        self.audit_tasks()
    }

    fn audit_ready_lists(&self) -> Result<(), Violation> {
        let mut queued = 0;
        for (prio, list) in self.rdy_list.iter().enumerate() {
            if self.prio_tbl.is_set(prio as u8) == list.is_empty() {
                return violation("priority bitmap out of sync with ready list", list.head());
            }
            for id in list.iter() {
                let tcb = &self.tasks[id.index()];
                if !tcb.task_state.is_runnable() {
                    return violation("queued task is not ready", Some(id));
                }
                if tcb.prio as usize != prio {
                    return violation("task queued at wrong priority", Some(id));
                }
                queued += 1;
            }
        }

        let runnable = self.tasks.iter().filter(|t| t.task_state.is_runnable()).count();
        if runnable != queued {
            return violation("ready task missing from ready lists", None);
        }

        if !self.running {
            return Ok(());
        }

        let running = self.tasks.iter().filter(|t| t.task_state == OsTaskState::Running).count();
        if running != 1 || self.tasks[self.cur.index()].task_state != OsTaskState::Running {
            return violation("exactly one task must be running", Some(self.cur));
        }

        let head = self
            .prio_tbl
            .get_highest()
            .and_then(|prio| self.rdy_list[prio as usize].head());
        if head != Some(self.cur) {
            return violation("running task is not the highest ready task", Some(self.cur));
        }
        Ok(())
    }

    fn audit_locks(&self) -> Result<(), Violation> {
        for lock in self.locks.iter() {
            match lock.owner {
                Some(owner) => {
                    if !self.tasks[owner.index()].held.contains(&lock.id) {
                        return violation("owner does not list the lock it holds", Some(owner));
                    }
                }
                None => {
                    if !lock.pend_list.is_empty() {
                        return violation("free lock has waiters", lock.pend_list.head());
                    }
                }
            }

            if !lock.pend_list.is_sorted() {
                return violation("wait list out of order", lock.pend_list.head());
            }

            for entry in lock.pend_list.iter() {
                let tcb = &self.tasks[entry.task.index()];
                if !tcb.is_pending() || tcb.pend_obj != Some(lock.id) {
                    return violation("waiter is not pending on the lock", Some(entry.task));
                }
                if entry.prio != tcb.prio {
                    return violation("stale waiter priority", Some(entry.task));
                }
            }
        }
        Ok(())
    }

    fn audit_tasks(&self) -> Result<(), Violation> {
        for &slot in self.free_slots.iter() {
            let tcb = &self.tasks[slot as usize];
            if !tcb.is_deleted() {
                return violation("free slot holds a live task", Some(tcb.id));
            }
        }
        for tcb in self.tasks.iter().filter(|t| !t.is_deleted()) {
            for &lock in tcb.held.iter() {
                if self.locks[lock.index()].owner != Some(tcb.id) {
                    return violation("held lock owned by someone else", Some(tcb.id));
                }
            }
            if tcb.prio != self.owed_prio(tcb.id) {
                let reason = "effective priority differs from inherited priority";
                return violation(reason, Some(tcb.id));
            }
            if tcb.is_pending() {
                let waiting = tcb
                    .pend_obj
                    .map_or(false, |lock| self.locks[lock.index()].pend_list.contains(tcb.id));
                if !waiting {
                    return violation("pending task missing from wait list", Some(tcb.id));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("running", &self.running)
            .field("tick", &self.tick)
            .field("cur", &self.cur)
            .field("live_tasks", &self.live_tasks)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}
