//! Time management module
//!
//! Provides tick handling, time delays, and timeout management.
//!
//! Delayed tasks and timed lock waits sit in a tick wheel: slot
//! `wake_at % CFG_TICK_WHEEL_SIZE`. Each tick only the current slot is
//! scanned, in insertion order, so tasks due on the same tick wake FIFO.

use crate::config::CFG_TICK_WHEEL_SIZE;
use crate::error::{OsError, OsResult};
use crate::kernel::Kernel;
use crate::trace::TraceEvent;
use crate::types::{OsTaskState, OsTick, TaskId};

#[inline]
fn tick_wheel_slot(tick: OsTick) -> usize {
    (tick as usize) % CFG_TICK_WHEEL_SIZE
}

impl Kernel {
    /// Tick handler
    ///
    /// Advances time, wakes due tasks, charges the running task's quanta,
    /// then dispatches.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        self.tick = self.tick.wrapping_add(1);
        self.process_tick_wheel();
        self.sched_round_robin();
        self.sched();
    }

    /// Delay the running task for `ticks` ticks (0 yields)
    pub fn delay(&mut self, ticks: OsTick) -> OsResult<()> {
        let cur = self.current_app_task()?;
        self.delay_internal(cur, ticks);
        self.sched();
        self.post_dispatch()
    }

    /// Move the running task behind its same-priority peers
    pub fn yield_now(&mut self) -> OsResult<()> {
        let cur = self.current_app_task()?;
        self.yield_internal(cur);
        self.sched();
        self.post_dispatch()
    }

    fn current_app_task(&self) -> OsResult<TaskId> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }
        if self.cur == self.idle {
            return Err(OsError::StateInvalid);
        }
        Ok(self.cur)
    }

    pub(crate) fn delay_internal(&mut self, id: TaskId, ticks: OsTick) {
        if ticks == 0 {
            self.yield_internal(id);
            return;
        }

        self.rdy_list_remove(id);
        let wake_at = self.tick.wrapping_add(ticks);
        let tcb = &mut self.tasks[id.index()];
        tcb.task_state = OsTaskState::Delayed;
        self.tick_wheel_insert(id, wake_at);
        self.record(TraceEvent::Delay { task: id, ticks });
    }

    /// Add task to tick wheel
    pub(crate) fn tick_wheel_insert(&mut self, id: TaskId, wake_at: OsTick) {
        self.tasks[id.index()].wake_at = wake_at;
        self.tick_wheel[tick_wheel_slot(wake_at)].push(id);
    }

    /// Remove task from tick wheel
    pub(crate) fn tick_wheel_remove(&mut self, id: TaskId) {
        let slot = tick_wheel_slot(self.tasks[id.index()].wake_at);
        self.tick_wheel[slot].retain(|&t| t != id);
    }

    /// Wake every task due this tick
    fn process_tick_wheel(&mut self) {
        let now = self.tick;
        let slot = tick_wheel_slot(now);

        let tasks = &self.tasks;
        let (due, later): (alloc::vec::Vec<TaskId>, alloc::vec::Vec<TaskId>) = self.tick_wheel[slot]
            .iter()
            .partition(|id| tasks[id.index()].wake_at == now);
        self.tick_wheel[slot] = later;

        for id in due {
            match self.tasks[id.index()].task_state {
                OsTaskState::Delayed => {
                    self.tasks[id.index()].task_state = OsTaskState::Ready;
                    self.rdy_list_insert(id);
                }
                OsTaskState::PendTimeout => self.pend_timeout(id),
                _ => {}
            }
        }
    }
}
