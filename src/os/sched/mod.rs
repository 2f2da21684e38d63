//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.

mod rdy_list;

pub use rdy_list::ReadyList;

use crate::kernel::Kernel;
use crate::trace::TraceEvent;
use crate::types::{OsPrio, OsTaskState, TaskId};

impl Kernel {
    /// Ready tasks at `prio`, head first
    ///
    /// The head is the task that runs next at this level; tasks made ready
    /// later sit behind it in arrival order.
    pub fn ready_queue(&self, prio: OsPrio) -> impl Iterator<Item = TaskId> + '_ {
        self.rdy_list.get(prio as usize).into_iter().flat_map(|list| list.iter())
    }

    /// Main scheduling point
    ///
    /// Makes the head of the highest non-empty ready list the running task.
    /// Called after every task step, every tick, and every public kernel
    /// call made from outside a task.
    pub(crate) fn sched(&mut self) {
        if !self.running {
            return;
        }

        let Some(high_prio) = self.prio_tbl.get_highest() else {
            return;
        };
        let Some(next) = self.rdy_list[high_prio as usize].head() else {
            return;
        };

        let prev = self.cur;
        if next != prev {
            let prev_tcb = &mut self.tasks[prev.index()];
            if prev_tcb.task_state == OsTaskState::Running {
                prev_tcb.task_state = OsTaskState::Ready;
            }
            self.ctx_switches += 1;
            self.record(TraceEvent::Switch { from: prev, to: next });
            crate::trace!("switch {} -> {} at prio {}", prev, next, high_prio);
        }

        self.tasks[next.index()].task_state = OsTaskState::Running;
        self.cur = next;
    }

    /// Round-robin scheduling for tasks at the same priority
    ///
    /// Charges one tick to the running task and moves it behind its peers
    /// once its quanta is used up.
    pub(crate) fn sched_round_robin(&mut self) {
        if !self.cfg.round_robin || !self.running {
            return;
        }

        let cur = self.cur;
        let tcb = &mut self.tasks[cur.index()];
        if tcb.task_state != OsTaskState::Running {
            return;
        }

        if tcb.time_quanta_ctr > 0 {
            tcb.time_quanta_ctr -= 1;
        }

        if tcb.time_quanta_ctr == 0 {
            tcb.time_quanta_ctr = tcb.time_quanta;
            let list = &mut self.rdy_list[tcb.prio as usize];
            if list.head() == Some(cur) {
                list.rotate();
            }
        }
    }

    /// Make a task ready, behind its same-priority peers
    pub(crate) fn rdy_list_insert(&mut self, id: TaskId) {
        let prio = self.tasks[id.index()].prio;
        self.rdy_list[prio as usize].insert_tail(id);
        self.prio_tbl.insert(prio);
    }

    /// Remove a task from ready list
    pub(crate) fn rdy_list_remove(&mut self, id: TaskId) {
        let prio = self.tasks[id.index()].prio;
        let list = &mut self.rdy_list[prio as usize];
        list.remove(id);
        if list.is_empty() {
            self.prio_tbl.remove(prio);
        }
    }

    /// Give up the rest of the turn at the current priority
    pub(crate) fn yield_internal(&mut self, id: TaskId) {
        let tcb = &mut self.tasks[id.index()];
        tcb.time_quanta_ctr = tcb.time_quanta;
        self.rdy_list[tcb.prio as usize].move_to_tail(id);
    }

    /// Change the effective priority of a task
    ///
    /// Ready tasks move to the tail of their new list; pending tasks keep
    /// their wait-list position consistent with the new priority.
    pub(crate) fn change_prio(&mut self, id: TaskId, new_prio: OsPrio) {
        let tcb = &self.tasks[id.index()];
        let old_prio = tcb.prio;
        if old_prio == new_prio {
            return;
        }

        match tcb.task_state {
            OsTaskState::Ready | OsTaskState::Running => {
                self.rdy_list_remove(id);
                self.tasks[id.index()].prio = new_prio;
                self.rdy_list_insert(id);
            }
            OsTaskState::Pend | OsTaskState::PendTimeout => {
                let lock = tcb.pend_obj;
                self.tasks[id.index()].prio = new_prio;
                if let Some(lock) = lock {
                    self.locks[lock.index()].pend_list.update_prio(id, new_prio);
                }
            }
            OsTaskState::Delayed | OsTaskState::Deleted => {
                self.tasks[id.index()].prio = new_prio;
            }
        }

        let event = if new_prio > old_prio {
            TraceEvent::PrioInherit { task: id, from: old_prio, to: new_prio }
        } else {
            TraceEvent::PrioDisinherit { task: id, from: old_prio, to: new_prio }
        };
        self.record(event);
        crate::debug!("{} priority {} -> {}", id, old_prio, new_prio);
    }
}
