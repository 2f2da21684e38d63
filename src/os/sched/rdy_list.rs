//! Ready list - FIFO of task ids at a given priority
//!
//! Each priority level has its own ready list. Tasks are added to the
//! tail (FIFO for round-robin) and scheduled from the head.

use alloc::collections::VecDeque;

use crate::types::TaskId;

/// Ready list for a single priority level
#[derive(Debug, Clone, Default)]
pub struct ReadyList {
    tasks: VecDeque<TaskId>,
}

impl ReadyList {
    /// Create a new empty ready list
    pub const fn new() -> Self {
        ReadyList {
            tasks: VecDeque::new(),
        }
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.tasks.front().copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains(&id)
    }

    /// Insert at the tail of the list (FIFO order)
    pub fn insert_tail(&mut self, id: TaskId) {
        debug_assert!(!self.contains(id));
        self.tasks.push_back(id);
    }

    /// Remove a task, returns whether it was queued here
    pub fn remove(&mut self, id: TaskId) -> bool {
        match self.tasks.iter().position(|&t| t == id) {
            Some(pos) => {
                self.tasks.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move the head behind its peers
    ///
    /// Returns false when there is nobody to rotate with.
    pub fn rotate(&mut self) -> bool {
        if self.tasks.len() < 2 {
            return false;
        }
        self.tasks.rotate_left(1);
        true
    }

    /// Move `id` to the tail if it is queued with peers
    pub fn move_to_tail(&mut self, id: TaskId) -> bool {
        if self.tasks.len() < 2 || !self.remove(id) {
            return false;
        }
        self.tasks.push_back(id);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().copied()
    }
}
