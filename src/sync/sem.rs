//! Binary semaphore implementation
//!
//! Same ownership and queuing rules as [`Mutex`](super::mutex::Mutex), but
//! waiters never change the owner's priority. A task whose priority lies
//! between the owner's and a waiter's can therefore hold the waiter off for
//! as long as it keeps running.

use crate::error::OsResult;
use crate::kernel::Kernel;
use crate::types::{LockId, LockKind, TaskId};

use super::{Acquire, Lock};

/// Handle to a binary semaphore
///
/// The semaphore starts available and remembers which task took it, so a
/// release by anyone else fails with `NotOwner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Semaphore(LockId);

impl Semaphore {
    /// Create a semaphore, initially available
    pub fn new(kernel: &mut Kernel, name: &'static str) -> OsResult<Self> {
        kernel.lock_create(LockKind::Semaphore, name).map(Semaphore)
    }

    #[inline]
    pub fn id(self) -> LockId {
        self.0
    }

    /// Take the semaphore on behalf of `task`
    pub fn pend(self, kernel: &mut Kernel, task: TaskId) -> OsResult<Acquire> {
        kernel.acquire(task, self)
    }

    /// Give the semaphore back on behalf of `task`
    pub fn post(self, kernel: &mut Kernel, task: TaskId) -> OsResult<()> {
        kernel.release(task, self)
    }

    /// Whether the semaphore can be taken without blocking
    pub fn is_available(self, kernel: &Kernel) -> bool {
        matches!(kernel.lock_owner(self), Ok(None))
    }
}

impl From<Semaphore> for LockId {
    fn from(s: Semaphore) -> LockId {
        s.0
    }
}

impl Lock for Semaphore {
    const KIND: LockKind = LockKind::Semaphore;

    fn create(kernel: &mut Kernel, name: &'static str) -> OsResult<Self> {
        Semaphore::new(kernel, name)
    }
}
