//! Cooperative cancellation of the run loop

use alloc::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

/// Shared stop flag checked by [`Kernel::run`](crate::Kernel::run) at every
/// tick boundary
///
/// Clones share the flag, so a task, the harness, and the caller of the run
/// loop can all hold one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run loop to stop at the next tick boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
