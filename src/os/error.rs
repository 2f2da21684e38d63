//! Error types for the kernel
//!
//! Every fallible kernel call returns [`OsResult`]. Codes follow the
//! μC/OS-III numbering where an equivalent error exists.

use core::fmt;

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Mutex / lock errors ============
    /// Caller is not the lock owner
    NotOwner = 22401,
    /// Caller already owns the lock (locks are not reentrant)
    LockAlreadyHeldBySelf = 22402,
    /// Priority inheritance chain is longer than the configured bound
    InheritanceDepthExceeded = 22404,
    /// Blocking would close a wait cycle back to the caller
    Deadlock = 22405,
    /// No more lock slots available
    LockNoMore = 22406,

    // ============ Object errors ============
    /// Lock id does not name a lock of this kernel
    UnknownLock = 24003,

    // ============ Option errors ============
    /// Invalid option or configuration value
    OptInvalid = 24101,

    // ============ OS state errors ============
    /// Kernel has not been started
    OsNotRunning = 24201,
    /// Kernel is already running
    OsRunning = 24202,

    // ============ Pend errors ============
    /// Lock is owned and the caller asked not to block
    PendWouldBlock = 25008,

    // ============ Priority errors ============
    /// Priority outside the application range
    InvalidPriority = 25203,

    // ============ Scheduler errors ============
    /// Invalid time slice
    SchedInvalidTimeSlice = 28001,

    // ============ State errors ============
    /// Operation not allowed in the task's current state
    StateInvalid = 28205,
    /// The kernel audit found a broken scheduler invariant
    InvariantViolated = 28206,

    // ============ Task errors ============
    /// Task still owns at least one lock
    DeleteWhileOwning = 29003,
    /// Cannot delete idle task
    TaskDelIdle = 29004,
    /// No more TCBs available
    TaskNoMoreTcb = 29008,
    /// Task does not exist (or was deleted)
    UnknownTask = 29010,
    /// Task already suspended itself during this step
    TaskSuspended = 29018,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric error code
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether a caller may sensibly retry after this error
    ///
    /// Everything else is a usage defect in the calling task and stops the
    /// run loop when it escapes a task step.
    #[inline]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, OsError::InheritanceDepthExceeded | OsError::PendWouldBlock)
    }

    const fn message(self) -> &'static str {
        match self {
            OsError::NotOwner => "caller is not the lock owner",
            OsError::LockAlreadyHeldBySelf => "lock is already held by the caller",
            OsError::InheritanceDepthExceeded => "priority inheritance chain too deep",
            OsError::Deadlock => "acquire would deadlock",
            OsError::LockNoMore => "no more lock slots",
            OsError::UnknownLock => "unknown lock",
            OsError::OptInvalid => "invalid option",
            OsError::OsNotRunning => "kernel not running",
            OsError::OsRunning => "kernel already running",
            OsError::PendWouldBlock => "lock is busy",
            OsError::InvalidPriority => "invalid priority",
            OsError::SchedInvalidTimeSlice => "invalid time slice",
            OsError::StateInvalid => "invalid task state",
            OsError::InvariantViolated => "scheduler invariant violated",
            OsError::DeleteWhileOwning => "task deleted while owning a lock",
            OsError::TaskDelIdle => "idle task cannot be deleted",
            OsError::TaskNoMoreTcb => "no more task slots",
            OsError::UnknownTask => "unknown task",
            OsError::TaskSuspended => "task already suspended in this step",
        }
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (os error {})", self.message(), self.code())
    }
}
