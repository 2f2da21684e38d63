//! Configuration for the kernel
//!
//! The `CFG_*` constants are the compile-time defaults and hard limits.
//! [`KernelConfig`] carries the values a kernel instance is built with.

use crate::error::{OsError, OsResult};
use crate::types::{OsPrio, OsTick};

/// Number of priority levels (0 ..= CFG_PRIO_MAX - 1, higher is more urgent)
pub const CFG_PRIO_MAX: usize = 8;

/// Idle task priority
pub const CFG_PRIO_IDLE: OsPrio = 0;

/// Highest priority an application task may use
pub const CFG_PRIO_HIGHEST: OsPrio = (CFG_PRIO_MAX - 1) as OsPrio;

/// Steps executed by the running task between two ticks
pub const CFG_CYCLES_PER_TICK: u32 = 10;

/// Default time quanta for round-robin scheduling, in ticks
pub const CFG_TIME_QUANTA_DEFAULT: OsTick = 1;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Number of entries in tick wheel
pub const CFG_TICK_WHEEL_SIZE: usize = 16;

/// Maximum number of live tasks, idle task included
pub const CFG_TASK_MAX: usize = 32;

/// Maximum number of locks (mutexes and semaphores together)
pub const CFG_LOCK_MAX: usize = 16;

/// Maximum number of owners boosted by a single blocking acquire
pub const CFG_INHERIT_DEPTH_MAX: usize = 8;

/// Number of records kept in the trace ring
pub const CFG_TRACE_CAPACITY: usize = 256;

/// Runtime configuration of a [`Kernel`](crate::Kernel)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Steps executed by the running task per tick
    pub cycles_per_tick: u32,
    /// Round-robin time slice, in ticks
    pub time_quanta: OsTick,
    /// Rotate same-priority tasks when their quanta expires
    pub round_robin: bool,
    /// Bound on transitive priority inheritance
    pub inherit_depth_max: usize,
    /// Trace ring size (0 disables tracing)
    pub trace_capacity: usize,
    /// Run [`Kernel::audit`](crate::Kernel::audit) after every dispatch
    pub audit: bool,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            cycles_per_tick: CFG_CYCLES_PER_TICK,
            time_quanta: CFG_TIME_QUANTA_DEFAULT,
            round_robin: CFG_SCHED_ROUND_ROBIN_EN,
            inherit_depth_max: CFG_INHERIT_DEPTH_MAX,
            trace_capacity: CFG_TRACE_CAPACITY,
            audit: false,
        }
    }

    /// Same configuration with the invariant audit switched on
    pub const fn audited(mut self) -> Self {
        self.audit = true;
        self
    }

    /// Check the values against the compile-time limits
    pub fn validate(&self) -> OsResult<()> {
        if self.cycles_per_tick == 0 {
            return Err(OsError::OptInvalid);
        }

        if self.time_quanta == 0 {
            return Err(OsError::SchedInvalidTimeSlice);
        }

        if self.inherit_depth_max == 0 || self.inherit_depth_max > CFG_TASK_MAX {
            return Err(OsError::OptInvalid);
        }

        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
