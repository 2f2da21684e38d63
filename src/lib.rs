//! Priority-inversion test bench built on a small RTOS kernel
//!
//! A deterministic, single-core kernel model providing:
//! - Priority-based preemptive scheduling with round-robin among equals
//! - A priority-inheriting mutex and a plain binary semaphore
//! - Tick-based delays and bounded lock waits
//! - The Emperor/King/Baron inversion scenario and a soak-test battery

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Logging ============

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

// ============ Modules ============

pub mod log;

pub mod os;
pub mod sync;
pub mod scenario;
pub mod harness;

// ============ Re-exports ============

pub use os::cancel;
pub use os::cancel::CancelToken;
pub use os::config;
pub use os::config::*;
pub use os::error;
pub use os::error::{OsError, OsResult};
pub use os::kernel;
pub use os::kernel::{Kernel, Violation};
pub use os::prio;
pub use os::sched;
pub use os::task;
pub use os::task::{TaskCtx, TaskInfo};
pub use os::time;
pub use os::trace;
pub use os::types;
pub use os::types::*;

pub use sync::mutex;
pub use sync::mutex::Mutex;
pub use sync::sem;
pub use sync::sem::Semaphore;
pub use sync::{Acquire, Lock};
