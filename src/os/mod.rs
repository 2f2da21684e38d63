//! Kernel modules
//!
//! Contains the kernel object, scheduler, task management, and time management.

pub mod cancel;
pub mod config;
pub mod error;
pub mod kernel;
pub mod prio;
pub mod sched;
pub mod task;
pub mod time;
pub mod trace;
pub mod types;
