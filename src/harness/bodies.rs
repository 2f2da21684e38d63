//! Contender task bodies

use alloc::boxed::Box;
use alloc::sync::Arc;

use portable_atomic::{AtomicU32, Ordering};

use crate::error::OsResult;
use crate::task::TaskCtx;
use crate::types::{OsCtr, OsTick};

/// Shared progress counter, cloned into the task that bumps it
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU32>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> OsCtr {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// What a contender does with its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Body {
    /// Count every cycle, never give up the CPU
    BusySpin,
    /// Count, then yield to same-priority peers
    Cooperative,
}

impl Body {
    /// Task closure counting into `counter`, after sleeping `start_delay`
    pub fn task(
        self,
        counter: ProgressCounter,
        start_delay: OsTick,
    ) -> Box<dyn FnMut(&mut TaskCtx<'_>) -> OsResult<()>> {
        let mut started = start_delay == 0;
        Box::new(move |ctx| {
            if !started {
                started = true;
                return ctx.delay(start_delay);
            }
            counter.increment();
            match self {
                Body::BusySpin => Ok(()),
                Body::Cooperative => ctx.yield_now(),
            }
        })
    }
}
