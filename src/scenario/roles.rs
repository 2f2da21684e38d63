//! Task bodies of the court
//!
//! Each role is a small state machine advanced by one step per cycle.

use alloc::sync::Arc;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::error::OsResult;
use crate::sync::{Acquire, Lock};
use crate::task::TaskCtx;
use crate::types::{OsPrio, OsTick};

/// How a role holds the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hold {
    /// Sleep for this many ticks while holding
    Sleep(OsTick),
    /// Consume this many ticks of CPU while holding
    Work(OsTick),
}

/// A tick stamp that may not have happened yet
#[derive(Debug)]
pub(crate) struct Mark(AtomicU32);

impl Mark {
    const UNSET: u32 = u32::MAX;

    pub(crate) fn set(&self, tick: OsTick) {
        self.0.store(tick, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> Option<OsTick> {
        match self.0.load(Ordering::Relaxed) {
            Self::UNSET => None,
            tick => Some(tick),
        }
    }
}

impl Default for Mark {
    fn default() -> Self {
        Mark(AtomicU32::new(Self::UNSET))
    }
}

/// Lock timeline of one role
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    pub(crate) requested: Mark,
    pub(crate) acquired: Mark,
    pub(crate) released: Mark,
    done: AtomicBool,
}

impl Timeline {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

/// State shared between the roles and the caller of the court
#[derive(Debug, Default)]
pub(crate) struct Court {
    pub(crate) king: Timeline,
    pub(crate) baron: Timeline,
    baron_peak: AtomicU8,
    emperor_reports: AtomicU32,
}

impl Court {
    pub(crate) fn all_done(&self) -> bool {
        self.king.is_done() && self.baron.is_done()
    }

    pub(crate) fn baron_peak_prio(&self) -> OsPrio {
        self.baron_peak.load(Ordering::Relaxed)
    }

    pub(crate) fn emperor_reports(&self) -> u32 {
        self.emperor_reports.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    King,
    Baron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Request,
    /// Blocked on the lock; running again means it was handed over
    Waiting,
    Working(u32),
    Sleeping,
    Done,
}

/// King or Baron: take the lock, hold it, give it back, leave
pub(crate) struct Holder<L> {
    role: Role,
    court: Arc<Court>,
    lock: L,
    start_delay: OsTick,
    hold: Hold,
    cycles_per_tick: u32,
    phase: Phase,
}

impl<L: Lock> Holder<L> {
    pub(crate) fn new(
        role: Role,
        court: Arc<Court>,
        lock: L,
        start_delay: OsTick,
        hold: Hold,
        cycles_per_tick: u32,
    ) -> Self {
        Holder {
            role,
            court,
            lock,
            start_delay,
            hold,
            cycles_per_tick,
            phase: Phase::Start,
        }
    }

    fn timeline(&self) -> &Timeline {
        match self.role {
            Role::King => &self.court.king,
            Role::Baron => &self.court.baron,
        }
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskCtx<'_>) -> OsResult<()> {
        match self.phase {
            Phase::Start if self.start_delay > 0 => {
                self.phase = Phase::Request;
                ctx.delay(self.start_delay)
            }
            Phase::Start | Phase::Request => self.request(ctx),
            Phase::Waiting => self.acquired(ctx),
            Phase::Working(left) => {
                self.note_prio(ctx);
                if left > 1 {
                    self.phase = Phase::Working(left - 1);
                    Ok(())
                } else {
                    self.finish(ctx)
                }
            }
            Phase::Sleeping => {
                self.note_prio(ctx);
                self.finish(ctx)
            }
            Phase::Done => Ok(()),
        }
    }

    fn request(&mut self, ctx: &mut TaskCtx<'_>) -> OsResult<()> {
        self.timeline().requested.set(ctx.now());
        match ctx.acquire(self.lock)? {
            Acquire::Owned => self.acquired(ctx),
            Acquire::Blocked => {
                self.phase = Phase::Waiting;
                Ok(())
            }
        }
    }

    fn acquired(&mut self, ctx: &mut TaskCtx<'_>) -> OsResult<()> {
        self.timeline().acquired.set(ctx.now());
        self.note_prio(ctx);
        crate::debug!("{} holds the throne at {}", ctx.id(), ctx.now());

        match self.hold {
            Hold::Sleep(ticks) => {
                self.phase = Phase::Sleeping;
                ctx.delay(ticks)
            }
            Hold::Work(ticks) => match ticks.saturating_mul(self.cycles_per_tick) {
                0 => self.finish(ctx),
                cycles => {
                    self.phase = Phase::Working(cycles);
                    Ok(())
                }
            },
        }
    }

    fn finish(&mut self, ctx: &mut TaskCtx<'_>) -> OsResult<()> {
        ctx.release(self.lock)?;
        let timeline = self.timeline();
        timeline.released.set(ctx.now());
        timeline.done.store(true, Ordering::Relaxed);
        self.phase = Phase::Done;
        ctx.exit();
        Ok(())
    }

    fn note_prio(&self, ctx: &TaskCtx<'_>) {
        if self.role == Role::Baron {
            self.court.baron_peak.fetch_max(ctx.prio(), Ordering::Relaxed);
        }
    }
}

/// Periodic supervisor: sleep, work, report
pub(crate) struct Emperor {
    court: Arc<Court>,
    period: OsTick,
    burst_cycles: u32,
    left: u32,
    started: bool,
}

impl Emperor {
    pub(crate) fn new(court: Arc<Court>, period: OsTick, burst_cycles: u32) -> Self {
        Emperor {
            court,
            period,
            burst_cycles,
            left: 0,
            started: false,
        }
    }

    pub(crate) fn step(&mut self, ctx: &mut TaskCtx<'_>) -> OsResult<()> {
        if self.left > 0 {
            self.left -= 1;
            return Ok(());
        }

        if self.started {
            let reports = self.court.emperor_reports.fetch_add(1, Ordering::Relaxed) + 1;
            crate::info!("emperor report {} at tick {}", reports, ctx.now());
        }
        self.started = true;
        self.left = self.burst_cycles;
        ctx.delay(self.period)
    }
}
