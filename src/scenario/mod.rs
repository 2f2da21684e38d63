//! The court: Emperor, King and Baron contending for one lock
//!
//! Baron takes the lock first and holds it for a long time. King asks for
//! it after a delay and holds it briefly. Emperor never touches the lock;
//! it sleeps and works periodically to put pressure on the CPU. Running the
//! same court once with a [`Semaphore`](crate::Semaphore) and once with a
//! [`Mutex`](crate::Mutex) shows how long King waits with and without
//! priority inheritance.

mod roles;

pub use roles::Hold;

use alloc::sync::Arc;

use crate::config::KernelConfig;
use crate::error::OsResult;
use crate::kernel::Kernel;
use crate::sync::Lock;
use crate::types::{LockKind, OsPrio, OsTick};

use roles::{Court, Emperor, Holder, Role};

/// Priorities of the three roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ranks {
    pub emperor: OsPrio,
    pub king: OsPrio,
    pub baron: OsPrio,
}

impl Ranks {
    /// Emperor above King above Baron
    pub const FIRMWARE: Ranks = Ranks { emperor: 3, king: 2, baron: 1 };

    /// Emperor's pressure sits between King and Baron
    ///
    /// King ranks above Emperor here. Inheritance only lifts Baron to King's
    /// level, so with Emperor on top Baron would still lose every burst.
    pub const INVERSION: Ranks = Ranks { emperor: 2, king: 3, baron: 1 };
}

/// Court timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourtConfig {
    pub kernel: KernelConfig,
    pub ranks: Ranks,
    /// Emperor sleeps this long between bursts
    pub emperor_period: OsTick,
    /// Ticks of CPU work Emperor does after each sleep
    pub emperor_burst: OsTick,
    /// King sleeps this long before asking for the lock
    pub king_start_delay: OsTick,
    pub king_hold: Hold,
    pub baron_hold: Hold,
    /// Give up if King and Baron are not both done by then
    pub max_ticks: OsTick,
}

impl CourtConfig {
    /// Board timings: holds are sleeps, Emperor only reports
    pub const fn firmware() -> Self {
        CourtConfig {
            kernel: KernelConfig::new(),
            ranks: Ranks::FIRMWARE,
            emperor_period: 1000,
            emperor_burst: 0,
            king_start_delay: 500,
            king_hold: Hold::Sleep(2000),
            baron_hold: Hold::Sleep(4000),
            max_ticks: 20_000,
        }
    }

    /// Baron holds the lock while working, so Emperor's bursts can
    /// starve it
    ///
    /// Uses [`Ranks::INVERSION`], which puts King above Emperor and so
    /// departs from the board's Emperor > King > Baron order. If Emperor
    /// outranked King, a Baron boosted to King's priority would still be
    /// preempted by every Emperor burst and no lock could bound King's wait.
    /// [`CourtConfig::firmware`] keeps the board order.
    pub const fn inversion() -> Self {
        CourtConfig {
            kernel: KernelConfig::new(),
            ranks: Ranks::INVERSION,
            emperor_period: 100,
            emperor_burst: 100,
            king_start_delay: 100,
            king_hold: Hold::Work(10),
            baron_hold: Hold::Work(400),
            max_ticks: 5_000,
        }
    }
}

impl Default for CourtConfig {
    fn default() -> Self {
        Self::firmware()
    }
}

/// What happened at court
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CourtReport {
    pub lock_kind: LockKind,
    /// Name the contested lock was created with
    pub lock_name: &'static str,
    pub king_requested: Option<OsTick>,
    pub king_acquired: Option<OsTick>,
    pub king_released: Option<OsTick>,
    pub baron_acquired: Option<OsTick>,
    pub baron_released: Option<OsTick>,
    /// Highest effective priority Baron ran at while holding the lock
    pub baron_peak_prio: OsPrio,
    pub emperor_reports: u32,
    /// King and Baron both released the lock before `max_ticks`
    pub finished: bool,
    pub finished_at: OsTick,
    pub context_switches: u64,
}

impl CourtReport {
    /// Ticks between King asking for the lock and getting it
    pub fn king_wait(&self) -> Option<OsTick> {
        Some(self.king_acquired?.wrapping_sub(self.king_requested?))
    }

    /// Ticks Baron held the lock
    pub fn baron_hold(&self) -> Option<OsTick> {
        Some(self.baron_released?.wrapping_sub(self.baron_acquired?))
    }
}

/// Hold court with lock type `L`
pub fn run_court<L: Lock + 'static>(cfg: &CourtConfig) -> OsResult<CourtReport> {
    let mut kernel = Kernel::new(cfg.kernel)?;
    let lock = L::create(&mut kernel, "throne")?;
    let court = Arc::new(Court::default());
    let cycles_per_tick = cfg.kernel.cycles_per_tick;

    let mut emperor = Emperor::new(
        court.clone(),
        cfg.emperor_period,
        cfg.emperor_burst.saturating_mul(cycles_per_tick),
    );
    kernel.create_task("Emperor", cfg.ranks.emperor, move |ctx| emperor.step(ctx))?;

    let mut king = Holder::new(
        Role::King,
        court.clone(),
        lock,
        cfg.king_start_delay,
        cfg.king_hold,
        cycles_per_tick,
    );
    kernel.create_task("King", cfg.ranks.king, move |ctx| king.step(ctx))?;

    let mut baron =
        Holder::new(Role::Baron, court.clone(), lock, 0, cfg.baron_hold, cycles_per_tick);
    kernel.create_task("Baron", cfg.ranks.baron, move |ctx| baron.step(ctx))?;

    crate::info!("court opens with a {}", L::KIND.name());
    kernel.start()?;
    let finished = kernel.run_until(cfg.max_ticks, |_| court.all_done())?;

    let report = CourtReport {
        lock_kind: L::KIND,
        lock_name: kernel.lock_name(lock)?,
        king_requested: court.king.requested.get(),
        king_acquired: court.king.acquired.get(),
        king_released: court.king.released.get(),
        baron_acquired: court.baron.acquired.get(),
        baron_released: court.baron.released.get(),
        baron_peak_prio: court.baron_peak_prio(),
        emperor_reports: court.emperor_reports(),
        finished,
        finished_at: kernel.now(),
        context_switches: kernel.context_switches(),
    };

    if !finished {
        crate::warn!("court with a {} still in session at tick {}", L::KIND.name(), kernel.now());
    }
    crate::info!("court adjourned at tick {}", report.finished_at);
    Ok(report)
}
