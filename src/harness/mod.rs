//! Scheduler property battery
//!
//! Two contenders, King and Baron, each bump a [`ProgressCounter`] while
//! they run. Every case gives them a body (busy-spin or cooperative), a
//! priority and a start time, runs a fresh kernel for a fixed number of
//! ticks, and compares the counters.

mod bodies;

pub use bodies::{Body, ProgressCounter};

use crate::cancel::CancelToken;
use crate::config::KernelConfig;
use crate::error::OsResult;
use crate::kernel::Kernel;
use crate::types::{OsCtr, OsPrio, OsTick};

/// One contender of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Contender {
    pub prio: OsPrio,
    pub body: Body,
    /// Start this many ticks after the case begins
    pub start_delay: OsTick,
}

impl Contender {
    pub const fn new(prio: OsPrio, body: Body) -> Self {
        Contender { prio, body, start_delay: 0 }
    }

    pub const fn delayed(mut self, ticks: OsTick) -> Self {
        self.start_delay = ticks;
        self
    }
}

/// Expected relation between the final counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Expect {
    /// Equal within the configured tolerance
    Equal,
    /// King strictly ahead
    KingAhead,
}

impl Expect {
    pub fn holds(self, king: OsCtr, baron: OsCtr, tolerance: OsCtr) -> bool {
        match self {
            Expect::Equal => king.abs_diff(baron) <= tolerance,
            Expect::KingAhead => king > baron,
        }
    }
}

/// One scenario of the battery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Case {
    pub name: &'static str,
    pub king: Contender,
    pub baron: Contender,
    pub expect: Expect,
}

const STAGGER: OsTick = 100;

/// The fixed battery
pub const BATTERY: [Case; 5] = [
    Case {
        name: "equal priority busy spin",
        king: Contender::new(1, Body::BusySpin),
        baron: Contender::new(1, Body::BusySpin),
        expect: Expect::Equal,
    },
    Case {
        name: "equal priority cooperative",
        king: Contender::new(1, Body::Cooperative),
        baron: Contender::new(1, Body::Cooperative),
        expect: Expect::Equal,
    },
    Case {
        name: "busy spin beats cooperative",
        king: Contender::new(1, Body::BusySpin),
        baron: Contender::new(1, Body::Cooperative),
        expect: Expect::KingAhead,
    },
    Case {
        name: "higher priority wins",
        king: Contender::new(2, Body::BusySpin),
        baron: Contender::new(1, Body::BusySpin),
        expect: Expect::KingAhead,
    },
    Case {
        name: "higher priority wins from behind",
        king: Contender::new(2, Body::BusySpin).delayed(STAGGER),
        baron: Contender::new(1, Body::BusySpin),
        expect: Expect::KingAhead,
    },
];

/// Battery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    pub kernel: KernelConfig,
    /// Ticks each case runs for
    pub run_ticks: OsTick,
    /// Add the Emperor supervisor to every case
    pub supervisor: bool,
    pub supervisor_prio: OsPrio,
    pub supervisor_period: OsTick,
    /// Idle ticks between soak rounds
    pub restart_pause: OsTick,
    /// Allowed counter difference for [`Expect::Equal`]
    pub tolerance: OsCtr,
    /// Stop soaking after this many rounds, `None` runs until cancelled
    pub soak_rounds: Option<u32>,
}

impl HarnessConfig {
    pub const fn new() -> Self {
        HarnessConfig {
            kernel: KernelConfig::new(),
            run_ticks: 1000,
            supervisor: true,
            supervisor_prio: 3,
            supervisor_period: 1000,
            restart_pause: 5000,
            tolerance: 1,
            soak_rounds: None,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaseOutcome {
    pub name: &'static str,
    pub king: OsCtr,
    pub baron: OsCtr,
    pub passed: bool,
}

/// Pass/fail counts of one battery run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryReport {
    pub passed: u32,
    pub failed: u32,
}

impl BatteryReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Totals of a soak run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SoakReport {
    pub rounds: u32,
    pub passed: u32,
    pub failed: u32,
}

/// Runs the battery
#[derive(Debug, Default)]
pub struct Harness {
    cfg: HarnessConfig,
    king: ProgressCounter,
    baron: ProgressCounter,
}

impl Harness {
    pub fn new(cfg: HarnessConfig) -> Self {
        Harness {
            cfg,
            king: ProgressCounter::new(),
            baron: ProgressCounter::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.cfg
    }

    /// King's counter
    pub fn king(&self) -> &ProgressCounter {
        &self.king
    }

    /// Baron's counter
    pub fn baron(&self) -> &ProgressCounter {
        &self.baron
    }

    /// Reset shared counters before a case
    pub fn set_up(&self) {
        self.king.reset();
        self.baron.reset();
    }

    /// Report a finished case
    pub fn tear_down(&self, outcome: &CaseOutcome) {
        if outcome.passed {
            crate::info!("PASS {}: king {} baron {}", outcome.name, outcome.king, outcome.baron);
        } else {
            crate::warn!("FAIL {}: king {} baron {}", outcome.name, outcome.king, outcome.baron);
        }
    }

    /// Run one case on a fresh kernel
    pub fn run_case(&self, case: &Case) -> OsResult<CaseOutcome> {
        self.set_up();

        let mut kernel = Kernel::new(self.cfg.kernel)?;
        if self.cfg.supervisor {
            let (king, baron) = (self.king.clone(), self.baron.clone());
            let period = self.cfg.supervisor_period;
            let mut first = true;
            kernel.create_task("Emperor", self.cfg.supervisor_prio, move |ctx| {
                if !first {
                    crate::info!(
                        "emperor at tick {}: king {} baron {}",
                        ctx.now(),
                        king.get(),
                        baron.get()
                    );
                }
                first = false;
                ctx.delay(period)
            })?;
        }

        let king = case.king.body.task(self.king.clone(), case.king.start_delay);
        kernel.create_task("King", case.king.prio, king)?;
        let baron = case.baron.body.task(self.baron.clone(), case.baron.start_delay);
        kernel.create_task("Baron", case.baron.prio, baron)?;

        kernel.start()?;
        kernel.run_for(self.cfg.run_ticks)?;

        let (king, baron) = (self.king.get(), self.baron.get());
        let outcome = CaseOutcome {
            name: case.name,
            king,
            baron,
            passed: case.expect.holds(king, baron, self.cfg.tolerance),
        };
        self.tear_down(&outcome);
        Ok(outcome)
    }

    /// Run every case of [`BATTERY`]
    pub fn run_battery(&self) -> OsResult<BatteryReport> {
        let mut report = BatteryReport::default();
        for case in BATTERY.iter() {
            if self.run_case(case)?.passed {
                report.passed += 1;
            } else {
                report.failed += 1;
            }
        }
        crate::info!("battery done: {} passed, {} failed", report.passed, report.failed);
        Ok(report)
    }

    /// Re-run the battery until `token` is cancelled
    ///
    /// Rounds are separated by `restart_pause` idle ticks, during which the
    /// token is checked every tick.
    pub fn soak(&self, token: &CancelToken) -> OsResult<SoakReport> {
        let mut soak = SoakReport::default();

        while !token.is_cancelled() && self.cfg.soak_rounds.map_or(true, |max| soak.rounds < max) {
            let report = self.run_battery()?;
            soak.rounds += 1;
            soak.passed += report.passed;
            soak.failed += report.failed;

            let mut pause = Kernel::new(self.cfg.kernel)?;
            pause.start()?;
            pause.run_until(self.cfg.restart_pause, |_| token.is_cancelled())?;
        }

        crate::info!("soak stopped after {} rounds, {} failures", soak.rounds, soak.failed);
        Ok(soak)
    }
}
