//! Priority Inversion Demo - semaphore vs. inheriting mutex
//!
//! Emperor(2) bursts periodically, King(3) and Baron(1) share one lock.
//! With a semaphore King waits for every Emperor burst; with a mutex Baron
//! is boosted to King's priority and finishes first.

use invrtos::scenario::{run_court, CourtConfig, CourtReport};
use invrtos::{Mutex, OsResult, Semaphore};

fn tick(t: Option<u32>) -> String {
    t.map_or_else(|| "-".into(), |t| t.to_string())
}

fn show(report: &CourtReport) {
    println!("[{} {}]", report.lock_kind.name(), report.lock_name);
    println!(
        "  baron acquired {} released {}",
        tick(report.baron_acquired),
        tick(report.baron_released)
    );
    println!(
        "  king  requested {} acquired {} released {}",
        tick(report.king_requested),
        tick(report.king_acquired),
        tick(report.king_released)
    );
    println!("  king waited {} ticks", tick(report.king_wait()));
    println!("  baron peak priority {}", report.baron_peak_prio);
    println!(
        "  emperor reports {}, context switches {}",
        report.emperor_reports, report.context_switches
    );
    if !report.finished {
        println!("  still in session at tick {}", report.finished_at);
    }
}

fn main() -> OsResult<()> {
    let firmware = std::env::args().any(|a| a == "--firmware");
    let cfg = if firmware {
        CourtConfig::firmware()
    } else {
        CourtConfig::inversion()
    };
    println!(
        "Priority Inversion Demo: E({}) K({}) B({})",
        cfg.ranks.emperor, cfg.ranks.king, cfg.ranks.baron
    );

    let with_sem = run_court::<Semaphore>(&cfg)?;
    show(&with_sem);
    let with_mutex = run_court::<Mutex>(&cfg)?;
    show(&with_mutex);

    if let (Some(sem), Some(mutex)) = (with_sem.king_wait(), with_mutex.king_wait()) {
        println!("inheritance saved King {} ticks", sem.saturating_sub(mutex));
    }
    Ok(())
}
