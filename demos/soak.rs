//! Soak Demo - scheduler battery on repeat
//!
//! Runs the contender battery `ROUNDS` times (first argument, default 3,
//! 0 soaks until the process is stopped) with the invariant audit on,
//! pausing between rounds like the board does.

use invrtos::harness::{Harness, HarnessConfig, BATTERY};
use invrtos::{CancelToken, KernelConfig, OsResult};

fn main() -> OsResult<()> {
    let rounds: u32 = std::env::args().nth(1).and_then(|a| a.parse().ok()).unwrap_or(3);

    let cfg = HarnessConfig {
        kernel: KernelConfig::new().audited(),
        restart_pause: 100,
        soak_rounds: Some(rounds).filter(|&r| r > 0),
        ..HarnessConfig::new()
    };
    let harness = Harness::new(cfg);

    for case in BATTERY.iter() {
        let outcome = harness.run_case(case)?;
        println!(
            "{:<36} king {:>6} baron {:>6}  {}",
            outcome.name,
            outcome.king,
            outcome.baron,
            if outcome.passed { "PASS" } else { "FAIL" }
        );
    }

    let soak = harness.soak(&CancelToken::new())?;
    println!("soak: {} rounds, {} passed, {} failed", soak.rounds, soak.passed, soak.failed);
    if soak.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
