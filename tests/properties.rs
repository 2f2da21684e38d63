//! Randomized task sets checked against the scheduling and inheritance
//! invariants after every tick.

use proptest::prelude::*;

use invrtos::scenario::{run_court, CourtConfig, Hold};
use invrtos::{
    Acquire, Kernel, KernelConfig, LockId, LockKind, Mutex, OsResult, OsTaskState, Semaphore,
    TaskCtx,
};

#[derive(Debug, Clone, Copy)]
enum Op {
    Work(u8),
    Acquire(usize),
    Release,
    Delay(u8),
    Yield,
}

fn op(locks: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u8..30).prop_map(Op::Work),
        3 => (0..locks).prop_map(Op::Acquire),
        2 => Just(Op::Release),
        1 => (0u8..6).prop_map(Op::Delay),
        1 => Just(Op::Yield),
    ]
}

#[derive(Debug, Clone)]
struct Script {
    prio: u8,
    ops: Vec<Op>,
}

#[derive(Debug, Clone)]
struct World {
    mutexes: Vec<bool>,
    scripts: Vec<Script>,
}

fn world() -> impl Strategy<Value = World> {
    prop::collection::vec(any::<bool>(), 1..=3).prop_flat_map(|mutexes| {
        let locks = mutexes.len();
        let script = (1u8..=7, prop::collection::vec(op(locks), 1..12))
            .prop_map(|(prio, ops)| Script { prio, ops });
        prop::collection::vec(script, 2..=5)
            .prop_map(move |scripts| World { mutexes: mutexes.clone(), scripts })
    })
}

/// Replays a script forever
///
/// Locks are only taken in ascending order and released in reverse, so the
/// task set cannot deadlock. At the end of the script every held lock is
/// released before starting over.
fn runner(
    script: Script,
    locks: Vec<LockId>,
) -> impl FnMut(&mut TaskCtx<'_>) -> OsResult<()> + 'static {
    let mut pc = 0;
    let mut held: Vec<usize> = Vec::new();
    let mut busy = 0u8;

    move |ctx: &mut TaskCtx<'_>| {
        if busy > 0 {
            busy -= 1;
            return Ok(());
        }

        let Some(&op) = script.ops.get(pc) else {
            match held.pop() {
                Some(lock) => ctx.release(locks[lock])?,
                None => pc = 0,
            }
            return Ok(());
        };
        pc += 1;

        match op {
            Op::Work(cycles) => busy = cycles,
            Op::Acquire(lock) if held.last().map_or(true, |&top| lock > top) => {
                match ctx.acquire(locks[lock]) {
                    Ok(Acquire::Owned) | Ok(Acquire::Blocked) => held.push(lock),
                    Err(err) if err.is_recoverable() => {}
                    Err(err) => return Err(err),
                }
            }
            Op::Acquire(_) => {}
            Op::Release => {
                if let Some(lock) = held.pop() {
                    ctx.release(locks[lock])?;
                }
            }
            Op::Delay(ticks) => ctx.delay(ticks.into())?,
            Op::Yield => ctx.yield_now()?,
        }
        Ok(())
    }
}

fn check_invariants(k: &Kernel, locks: &[LockId]) -> Result<(), TestCaseError> {
    let running = k.task_info(k.running_task()).map_err(|e| TestCaseError::fail(format!("{}", e)))?;

    for id in k.task_ids() {
        let info = k.task_info(id).map_err(|e| TestCaseError::fail(format!("{}", e)))?;
        prop_assert!(info.prio >= info.base_prio, "{} below its base priority", id);
        if info.state == OsTaskState::Ready {
            prop_assert!(
                info.prio <= running.prio,
                "{} ready at {} while {} runs at {}",
                id,
                info.prio,
                running.id,
                running.prio
            );
        }
    }

    for &lock in locks {
        if k.lock_kind(lock).ok() != Some(LockKind::Mutex) {
            continue;
        }
        let Ok(Some(owner)) = k.lock_owner(lock) else {
            continue;
        };
        let owner_prio = k.task_info(owner).map(|i| i.prio).unwrap_or(0);
        for waiter in k.lock_waiters(lock).unwrap_or_default() {
            let waiter_prio = k.task_info(waiter).map(|i| i.prio).unwrap_or(0);
            prop_assert!(
                owner_prio >= waiter_prio,
                "{} owns {} at {} below waiter {} at {}",
                owner,
                lock,
                owner_prio,
                waiter,
                waiter_prio
            );
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_task_sets_keep_invariants(world in world()) {
        let mut k = Kernel::new(KernelConfig::new().audited()).unwrap();

        let mut locks = Vec::new();
        for &is_mutex in world.mutexes.iter() {
            let id = if is_mutex {
                Mutex::new(&mut k, "m").unwrap().id()
            } else {
                Semaphore::new(&mut k, "s").unwrap().id()
            };
            locks.push(id);
        }

        for script in world.scripts.iter() {
            k.create_task("worker", script.prio, runner(script.clone(), locks.clone())).unwrap();
        }
        k.start().unwrap();

        for _ in 0..200 {
            prop_assert_eq!(k.run_for(1), Ok(()));
            check_invariants(&k, &locks)?;
        }
    }

    #[test]
    fn mutex_bounds_king_wait_by_baron_work(
        baron_work in 20u32..300,
        start in 1u32..20,
        period in 10u32..100,
        burst in 10u32..100,
    ) {
        let cfg = CourtConfig {
            emperor_period: period,
            emperor_burst: burst,
            king_start_delay: start,
            baron_hold: Hold::Work(baron_work),
            max_ticks: 10_000,
            ..CourtConfig::inversion()
        };
        let report = run_court::<Mutex>(&cfg).unwrap();

        prop_assert!(report.finished);
        prop_assert!(report.king_wait().unwrap() <= baron_work);
        prop_assert_eq!(report.baron_peak_prio, cfg.ranks.king);
    }
}
