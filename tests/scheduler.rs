//! Scheduler behavior: dispatch, preemption, round-robin, delays, deletion
//! and the run loop.

use invrtos::harness::ProgressCounter;
use invrtos::trace::TraceEvent;
use invrtos::{
    CancelToken, Kernel, KernelConfig, OsError, OsResult, OsTaskState, TaskCtx, CFG_TASK_MAX,
};

fn kernel() -> Kernel {
    Kernel::new(KernelConfig::new().audited()).unwrap()
}

fn long_quanta() -> Kernel {
    Kernel::new(KernelConfig { time_quanta: 100, ..KernelConfig::new().audited() }).unwrap()
}

fn nop(_: &mut TaskCtx<'_>) -> OsResult<()> {
    Ok(())
}

fn counting(counter: &ProgressCounter) -> impl FnMut(&mut TaskCtx<'_>) -> OsResult<()> + 'static {
    let counter = counter.clone();
    move |_| {
        counter.increment();
        Ok(())
    }
}

#[test]
fn priority_out_of_range_rejected() {
    let mut k = kernel();
    assert_eq!(k.create_task("idle-level", 0, nop), Err(OsError::InvalidPriority));
    assert_eq!(k.create_task("too-high", 8, nop), Err(OsError::InvalidPriority));
    assert!(k.create_task("ok", 7, nop).is_ok());
}

#[test]
fn run_requires_start() {
    let mut k = kernel();
    assert_eq!(k.run_for(1), Err(OsError::OsNotRunning));
    k.start().unwrap();
    assert_eq!(k.start(), Err(OsError::OsRunning));
    assert!(k.run_for(1).is_ok());
}

#[test]
fn idle_runs_when_nothing_else_is_ready() {
    let mut k = kernel();
    k.start().unwrap();
    k.run_for(3).unwrap();

    assert_eq!(k.running_task(), k.idle_task());
    assert_eq!(k.idle_cycles(), 3 * KernelConfig::new().cycles_per_tick as u64);
    assert_eq!(k.delete_task(k.idle_task()), Err(OsError::TaskDelIdle));
}

#[test]
fn highest_priority_runs_first() {
    let mut k = kernel();
    let _low = k.create_task("low", 1, nop).unwrap();
    let high = k.create_task("high", 4, nop).unwrap();
    let _mid = k.create_task("mid", 2, nop).unwrap();
    k.start().unwrap();

    assert_eq!(k.running_task(), high);
    k.run_for(10).unwrap();
    assert_eq!(k.running_task(), high);
}

#[test]
fn created_task_preempts_immediately() {
    let mut k = kernel();
    let low = k.create_task("low", 1, nop).unwrap();
    k.start().unwrap();
    k.run_for(2).unwrap();
    assert_eq!(k.running_task(), low);

    let high = k.create_task("high", 3, nop).unwrap();
    assert_eq!(k.running_task(), high);
    assert_eq!(k.task_info(low).unwrap().state, OsTaskState::Ready);
}

#[test]
fn woken_task_preempts_mid_quantum() {
    let mut k = long_quanta();
    let low_count = ProgressCounter::new();
    let low = k.create_task("low", 1, counting(&low_count)).unwrap();

    let mut slept = false;
    let high = k
        .create_task("high", 5, move |ctx| {
            if !slept {
                slept = true;
                return ctx.delay(5);
            }
            Ok(())
        })
        .unwrap();

    k.start().unwrap();
    k.run_for(4).unwrap();
    assert_eq!(k.running_task(), low);

    k.run_for(1).unwrap();
    assert_eq!(k.running_task(), high);
    assert_eq!(k.task_info(low).unwrap().state, OsTaskState::Ready);

    // The low task keeps its place and its counter stops while preempted
    let frozen = low_count.get();
    k.run_for(3).unwrap();
    assert_eq!(low_count.get(), frozen);
}

#[test]
fn woken_task_queues_behind_running_peer() {
    let mut k = long_quanta();
    let mut slept = false;
    let woken = k
        .create_task("woken", 2, move |ctx| {
            if !slept {
                slept = true;
                return ctx.delay(5);
            }
            Ok(())
        })
        .unwrap();
    let count = ProgressCounter::new();
    let busy = k.create_task("busy", 2, counting(&count)).unwrap();
    k.start().unwrap();

    k.run_for(5).unwrap();
    assert_eq!(k.running_task(), busy);
    assert_eq!(k.task_info(woken).unwrap().state, OsTaskState::Ready);
    assert_eq!(k.ready_queue(2).collect::<Vec<_>>(), [busy, woken]);

    // The busy task finishes its quantum before the woken one gets a turn
    k.run_for(94).unwrap();
    assert_eq!(k.running_task(), busy);
    k.run_for(1).unwrap();
    assert_eq!(k.running_task(), woken);
    assert_eq!(k.ready_queue(2).collect::<Vec<_>>(), [woken, busy]);
}

#[test]
fn created_task_queues_behind_running_peer() {
    let mut k = long_quanta();
    let count = ProgressCounter::new();
    let busy = k.create_task("busy", 2, counting(&count)).unwrap();
    k.start().unwrap();
    k.run_for(3).unwrap();

    let late = k.create_task("late", 2, nop).unwrap();
    assert_eq!(k.running_task(), busy);
    assert_eq!(k.task_info(late).unwrap().state, OsTaskState::Ready);
    assert_eq!(k.ready_queue(2).collect::<Vec<_>>(), [busy, late]);

    k.run_for(96).unwrap();
    assert_eq!(k.running_task(), busy);
    k.run_for(1).unwrap();
    assert_eq!(k.running_task(), late);
}

#[test]
fn equal_priorities_share_by_round_robin() {
    let mut k = kernel();
    let (a, b) = (ProgressCounter::new(), ProgressCounter::new());
    k.create_task("a", 2, counting(&a)).unwrap();
    k.create_task("b", 2, counting(&b)).unwrap();
    k.start().unwrap();

    k.run_for(100).unwrap();
    assert_eq!(a.get(), 500);
    assert_eq!(b.get(), 500);
}

#[test]
fn round_robin_can_be_disabled() {
    let mut k = Kernel::new(KernelConfig { round_robin: false, ..KernelConfig::new() }).unwrap();
    let (a, b) = (ProgressCounter::new(), ProgressCounter::new());
    k.create_task("a", 2, counting(&a)).unwrap();
    k.create_task("b", 2, counting(&b)).unwrap();
    k.start().unwrap();

    k.run_for(20).unwrap();
    assert_eq!(a.get(), 200);
    assert_eq!(b.get(), 0);
}

#[test]
fn yield_hands_turn_to_peer() {
    let mut k = kernel();
    let (a, b) = (ProgressCounter::new(), ProgressCounter::new());
    let counter = a.clone();
    let first = k
        .create_task("a", 2, move |ctx| {
            counter.increment();
            ctx.yield_now()
        })
        .unwrap();
    k.create_task("b", 2, counting(&b)).unwrap();
    k.start().unwrap();
    assert_eq!(k.running_task(), first);

    k.run_for(1).unwrap();
    assert_eq!(a.get(), 1);
    assert_eq!(b.get(), 9);
}

#[test]
fn yield_alone_keeps_running() {
    let mut k = kernel();
    let a = ProgressCounter::new();
    let counter = a.clone();
    k.create_task("a", 2, move |ctx| {
        counter.increment();
        ctx.yield_now()
    })
    .unwrap();
    k.start().unwrap();
    k.run_for(2).unwrap();
    assert_eq!(a.get(), 20);
}

#[test]
fn delay_blocks_until_deadline() {
    let mut k = kernel();
    let mut done = false;
    let t = k
        .create_task("sleeper", 3, move |ctx| {
            if !done {
                done = true;
                ctx.delay(7)?;
            }
            Ok(())
        })
        .unwrap();
    k.start().unwrap();

    k.run_for(6).unwrap();
    assert_eq!(k.task_info(t).unwrap().state, OsTaskState::Delayed);
    k.run_for(1).unwrap();
    assert_eq!(k.running_task(), t);
}

#[test]
fn delay_beyond_wheel_size() {
    let mut k = kernel();
    let mut done = false;
    let t = k
        .create_task("sleeper", 3, move |ctx| {
            if !done {
                done = true;
                ctx.delay(40)?;
            }
            Ok(())
        })
        .unwrap();
    k.start().unwrap();

    k.run_for(39).unwrap();
    assert_eq!(k.task_info(t).unwrap().state, OsTaskState::Delayed);
    k.run_for(1).unwrap();
    assert_eq!(k.task_info(t).unwrap().state, OsTaskState::Running);
}

#[test]
fn delay_zero_yields() {
    let mut k = kernel();
    let b = ProgressCounter::new();
    let first = k.create_task("a", 2, |ctx| ctx.delay(0)).unwrap();
    k.create_task("b", 2, counting(&b)).unwrap();
    k.start().unwrap();

    k.run_for(1).unwrap();
    assert_eq!(b.get(), 9);
    // Quanta of "b" expired at the tick, "a" is back at the head
    assert_eq!(k.running_task(), first);
    assert_eq!(k.task_info(first).unwrap().state, OsTaskState::Running);
}

#[test]
fn second_suspension_in_one_step_fails() {
    let mut k = kernel();
    k.create_task("greedy", 2, |ctx| {
        ctx.yield_now()?;
        ctx.delay(3)
    })
    .unwrap();
    k.start().unwrap();
    assert_eq!(k.run_for(1), Err(OsError::TaskSuspended));
}

#[test]
fn exit_deletes_after_step() {
    let mut k = kernel();
    let t = k.create_task("once", 2, |ctx| {
        ctx.exit();
        Ok(())
    })
    .unwrap();
    k.start().unwrap();
    k.run_for(1).unwrap();

    assert_eq!(k.task_info(t), Err(OsError::UnknownTask));
    assert_eq!(k.running_task(), k.idle_task());
    assert_eq!(k.delete_task(t), Err(OsError::UnknownTask));
}

#[test]
fn delete_running_task_dispatches_next() {
    let mut k = kernel();
    let low = k.create_task("low", 1, nop).unwrap();
    let high = k.create_task("high", 2, nop).unwrap();
    k.start().unwrap();
    assert_eq!(k.running_task(), high);

    k.delete_task(high).unwrap();
    assert_eq!(k.running_task(), low);
    assert!(k.task_ids().all(|id| id != high));
}

#[test]
fn delete_delayed_task() {
    let mut k = kernel();
    let t = k.create_task("sleeper", 2, |ctx| ctx.delay(5)).unwrap();
    k.start().unwrap();
    k.run_for(1).unwrap();
    assert_eq!(k.task_info(t).unwrap().state, OsTaskState::Delayed);

    k.delete_task(t).unwrap();
    k.run_for(10).unwrap();
    assert_eq!(k.running_task(), k.idle_task());
}

#[test]
fn spawned_task_runs_after_step() {
    let mut k = kernel();
    let child_count = ProgressCounter::new();
    let counter = child_count.clone();
    let mut spawned = false;
    k.create_task("parent", 1, move |ctx| {
        if !spawned {
            spawned = true;
            let counter = counter.clone();
            ctx.spawn("child", 4, move |_| {
                counter.increment();
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap();
    k.start().unwrap();
    k.run_for(1).unwrap();
    assert_eq!(child_count.get(), 9);
}

#[test]
fn task_with_typed_argument() {
    fn bump(_: &mut TaskCtx<'_>, counter: &mut ProgressCounter) -> OsResult<()> {
        counter.increment();
        Ok(())
    }

    let mut k = kernel();
    let counter = ProgressCounter::new();
    k.create_task_with_arg("typed", 2, bump, counter.clone()).unwrap();
    k.start().unwrap();
    k.run_for(2).unwrap();
    assert_eq!(counter.get(), 20);
}

#[test]
fn task_limit() {
    let mut k = kernel();
    for _ in 1..CFG_TASK_MAX {
        k.create_task("filler", 1, nop).unwrap();
    }
    assert_eq!(k.create_task("one-too-many", 1, nop), Err(OsError::TaskNoMoreTcb));
}

#[test]
fn deleted_slots_are_reused() {
    let mut k = Kernel::new(KernelConfig::new()).unwrap();
    let first = k.create_task("churn", 1, nop).unwrap();
    k.delete_task(first).unwrap();

    for _ in 0..70_000u32 {
        let id = k.create_task("churn", 1, nop).unwrap();
        assert_eq!(id.index(), first.index());
        k.delete_task(id).unwrap();
    }

    let live = k.create_task("live", 1, nop).unwrap();
    assert_eq!(live.index(), first.index());
    assert_ne!(live, first);
    assert_eq!(k.task_info(first), Err(OsError::UnknownTask));
    assert_eq!(k.delete_task(first), Err(OsError::UnknownTask));
    assert_eq!(k.task_info(live).unwrap().name, "live");
    assert_eq!(k.task_ids().count(), 2);
}

#[test]
fn task_limit_counts_live_tasks() {
    let mut k = kernel();
    let mut ids = Vec::new();
    for _ in 1..CFG_TASK_MAX {
        ids.push(k.create_task("filler", 1, nop).unwrap());
    }
    assert_eq!(k.create_task("one-too-many", 1, nop), Err(OsError::TaskNoMoreTcb));

    let gone = ids[3];
    k.delete_task(gone).unwrap();
    let again = k.create_task("again", 1, nop).unwrap();
    assert_eq!(again.index(), gone.index());
    assert_eq!(again.generation(), gone.generation() + 1);
    assert_eq!(k.create_task("one-too-many", 1, nop), Err(OsError::TaskNoMoreTcb));
}

#[test]
fn cancel_token_stops_run_loop() {
    let mut k = kernel();
    let token = CancelToken::new();
    let stop = token.clone();
    let mut steps = 0;
    k.create_task("stopper", 2, move |_| {
        steps += 1;
        if steps == 25 {
            stop.cancel();
        }
        Ok(())
    })
    .unwrap();

    k.start_scheduler(&token).unwrap();
    assert_eq!(k.now(), 3);
}

#[test]
fn run_until_reports_whether_condition_held() {
    let mut k = kernel();
    k.start().unwrap();
    assert_eq!(k.run_until(10, |k| k.now() == 4), Ok(true));
    assert_eq!(k.now(), 4);
    assert_eq!(k.run_until(3, |k| k.now() == 100), Ok(false));
    assert_eq!(k.now(), 7);
}

#[test]
fn trace_records_switches() {
    let mut k = kernel();
    let a = k.create_task("a", 2, nop).unwrap();
    let b = k.create_task("b", 2, nop).unwrap();
    k.start().unwrap();
    k.run_for(2).unwrap();

    let switches: Vec<_> = k
        .trace()
        .events()
        .filter_map(|e| match e {
            TraceEvent::Switch { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(switches, [(k.idle_task(), a), (a, b), (b, a)]);
    assert_eq!(k.context_switches(), 3);
}
