mod common;

use common::{ExecutionLog, init_tracing, ms};
use detsched::{DeterministicScheduler, Scheduler, Task, VirtualTime};
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const MAX_STEP: u64 = 50;
const INITIAL_MS: u64 = 1_000;

/// One driver action.
#[derive(Debug, Clone)]
enum Op {
    Schedule(u64),
    /// A task that advances time itself when it runs.
    ScheduleAdvance { delay: u64, delta: u64 },
    Advance { delta: u64, step: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..300).prop_map(Op::Schedule),
        (0u64..300, 0u64..40).prop_map(|(delay, delta)| Op::ScheduleAdvance { delay, delta }),
        (0u64..200, 1u64..=MAX_STEP).prop_map(|(delta, step)| Op::Advance { delta, step }),
    ]
}

/// What one task saw: its enqueue index, its due time, and the clock when it ran.
type Observation = (usize, VirtualTime, VirtualTime);

struct Outcome {
    observations: Vec<Observation>,
    scheduled: usize,
    clock_after_script: VirtualTime,
    elapsed: Duration,
}

fn play(ops: &[Op]) -> Outcome {
    init_tracing();
    let sched = DeterministicScheduler::new();
    sched
        .set_initial_time(VirtualTime::from_millis(INITIAL_MS))
        .expect("idle scheduler accepts initial time");
    sched.start().expect("start scheduler");

    let log: ExecutionLog<Observation> = ExecutionLog::new();
    let mut scheduled = 0;
    let mut elapsed = Duration::ZERO;
    let nested_elapsed = Rc::new(Cell::new(Duration::ZERO));

    for op in ops {
        match *op {
            Op::Schedule(delay) => {
                let due = sched.current_time() + ms(delay);
                let index = scheduled;
                let handle = sched.handle();
                let inner = log.clone();
                sched
                    .schedule(
                        ms(delay),
                        Task::new(move || inner.push((index, due, handle.current_time()))),
                    )
                    .expect("running scheduler accepts work");
                scheduled += 1;
            }
            Op::ScheduleAdvance { delay, delta } => {
                let due = sched.current_time() + ms(delay);
                let index = scheduled;
                let handle = sched.handle();
                let inner = log.clone();
                let nested = Rc::clone(&nested_elapsed);
                sched
                    .schedule(
                        ms(delay),
                        Task::fallible(move || {
                            inner.push((index, due, handle.current_time()));
                            handle.advance_time(ms(delta))?;
                            nested.set(nested.get() + ms(delta));
                            Ok(())
                        }),
                    )
                    .expect("running scheduler accepts work");
                scheduled += 1;
            }
            Op::Advance { delta, step } => {
                sched
                    .advance_time_by_steps(ms(delta), ms(step))
                    .expect("infallible tasks");
                elapsed += ms(delta);
            }
        }
    }
    let clock_after_script = sched.current_time();
    elapsed += nested_elapsed.get();

    // Longer than any delay: everything still queued must run.
    sched.advance_time(ms(1_000)).expect("infallible tasks");

    Outcome {
        observations: log.entries(),
        scheduled,
        clock_after_script,
        elapsed,
    }
}

proptest! {
    #[test]
    fn prop_clock_is_initial_plus_deltas(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let outcome = play(&ops);
        prop_assert_eq!(
            outcome.clock_after_script,
            VirtualTime::from_millis(INITIAL_MS) + outcome.elapsed
        );
    }

    #[test]
    fn prop_runs_in_due_then_enqueue_order(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let outcome = play(&ops);
        let order: Vec<_> = outcome
            .observations
            .iter()
            .map(|&(index, due, _)| (due, index))
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(order, sorted);
    }

    #[test]
    fn prop_every_task_runs_exactly_once(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let outcome = play(&ops);
        let mut indices: Vec<_> = outcome.observations.iter().map(|&(index, _, _)| index).collect();
        indices.sort_unstable();
        let expected: Vec<_> = (0..outcome.scheduled).collect();
        prop_assert_eq!(indices, expected);
    }

    #[test]
    fn prop_tasks_run_within_one_step_of_due(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let outcome = play(&ops);
        for (index, due, ran_at) in outcome.observations {
            prop_assert!(ran_at >= due, "task {} ran at {} before due {}", index, ran_at, due);
            prop_assert!(
                ran_at - due <= ms(MAX_STEP),
                "task {} ran at {}, more than one step after due {}",
                index,
                ran_at,
                due
            );
        }
    }

    #[test]
    fn prop_replay_is_deterministic(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let first = play(&ops);
        let second = play(&ops);
        prop_assert_eq!(first.observations, second.observations);
        prop_assert_eq!(first.clock_after_script, second.clock_after_script);
    }
}
