//! Deterministic virtual-time scheduler.
//!
//! Drop-in replacement for the production scheduler when testing a client
//! library:
//! - Time only moves when the test driver calls `advance_time`
//! - Queued work runs synchronously on the caller's thread
//! - Ordering is total: by due time, then by enqueue order
//!
//! # Invariants
//!
//! - **single thread:** all state lives in `Cell`/`RefCell` behind an `Rc`;
//!   the scheduler is `!Send` and needs no locks
//! - **stable ties:** tasks with equal due times run in increasing seq order
//! - **no synchronous run:** `schedule` only enqueues, even with zero delay
//! - **bounded steps:** time advances in increments no larger than the step,
//!   draining due work after each increment
//! - **no drain on shutdown:** `stop` discards pending work unrun

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::run_state::RunState;
use crate::task::{ScheduledTask, Task, WorkQueue};
use crate::time::{VirtualClock, VirtualTime};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// The resource bundle a scheduler may be attached to (logger, storage,
/// network in the consuming library).
pub trait SystemResources: fmt::Debug {
    /// Short description for log events.
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// The scheduling interface the client library programs against.
pub trait Scheduler {
    /// Run `task` once `delay` of virtual time has passed.
    ///
    /// Never runs the task synchronously, even with a zero delay.
    fn schedule(&self, delay: Duration, task: Task) -> Result<()>;

    /// Current virtual time.
    fn current_time(&self) -> VirtualTime;

    /// Whether the caller is executing inside a drain of this scheduler.
    fn is_running_on_thread(&self) -> bool;

    /// Attach the resource bundle the scheduler belongs to.
    fn set_system_resources(&self, resources: &dyn SystemResources);
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Sets the draining flag for the duration of one task invocation and
/// restores the previous value on every exit path, unwinding included.
struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> DrainGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// State shared by the owning scheduler and its handles.
struct Core {
    clock: VirtualClock,
    queue: RefCell<WorkQueue>,
    state: Cell<RunState>,
    draining: Cell<bool>,
    tasks_run: Cell<u64>,
    default_step: Duration,
}

impl Core {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            clock: VirtualClock::new(config.initial_time()),
            queue: RefCell::new(WorkQueue::new()),
            state: Cell::new(RunState::Idle),
            draining: Cell::new(false),
            tasks_run: Cell::new(0),
            default_step: config.default_step(),
        }
    }

    fn schedule(&self, delay: Duration, task: Task) -> Result<()> {
        if self.state.get().is_stopped() {
            tracing::warn!(
                event = "scheduler.task.rejected",
                label = task.label(),
                delay_ms = millis(delay),
                "Task scheduled on a stopped scheduler; dropping it"
            );
            return Err(Error::scheduler_stopped(task.label()));
        }

        let now = self.clock.now();
        let due_time = now
            .checked_add(delay)
            .ok_or(Error::TimeOverflow { now, delta: delay })?;
        let seq = self.queue.borrow_mut().push(due_time, task);

        tracing::trace!(
            event = "scheduler.task.schedule",
            %seq,
            delay_ms = millis(delay),
            due = %due_time,
            now = %now,
            "Task scheduled"
        );
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let next = self.state.get().start()?;
        self.state.set(next);
        tracing::debug!(
            event = "scheduler.lifecycle.start",
            now = %self.clock.now(),
            pending = self.queue.borrow().len(),
            "Scheduler started"
        );
        Ok(())
    }

    fn stop(&self) -> usize {
        let previous = self.state.replace(self.state.get().stop());
        // Release the queue borrow before dropping tasks: their destructors
        // may call back into the scheduler.
        let pending = self.queue.borrow_mut().take_pending();
        let discarded = pending.len();
        drop(pending);

        if !previous.is_stopped() {
            tracing::debug!(
                event = "scheduler.lifecycle.stop",
                from = %previous,
                now = %self.clock.now(),
                discarded,
                tasks_run = self.tasks_run.get(),
                "Scheduler stopped"
            );
        }
        discarded
    }

    fn set_initial_time(&self, time: VirtualTime) -> Result<()> {
        if self.state.get() != RunState::Idle {
            return Err(Error::InitialTimeAfterStart);
        }
        if self.queue.borrow().has_scheduled() {
            return Err(Error::InitialTimeAfterSchedule);
        }
        self.clock.set(time);
        tracing::debug!(event = "scheduler.time.initial", now = %time, "Initial time set");
        Ok(())
    }

    /// Pop the next task if the scheduler is running and the task is due.
    fn pop_ready(&self) -> Option<ScheduledTask> {
        if !self.state.get().is_started() {
            return None;
        }
        self.queue.borrow_mut().pop_due(self.clock.now())
    }

    /// Run every task due at the current time, including tasks enqueued by
    /// the tasks being run. Returns how many ran.
    fn run_ready_tasks(&self) -> Result<usize> {
        let mut ran = 0;
        while let Some(ScheduledTask {
            due_time,
            seq,
            task,
        }) = self.pop_ready()
        {
            tracing::trace!(
                event = "scheduler.task.run",
                %seq,
                label = task.label(),
                due = %due_time,
                now = %self.clock.now(),
                "Running task"
            );

            let outcome = {
                let _guard = DrainGuard::enter(&self.draining);
                task.run()
            };
            self.tasks_run.set(self.tasks_run.get() + 1);

            if let Err(failure) = outcome {
                tracing::warn!(
                    event = "scheduler.task.failed",
                    %seq,
                    label = %failure.label,
                    due = %due_time,
                    error = %failure.source,
                    "Task failed; aborting time advance"
                );
                return Err(Error::Task {
                    seq,
                    label: failure.label,
                    due_time,
                    source: failure.source,
                });
            }
            ran += 1;
        }
        Ok(ran)
    }

    fn advance(&self, delta: Duration, step: Duration) -> Result<()> {
        if step.is_zero() {
            return Err(Error::InvalidStep);
        }
        let state = self.state.get();
        if state == RunState::Idle {
            return Err(Error::NotStarted);
        }

        let start = self.clock.now();
        let target = start
            .checked_add(delta)
            .ok_or(Error::TimeOverflow { now: start, delta })?;
        tracing::debug!(
            event = "scheduler.time.advance",
            from = %start,
            to = %target,
            step_ms = millis(step),
            state = %state,
            "Advancing virtual time"
        );

        // Count down what is left rather than aiming at `target`: a task that
        // advances time reentrantly adds its delta on top of this one.
        let mut remaining = delta;
        while !remaining.is_zero() {
            let increment = step.min(remaining);
            let now = self.clock.now();
            let boundary = now.checked_add(increment).ok_or(Error::TimeOverflow {
                now,
                delta: remaining,
            })?;
            self.clock.advance_to(boundary);
            remaining -= increment;
            let ran = self.run_ready_tasks()?;
            tracing::trace!(
                event = "scheduler.time.step",
                now = %boundary,
                ran,
                "Time step drained"
            );
        }
        Ok(())
    }

    fn set_system_resources(&self, resources: &dyn SystemResources) {
        tracing::trace!(
            event = "scheduler.resources.attach",
            resources = %resources.describe(),
            "System resources attached; nothing to do"
        );
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("DeterministicScheduler")
            .field("now", &self.clock.now())
            .field("state", &self.state.get())
            .field("pending", &queue.len())
            .field("next_due", &queue.next_due_time())
            .field("draining", &self.draining.get())
            .field("tasks_run", &self.tasks_run.get())
            .finish_non_exhaustive()
    }
}

/// A scheduler whose clock is driven by the test.
///
/// Owns the scheduler: dropping it stops the scheduler and discards any
/// pending work. Tasks that need to schedule follow-up work capture a
/// [`SchedulerHandle`] from [`DeterministicScheduler::handle`].
///
/// # Example
///
/// ```
/// use detsched::{DeterministicScheduler, Scheduler, Task};
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let sched = DeterministicScheduler::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// sched.start().unwrap();
/// for (name, delay) in [("a", 100), ("b", 50)] {
///     let log = Rc::clone(&log);
///     sched
///         .schedule(Duration::from_millis(delay), Task::new(move || log.borrow_mut().push(name)))
///         .unwrap();
/// }
/// sched.advance_time(Duration::from_millis(200)).unwrap();
///
/// assert_eq!(*log.borrow(), ["b", "a"]);
/// assert_eq!(sched.current_time().as_millis(), 200);
/// ```
pub struct DeterministicScheduler {
    core: Rc<Core>,
}

impl fmt::Debug for DeterministicScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

impl Default for DeterministicScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicScheduler {
    /// Create a scheduler with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(Core::new(&SchedulerConfig::default())),
        }
    }

    /// Create a scheduler from a validated configuration.
    pub fn with_config(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: Rc::new(Core::new(config)),
        })
    }

    /// A cloneable handle for tasks that schedule further work.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            core: Rc::clone(&self.core),
        }
    }

    /// Transition `Idle -> Running`.
    pub fn start(&self) -> Result<()> {
        self.core.start()
    }

    /// Stop the scheduler. Idempotent.
    ///
    /// Every task still queued is discarded without running; pending
    /// callbacks do **not** fire on shutdown. Returns how many were
    /// discarded.
    pub fn stop(&self) -> usize {
        self.core.stop()
    }

    /// Reset the virtual clock. Only allowed before `start` and before
    /// anything has been scheduled.
    pub fn set_initial_time(&self, time: VirtualTime) -> Result<()> {
        self.core.set_initial_time(time)
    }

    /// Pass `delta` of virtual time in default-sized steps, running every
    /// task that becomes due.
    pub fn advance_time(&self, delta: Duration) -> Result<()> {
        self.core.advance(delta, self.core.default_step)
    }

    /// Pass `delta` of virtual time in increments of at most `step`, running
    /// every task that becomes due after each increment.
    ///
    /// A failing task aborts the whole call: later tasks and later steps do
    /// not run, and the clock stays where the failure happened.
    pub fn advance_time_by_steps(&self, delta: Duration, step: Duration) -> Result<()> {
        self.core.advance(delta, step)
    }

    /// Whether the scheduler is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.core.state.get().is_started()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.core.state.get()
    }

    /// The step `advance_time` uses.
    #[must_use]
    pub fn default_step(&self) -> Duration {
        self.core.default_step
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.core.queue.borrow().len()
    }

    /// Due time of the earliest queued task.
    #[must_use]
    pub fn next_due_time(&self) -> Option<VirtualTime> {
        self.core.queue.borrow().next_due_time()
    }

    /// Total tasks invoked so far, failed ones included.
    #[must_use]
    pub fn tasks_run(&self) -> u64 {
        self.core.tasks_run.get()
    }
}

impl Scheduler for DeterministicScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> Result<()> {
        self.core.schedule(delay, task)
    }

    fn current_time(&self) -> VirtualTime {
        self.core.clock.now()
    }

    fn is_running_on_thread(&self) -> bool {
        self.core.draining.get()
    }

    fn set_system_resources(&self, resources: &dyn SystemResources) {
        self.core.set_system_resources(resources);
    }
}

impl Drop for DeterministicScheduler {
    fn drop(&mut self) {
        self.core.stop();
    }
}

/// Shared handle to a [`DeterministicScheduler`].
///
/// Does not keep the scheduler alive in any useful sense: once the owner is
/// stopped or dropped, scheduling through a handle fails with
/// [`Error::SchedulerStopped`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    core: Rc<Core>,
}

impl SchedulerHandle {
    /// Whether the scheduler is running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.core.state.get().is_started()
    }

    /// Stop the scheduler from inside a task. Same semantics as
    /// [`DeterministicScheduler::stop`].
    pub fn stop(&self) -> usize {
        self.core.stop()
    }

    /// Pass `delta` of virtual time from inside a task.
    pub fn advance_time(&self, delta: Duration) -> Result<()> {
        self.core.advance(delta, self.core.default_step)
    }
}

impl Scheduler for SchedulerHandle {
    fn schedule(&self, delay: Duration, task: Task) -> Result<()> {
        self.core.schedule(delay, task)
    }

    fn current_time(&self) -> VirtualTime {
        self.core.clock.now()
    }

    fn is_running_on_thread(&self) -> bool {
        self.core.draining.get()
    }

    fn set_system_resources(&self, resources: &dyn SystemResources) {
        self.core.set_system_resources(resources);
    }
}
