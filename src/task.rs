//! Units of work and the time-ordered work queue.
//!
//! Entries are ordered by `(due_time, seq)` ascending. Two entries due at the
//! same instant run in the order they were enqueued, whatever call depth
//! enqueued them.

use crate::time::VirtualTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Monotonically increasing sequence counter for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(u64);

impl Seq {
    /// Create the initial sequence value.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the next sequence value, or `None` once the counter is exhausted.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

type Work = Box<dyn FnOnce() -> anyhow::Result<()>>;

const ANONYMOUS: &str = "anonymous";

/// An opaque unit of work.
///
/// Owned by the caller until handed to `schedule`, then by its queue entry
/// until it runs (consumed) or the scheduler stops (dropped, never run).
pub struct Task {
    label: Option<String>,
    work: Work,
}

impl Task {
    /// Wrap an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self::fallible(move || {
            f();
            Ok(())
        })
    }

    /// Wrap a closure whose failure should abort the current time advance.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        Self {
            label: None,
            work: Box::new(f),
        }
    }

    /// Attach a label used in log events and error messages.
    #[must_use]
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The task's label, or `"anonymous"`.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(ANONYMOUS)
    }

    pub(crate) fn run(self) -> Result<(), TaskFailure> {
        let Self { label, work } = self;
        work().map_err(|source| TaskFailure {
            label: label.unwrap_or_else(|| ANONYMOUS.to_string()),
            source,
        })
    }
}

/// A task's error together with the label of the task that raised it.
#[derive(Debug)]
pub(crate) struct TaskFailure {
    pub label: String,
    pub source: anyhow::Error,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label())
            .finish_non_exhaustive()
    }
}

/// A queue entry: a task plus the instant it becomes runnable.
#[derive(Debug)]
pub struct ScheduledTask {
    /// Virtual instant at which the task becomes eligible to run.
    pub due_time: VirtualTime,
    /// Enqueue order, used only to break due-time ties.
    pub seq: Seq,
    /// The work itself.
    pub task: Task,
}

impl ScheduledTask {
    /// Create a new queue entry.
    #[must_use]
    pub const fn new(due_time: VirtualTime, seq: Seq, task: Task) -> Self {
        Self {
            due_time,
            seq,
            task,
        }
    }
}

// Order by (due_time, seq) ascending - min-heap needs reversed comparison.
impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due_time == other.due_time && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap: earlier due/seq = higher priority
        match other.due_time.cmp(&self.due_time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Pending tasks, earliest due first.
#[derive(Debug)]
pub struct WorkQueue {
    heap: BinaryHeap<ScheduledTask>,
    next_seq: Seq,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: Seq::zero(),
        }
    }

    /// Enqueue `task` to run at `due_time`, returning its sequence id.
    ///
    /// # Panics
    ///
    /// Panics once `u64::MAX` sequence ids have been issued.
    pub fn push(&mut self, due_time: VirtualTime, task: Task) -> Seq {
        let seq = self.next_seq;
        self.next_seq = seq.next().expect("sequence ids exhausted");
        self.heap.push(ScheduledTask::new(due_time, seq, task));
        seq
    }

    /// Pop the head entry if it is due at or before `now`.
    pub fn pop_due(&mut self, now: VirtualTime) -> Option<ScheduledTask> {
        if self.heap.peek()?.due_time > now {
            return None;
        }
        self.heap.pop()
    }

    /// Due time of the head entry.
    #[must_use]
    pub fn next_due_time(&self) -> Option<VirtualTime> {
        self.heap.peek().map(|entry| entry.due_time)
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether any sequence id has ever been issued.
    #[must_use]
    pub fn has_scheduled(&self) -> bool {
        self.next_seq != Seq::zero()
    }

    /// Remove every pending entry. The sequence counter keeps counting.
    ///
    /// The entries are handed back so the caller can drop them once it no
    /// longer holds a borrow of the queue.
    pub fn take_pending(&mut self) -> BinaryHeap<ScheduledTask> {
        std::mem::take(&mut self.heap)
    }
}
