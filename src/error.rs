//! Error types for the deterministic scheduler.

use crate::task::Seq;
use crate::time::VirtualTime;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scheduler.
#[derive(Error, Debug)]
pub enum Error {
    /// `start` called on a scheduler that is already running.
    #[error("Lifecycle error: scheduler already started")]
    AlreadyStarted,

    /// `start` called after `stop`; `Stopped` is terminal.
    #[error("Lifecycle error: scheduler cannot be restarted after stop")]
    StartAfterStop,

    /// Time advanced before the scheduler was started.
    #[error("Lifecycle error: scheduler not started")]
    NotStarted,

    /// `set_initial_time` called once the scheduler left `Idle`.
    #[error("Lifecycle error: initial time can only be set before start")]
    InitialTimeAfterStart,

    /// `set_initial_time` called after work was already queued.
    #[error("Lifecycle error: initial time can only be set before any task is scheduled")]
    InitialTimeAfterSchedule,

    /// Work handed to a stopped scheduler. The task is dropped, never run.
    #[error("Scheduler stopped: cannot schedule {label}")]
    SchedulerStopped { label: String },

    /// Time advancement with a zero-length step.
    #[error("Invalid step: time must advance by a positive step")]
    InvalidStep,

    /// A delay or advance that would run past the end of the virtual
    /// timeline.
    #[error("Time overflow: {now} + {delta:?} is past the end of the virtual timeline")]
    TimeOverflow { now: VirtualTime, delta: Duration },

    /// A queued task failed while draining.
    #[error("Task {seq} ({label}) due at {due_time} failed: {source}")]
    Task {
        seq: Seq,
        label: String,
        due_time: VirtualTime,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a scheduling-after-stop error for the given task label.
    pub fn scheduler_stopped(label: impl Into<String>) -> Self {
        Self::SchedulerStopped {
            label: label.into(),
        }
    }

    /// Whether this error is a programming error in the test driver
    /// (lifecycle misuse rather than a task fault).
    pub const fn is_lifecycle_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted
                | Self::StartAfterStop
                | Self::NotStarted
                | Self::InitialTimeAfterStart
                | Self::InitialTimeAfterSchedule
                | Self::InvalidStep
                | Self::TimeOverflow { .. }
        )
    }

    /// Whether this error was raised by a queued task.
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::Task { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
