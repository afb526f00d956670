//! Start/stop lifecycle of the scheduler.

use crate::error::{Error, Result};
use std::fmt;

/// Scheduler lifecycle: `Idle -> Running -> Stopped`.
///
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Started; due work runs when time advances.
    Running,
    /// Stopped; queued work has been discarded.
    Stopped,
}

impl RunState {
    /// Transition `Idle -> Running`.
    pub fn start(self) -> Result<Self> {
        match self {
            Self::Idle => Ok(Self::Running),
            Self::Running => Err(Error::AlreadyStarted),
            Self::Stopped => Err(Error::StartAfterStop),
        }
    }

    /// Transition to `Stopped` from any state.
    #[must_use]
    pub const fn stop(self) -> Self {
        Self::Stopped
    }

    /// Whether the scheduler is running.
    #[must_use]
    pub const fn is_started(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the scheduler has been stopped.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Lower-case name, as used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
