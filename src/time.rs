//! Virtual time for the deterministic scheduler.
//!
//! Time here never comes from the wall clock. It only moves when the test
//! driver advances it, so the same script always observes the same instants.

use std::cell::Cell;
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// An instant on the virtual timeline, measured from the virtual epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualTime(Duration);

impl VirtualTime {
    /// The virtual epoch.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Create an instant `since_epoch` after the virtual epoch.
    #[must_use]
    pub const fn new(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    /// Create an instant `ms` milliseconds after the virtual epoch.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Offset from the virtual epoch.
    #[must_use]
    pub const fn since_epoch(self) -> Duration {
        self.0
    }

    /// Whole milliseconds since the virtual epoch, saturating at `u64::MAX`.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }

    /// Add a delay, or `None` if the result falls off the end of the
    /// timeline.
    #[must_use]
    pub const fn checked_add(self, delay: Duration) -> Option<Self> {
        match self.0.checked_add(delay) {
            Some(offset) => Some(Self(offset)),
            None => None,
        }
    }

    /// Add a delay, saturating at the far end of the timeline.
    #[must_use]
    pub const fn saturating_add(self, delay: Duration) -> Self {
        Self(self.0.saturating_add(delay))
    }
}

impl Add<Duration> for VirtualTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        self.saturating_add(rhs)
    }
}

impl Sub for VirtualTime {
    type Output = Duration;

    /// Elapsed time between two instants; zero if `rhs` is later.
    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}

/// The scheduler's clock.
///
/// Single-threaded by construction: the value lives in a `Cell`, so the
/// clock is `!Sync` and cannot be shared across threads.
#[derive(Debug, Default)]
pub struct VirtualClock {
    current: Cell<VirtualTime>,
}

impl VirtualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub const fn new(start: VirtualTime) -> Self {
        Self {
            current: Cell::new(start),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> VirtualTime {
        self.current.get()
    }

    /// Reset the clock. Only the scheduler's initial-time hook uses this,
    /// before anything has been scheduled.
    pub(crate) fn set(&self, time: VirtualTime) {
        self.current.set(time);
    }

    /// Move the clock forward to `time`. Earlier instants are ignored.
    pub fn advance_to(&self, time: VirtualTime) {
        if time > self.current.get() {
            self.current.set(time);
        }
    }
}
