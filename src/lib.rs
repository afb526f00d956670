//! Deterministic virtual-time task scheduler.
//!
//! A test-only implementation of the [`Scheduler`] interface used by
//! event-driven client libraries. Instead of a real clock and thread pool:
//! - Virtual time moves only when the test driver advances it
//! - Queued work runs synchronously, on the driver's thread, in a strict
//!   `(due time, enqueue order)` order
//! - Identical scripts produce identical executions, every run
//!
//! ## Usage
//!
//! ```
//! use detsched::{DeterministicScheduler, Scheduler, Task};
//! use std::time::Duration;
//!
//! let sched = DeterministicScheduler::new();
//! sched.start()?;
//!
//! let handle = sched.handle();
//! sched.schedule(
//!     Duration::ZERO,
//!     Task::fallible(move || {
//!         // Follow-up work is scheduled relative to the advanced clock.
//!         handle.schedule(Duration::from_millis(5), Task::new(|| {}).named("follow-up"))?;
//!         Ok(())
//!     })
//!     .named("kickoff"),
//! )?;
//!
//! sched.advance_time(Duration::from_millis(20))?;
//! assert_eq!(sched.tasks_run(), 2);
//! # Ok::<(), detsched::Error>(())
//! ```
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod error;
pub mod run_state;
pub mod scheduler;
pub mod task;
pub mod time;

pub use config::{DEFAULT_STEP, SchedulerConfig};
pub use error::{Error, Result};
pub use run_state::RunState;
pub use scheduler::{DeterministicScheduler, Scheduler, SchedulerHandle, SystemResources};
pub use task::{Seq, Task};
pub use time::{VirtualClock, VirtualTime};
