//! Common test infrastructure for the deterministic scheduler.
//!
//! - Once-per-process `tracing` subscriber honouring `RUST_LOG`
//! - An execution log that tasks append to, for asserting run order

#![allow(dead_code)]

use detsched::Task;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Shorthand for millisecond durations.
pub const fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Ordered record of what ran, shared between tasks and the test body.
#[derive(Debug)]
pub struct ExecutionLog<T> {
    entries: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for ExecutionLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
        }
    }
}

impl<T> Default for ExecutionLog<T> {
    fn default() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: Clone + 'static> ExecutionLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        self.entries.borrow_mut().push(value);
    }

    pub fn entries(&self) -> Vec<T> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// A task that appends `value` when it runs.
    pub fn recorder(&self, value: T) -> Task {
        let log = self.clone();
        Task::new(move || log.push(value))
    }
}
