//! Upload progress accounting.
//!
//! Part uploads settle in arbitrary order in parallel mode, so the completed
//! count lives behind an atomic shared by every in-flight request. The optional
//! reporter callback fires synchronously on each increment, so a caller-driven
//! progress bar sees every step exactly once and in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback receiving `(completed, total)` after each settled part.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Monotonic completed-parts counter shared across in-flight uploads.
pub struct ProgressCounter {
    completed: AtomicU64,
    total: u64,
    reporter: Option<Arc<ProgressFn>>,
}

impl ProgressCounter {
    /// Creates a counter for `total` parts with no reporter.
    pub fn new(total: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            reporter: None,
        }
    }

    /// Creates a counter that invokes `reporter` on each increment.
    pub fn with_reporter(total: u64, reporter: Arc<ProgressFn>) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            reporter: Some(reporter),
        }
    }

    /// Records one settled part and returns the new completed count.
    ///
    /// The reporter (if any) is invoked synchronously with the post-increment
    /// count, so observed values are strictly increasing and never repeat.
    pub fn record_completed(&self) -> u64 {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(done <= self.total, "completed count exceeded total parts");
        if let Some(reporter) = &self.reporter {
            reporter(done, self.total);
        }
        done
    }

    /// Parts settled so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Total parts expected.
    pub fn total(&self) -> u64 {
        self.total
    }
}
