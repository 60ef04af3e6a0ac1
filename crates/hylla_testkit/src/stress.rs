//! Concurrent workload helpers.

use hylla_core::{CoreResult, Database};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a concurrent run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Operations that succeeded.
    pub successful_ops: usize,
    /// Operations that returned an error.
    pub failed_ops: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressTestResult {
    /// Total operations attempted.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }
}

/// Runs `op(thread_index, op_index)` `ops_per_thread` times on each of
/// `threads` threads against one database.
pub fn run_concurrent<F>(db: &Database, threads: usize, ops_per_thread: usize, op: F) -> StressTestResult
where
    F: Fn(&Database, usize, usize) -> CoreResult<()> + Sync,
{
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..threads {
            let (op, successful, failed) = (&op, &successful, &failed);
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    match op(db, t, i) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(err) => {
                            tracing::debug!(thread = t, op = i, error = %err, "operation failed");
                            failed.fetch_add(1, Ordering::Relaxed)
                        }
                    };
                }
            });
        }
    });

    StressTestResult {
        successful_ops: successful.into_inner(),
        failed_ops: failed.into_inner(),
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{book, path, TestLibrary};
    use hylla_core::BuildShelf;

    #[test]
    fn counts_every_operation() {
        let library = TestLibrary::with_books();
        let result = run_concurrent(&library, 4, 5, |db, t, i| {
            db.execute(
                BuildShelf::new(Some(path("lib")), format!("t{t}_{i}"))
                    .with_data(book("Stress", 2000))
                    .into(),
            )
            .map(|_| ())
        });
        assert_eq!(result.total_ops(), 20);
        assert_eq!(result.successful_ops, 20);
    }
}
