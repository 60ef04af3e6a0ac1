//! Shared/exclusive path locks with bounded waits.

use crate::error::{display_path, StorageError, StorageResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock mode requested on a node path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    /// Many holders at once; excludes writers.
    Shared,
    /// A single holder; excludes everyone else.
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        })
    }
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

impl LockState {
    fn admits(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.writer,
            LockMode::Exclusive => !self.writer && self.readers == 0,
        }
    }

    fn is_idle(&self) -> bool {
        !self.writer && self.readers == 0
    }
}

/// Table of per-path locks.
///
/// Locks are keyed by the path alone, so a lock can be taken on a node
/// that does not exist yet. Paths are independent: holding a lock on a
/// section says nothing about its children. Callers that need
/// hierarchical exclusion lock the ancestors themselves.
///
/// Locks are not reentrant. Acquiring the same path twice from one thread
/// in exclusive mode waits for the timeout.
pub struct LockTable {
    state: Mutex<HashMap<Vec<String>, LockState>>,
    released: Condvar,
}

impl LockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Acquires a lock, waiting at most `timeout` for conflicting holders
    /// to release.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockTimeout`] if the lock is still contended
    /// at the deadline.
    pub fn acquire(
        self: &Arc<Self>,
        path: &[String],
        mode: LockMode,
        timeout: Duration,
    ) -> StorageResult<LockGuard> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            let admitted = state.get(path).map_or(true, |s| s.admits(mode));
            if admitted {
                let entry = state.entry(path.to_vec()).or_default();
                match mode {
                    LockMode::Shared => entry.readers += 1,
                    LockMode::Exclusive => entry.writer = true,
                }
                tracing::trace!(path = %display_path(path), %mode, "lock acquired");
                return Ok(LockGuard {
                    table: Arc::clone(self),
                    path: path.to_vec(),
                    mode,
                });
            }
            if self.released.wait_until(&mut state, deadline).timed_out()
                && !state.get(path).map_or(true, |s| s.admits(mode))
            {
                tracing::warn!(path = %display_path(path), %mode, "lock wait timed out");
                return Err(StorageError::LockTimeout {
                    path: display_path(path),
                    mode,
                });
            }
        }
    }

    /// Number of paths with at least one holder.
    pub fn active_locks(&self) -> usize {
        self.state.lock().len()
    }

    fn release(&self, path: &[String], mode: LockMode) {
        let mut state = self.state.lock();
        if let Some(entry) = state.get_mut(path) {
            match mode {
                LockMode::Shared => entry.readers = entry.readers.saturating_sub(1),
                LockMode::Exclusive => entry.writer = false,
            }
            if entry.is_idle() {
                state.remove(path);
            }
        }
        drop(state);
        self.released.notify_all();
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("active_locks", &self.active_locks())
            .finish()
    }
}

/// A held lock. Released on drop.
pub struct LockGuard {
    table: Arc<LockTable>,
    path: Vec<String>,
    mode: LockMode,
}

impl LockGuard {
    /// The locked path.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The held mode.
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &display_path(&self.path))
            .field("mode", &self.mode)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.table.release(&self.path, self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn path(s: &str) -> Vec<String> {
        s.split('.').map(String::from).collect()
    }

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn shared_locks_coexist() {
        let table = Arc::new(LockTable::new());
        let a = table.acquire(&path("lib"), LockMode::Shared, SHORT).unwrap();
        let b = table.acquire(&path("lib"), LockMode::Shared, SHORT).unwrap();
        assert_eq!(table.active_locks(), 1);
        drop(a);
        drop(b);
        assert_eq!(table.active_locks(), 0);
    }

    #[test]
    fn exclusive_excludes_shared() {
        let table = Arc::new(LockTable::new());
        let _w = table.acquire(&path("lib"), LockMode::Exclusive, SHORT).unwrap();
        let err = table.acquire(&path("lib"), LockMode::Shared, SHORT).unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));
    }

    #[test]
    fn shared_excludes_exclusive() {
        let table = Arc::new(LockTable::new());
        let _r = table.acquire(&path("lib"), LockMode::Shared, SHORT).unwrap();
        let err = table
            .acquire(&path("lib"), LockMode::Exclusive, SHORT)
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::LockTimeout {
                path: "lib".to_string(),
                mode: LockMode::Exclusive
            }
        );
    }

    #[test]
    fn distinct_paths_do_not_conflict() {
        let table = Arc::new(LockTable::new());
        let _a = table.acquire(&path("lib.a"), LockMode::Exclusive, SHORT).unwrap();
        let _b = table.acquire(&path("lib.b"), LockMode::Exclusive, SHORT).unwrap();
        let _root = table.acquire(&[], LockMode::Exclusive, SHORT).unwrap();
        assert_eq!(table.active_locks(), 3);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let table = Arc::new(LockTable::new());
        let held = table.acquire(&path("lib"), LockMode::Exclusive, SHORT).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                table
                    .acquire(&path("lib"), LockMode::Exclusive, Duration::from_secs(5))
                    .map(|guard| guard.mode())
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert_eq!(waiter.join().unwrap().unwrap(), LockMode::Exclusive);
        assert_eq!(table.active_locks(), 0);
    }
}
