//! Lock footprints: the set of node locks an operation needs.

use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use hylla_storage::{LockGuard, LockMode, StorageBackend, StorageError};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Node paths mapped to the lock mode each needs.
///
/// Iteration is in ascending path order, ancestors before descendants.
/// Every acquirer follows that order, which rules out lock-order cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    locks: BTreeMap<Path, LockMode>,
}

impl Footprint {
    /// An empty footprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `node`: shared on it and on every ancestor.
    pub fn shared(&mut self, node: &Path) {
        self.ancestors(node);
        self.add(node.clone(), LockMode::Shared);
    }

    /// Mutates `node`: exclusive on it, shared on every ancestor.
    pub fn exclusive(&mut self, node: &Path) {
        self.ancestors(node);
        self.add(node.clone(), LockMode::Exclusive);
    }

    /// Adds `node` in `mode` with shared ancestors.
    pub fn lock(&mut self, node: &Path, mode: LockMode) {
        match mode {
            LockMode::Shared => self.shared(node),
            LockMode::Exclusive => self.exclusive(node),
        }
    }

    /// Unions another footprint into this one. Exclusive wins.
    pub fn merge(&mut self, other: Footprint) {
        for (path, mode) in other.locks {
            self.add(path, mode);
        }
    }

    /// True if every lock in `other` is held here at least as strongly.
    pub fn covers(&self, other: &Footprint) -> bool {
        other
            .locks
            .iter()
            .all(|(path, mode)| self.locks.get(path).is_some_and(|held| held >= mode))
    }

    /// The mode recorded for `node`.
    pub fn mode(&self, node: &Path) -> Option<LockMode> {
        self.locks.get(node).copied()
    }

    /// Number of locked paths.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if nothing is locked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Locked paths and modes in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, LockMode)> {
        self.locks.iter().map(|(path, mode)| (path, *mode))
    }

    fn ancestors(&mut self, node: &Path) {
        for ancestor in node.ancestors() {
            self.add(ancestor, LockMode::Shared);
        }
    }

    fn add(&mut self, path: Path, mode: LockMode) {
        let entry = self.locks.entry(path).or_insert(mode);
        if mode > *entry {
            *entry = mode;
        }
    }
}

/// Locks held for one operation or transaction. Dropping releases them.
#[must_use = "locks are released when the set is dropped"]
#[derive(Debug)]
pub struct HeldLocks {
    footprint: Footprint,
    _guards: Vec<LockGuard>,
}

impl HeldLocks {
    /// The footprint these guards cover.
    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }
}

/// Acquires the footprint produced by `compute`, in path order, within
/// `timeout`.
///
/// Footprints are computed from the namespace as it looks before locking,
/// so once everything is held the footprint is computed again. If the
/// namespace changed in a way that needs locks not yet held, everything is
/// released and the closure's new footprint is tried instead.
///
/// # Errors
///
/// Returns `LockTimeout` if the locks cannot all be held before the
/// deadline.
pub fn acquire<F>(storage: &dyn StorageBackend, timeout: Duration, compute: F) -> CoreResult<HeldLocks>
where
    F: Fn() -> Footprint,
{
    let deadline = Instant::now() + timeout;
    let mut footprint = compute();
    loop {
        let mut guards = Vec::with_capacity(footprint.len());
        for (path, mode) in footprint.iter() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match storage.acquire_lock(path.segments(), mode, remaining) {
                Ok(guard) => guards.push(guard),
                Err(StorageError::LockTimeout { .. }) => {
                    warn!(path = %path, mode = %mode, "lock wait timed out");
                    return Err(CoreError::LockTimeout {
                        path: path.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        let current = compute();
        if footprint.covers(&current) {
            trace!(locks = guards.len(), "footprint held");
            return Ok(HeldLocks {
                footprint,
                _guards: guards,
            });
        }
        drop(guards);
        trace!("namespace changed while locking, retrying");
        if Instant::now() >= deadline {
            let path = current
                .iter()
                .find(|(path, mode)| footprint.mode(path).map_or(true, |held| held < *mode))
                .map_or_else(|| "<footprint>".to_string(), |(path, _)| path.to_string());
            return Err(CoreError::LockTimeout { path });
        }
        footprint.merge(current);
    }
}
