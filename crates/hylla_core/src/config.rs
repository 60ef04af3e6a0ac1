//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an operation waits for a contended lock before failing
    /// with `LockTimeout`.
    pub lock_timeout: Duration,

    /// Maximum nesting depth of filter groups.
    pub max_filter_depth: usize,

    /// Maximum number of operations in one transaction.
    pub max_transaction_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            max_filter_depth: 32,
            max_transaction_len: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock wait timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the maximum filter nesting depth.
    #[must_use]
    pub const fn max_filter_depth(mut self, depth: usize) -> Self {
        self.max_filter_depth = depth;
        self
    }

    /// Sets the maximum transaction length.
    #[must_use]
    pub const fn max_transaction_len(mut self, len: usize) -> Self {
        self.max_transaction_len = len;
        self
    }
}
