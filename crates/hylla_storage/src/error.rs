//! Error types for storage operations.

use crate::lock::LockMode;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// No node exists at the path.
    #[error("node not found: {path}")]
    NodeNotFound {
        /// Dotted path of the missing node.
        path: String,
    },

    /// A node already exists at the path.
    #[error("node already exists: {path}")]
    NodeExists {
        /// Dotted path of the existing node.
        path: String,
    },

    /// The shelf exists but no record was ever written to it.
    #[error("no record stored at {path}")]
    RecordNotFound {
        /// Dotted path of the shelf.
        path: String,
    },

    /// The node is of the wrong kind for the operation.
    #[error("kind mismatch at {path}: {message}")]
    KindMismatch {
        /// Dotted path of the node.
        path: String,
        /// What was expected.
        message: String,
    },

    /// A lock could not be acquired before the timeout elapsed.
    #[error("timed out acquiring {mode} lock on {path}")]
    LockTimeout {
        /// Dotted path of the contended node.
        path: String,
        /// Requested lock mode.
        mode: LockMode,
    },

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Render a node path for messages. The library root renders as `<library>`.
pub fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<library>".to_string()
    } else {
        path.join(".")
    }
}

impl StorageError {
    /// Create a node-not-found error.
    pub fn node_not_found(path: &[String]) -> Self {
        Self::NodeNotFound {
            path: display_path(path),
        }
    }

    /// Create a node-exists error.
    pub fn node_exists(path: &[String]) -> Self {
        Self::NodeExists {
            path: display_path(path),
        }
    }

    /// Create a kind-mismatch error.
    pub fn kind_mismatch(path: &[String], message: impl Into<String>) -> Self {
        Self::KindMismatch {
            path: display_path(path),
            message: message.into(),
        }
    }
}
