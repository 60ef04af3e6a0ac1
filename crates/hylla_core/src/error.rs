//! Error types for Hylla core.

use hylla_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Hylla core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] hylla_codec::CodecError),

    /// A path string could not be parsed.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending input.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A path names a node or key that does not exist.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The unresolved path.
        path: String,
    },

    /// A path addresses the wrong kind of node or value.
    #[error("type mismatch at {path}: {message}")]
    TypeMismatch {
        /// Path where the mismatch was found.
        path: String,
        /// What was expected and what was found.
        message: String,
    },

    /// A node or key already exists.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// Path of the existing node or key.
        path: String,
    },

    /// The target of a mutation does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// Path of the missing target.
        path: String,
    },

    /// A record does not conform to its governing schema.
    #[error("schema violation against {schema}: {}", .violations.join("; "))]
    SchemaViolation {
        /// Name of the governing schema.
        schema: String,
        /// One entry per violated field.
        violations: Vec<String>,
    },

    /// A schema definition is itself invalid.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// A filter violates the condition/connective grammar.
    #[error("malformed filter: {message}")]
    MalformedFilter {
        /// Description of the problem.
        message: String,
    },

    /// An operator was applied to operands it cannot compare.
    #[error("operator {operator} cannot compare {left} with {right}")]
    OperatorTypeError {
        /// The operator.
        operator: String,
        /// Kind of the left operand.
        left: String,
        /// Kind of the right operand.
        right: String,
    },

    /// A query's fields are inconsistent with each other.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A lock could not be acquired in time.
    #[error("lock timeout on {path}")]
    LockTimeout {
        /// Path of the contended node.
        path: String,
    },

    /// A transaction was rolled back because one of its operations failed.
    #[error("transaction aborted at operation {index}: {source}")]
    TransactionAborted {
        /// Zero-based index of the failing operation.
        index: usize,
        /// The operation's error.
        #[source]
        source: Box<CoreError>,
    },
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NodeNotFound { path } => Self::PathNotFound { path },
            StorageError::NodeExists { path } => Self::AlreadyExists { path },
            StorageError::LockTimeout { path, .. } => Self::LockTimeout { path },
            other => Self::Storage(other),
        }
    }
}

impl CoreError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a path not found error.
    pub fn path_not_found(path: impl ToString) -> Self {
        Self::PathNotFound {
            path: path.to_string(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(path: impl ToString, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(path: impl ToString) -> Self {
        Self::AlreadyExists {
            path: path.to_string(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a malformed filter error.
    pub fn malformed_filter(message: impl Into<String>) -> Self {
        Self::MalformedFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Wraps the failure of the transaction operation at `index`.
    pub fn transaction_aborted(index: usize, source: CoreError) -> Self {
        Self::TransactionAborted {
            index,
            source: Box::new(source),
        }
    }

    /// Turns a resolution failure into the error mutations report for an
    /// absent target.
    #[must_use]
    pub fn into_not_found(self) -> Self {
        match self {
            Self::PathNotFound { path } => Self::NotFound { path },
            other => other,
        }
    }
}
