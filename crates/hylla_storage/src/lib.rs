//! # Hylla Storage
//!
//! Storage backend trait and implementations for Hylla.
//!
//! This crate is the narrow interface between the query core and whatever
//! persists the namespace. Backends store a tree of sections and shelves
//! and one **opaque byte record** per shelf; they never interpret records.
//!
//! ## Design Principles
//!
//! - Six operations: read/write a record, list/create/delete nodes, lock
//! - No knowledge of schemas, filters, or the record encoding
//! - Must be `Send + Sync` for concurrent access
//! - Locks are per path; the core composes them hierarchically
//!
//! ## Available Backends
//!
//! - [`InMemoryStorage`] - For testing and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use hylla_storage::{InMemoryStorage, LockMode, NodeKind, StorageBackend};
//! use std::time::Duration;
//!
//! let storage = InMemoryStorage::new();
//! storage.create_node(&[], "lib", NodeKind::Section).unwrap();
//!
//! let lib = vec!["lib".to_string()];
//! let guard = storage
//!     .acquire_lock(&lib, LockMode::Shared, Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(storage.list_children(&lib).unwrap().len(), 0);
//! drop(guard);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod lock;
mod memory;

pub use backend::{ChildEntry, NodeKind, StorageBackend};
pub use error::{display_path, StorageError, StorageResult};
pub use lock::{LockGuard, LockMode, LockTable};
pub use memory::{InMemoryStorage, NodeSnapshot};
