//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::lock::{LockGuard, LockMode};
use std::fmt;
use std::time::Duration;

/// Kind of a namespace node below the library root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// Internal node holding sections and shelves.
    Section,
    /// Leaf node holding one record.
    Shelf,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Section => "section",
            NodeKind::Shelf => "shelf",
        })
    }
}

/// One entry returned by [`StorageBackend::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// Child name (a single path segment).
    pub name: String,
    /// Child kind.
    pub kind: NodeKind,
}

/// Storage backend for the Hylla namespace.
///
/// Backends store a tree of named nodes and an **opaque byte record** per
/// shelf. They do not interpret records, schemas, or filters; the core owns
/// all of that.
///
/// Node paths are slices of segment names. The empty slice addresses the
/// library root, which always exists.
///
/// # Invariants
///
/// - `read_record` returns exactly the bytes last passed to `write_record`
/// - `list_children` is ordered by name
/// - `delete_node` removes the node and everything below it
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStorage`] - For testing and embedding
pub trait StorageBackend: Send + Sync {
    /// Reads the record stored at a shelf.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No node exists at `shelf`
    /// - The node is not a shelf
    /// - No record was ever written to the shelf
    fn read_record(&self, shelf: &[String]) -> StorageResult<Vec<u8>>;

    /// Overwrites the record stored at a shelf.
    ///
    /// # Errors
    ///
    /// Returns an error if no shelf exists at `shelf`.
    fn write_record(&self, shelf: &[String], record: &[u8]) -> StorageResult<()>;

    /// Lists the direct children of a library or section node.
    ///
    /// # Errors
    ///
    /// Returns an error if no container node exists at `node`.
    fn list_children(&self, node: &[String]) -> StorageResult<Vec<ChildEntry>>;

    /// Creates a child node under a library or section node.
    ///
    /// A new shelf holds no record until one is written.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent does not exist or is a shelf
    /// - A sibling with the same name already exists
    fn create_node(&self, parent: &[String], name: &str, kind: NodeKind) -> StorageResult<()>;

    /// Deletes a node and its whole subtree.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist or is the library root.
    fn delete_node(&self, node: &[String]) -> StorageResult<()>;

    /// Acquires a lock on a node path, waiting at most `timeout`.
    ///
    /// The lock is held until the returned guard is dropped. The path does
    /// not need to name an existing node.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::LockTimeout`] if the lock is still
    /// contended when the timeout elapses.
    fn acquire_lock(
        &self,
        path: &[String],
        mode: LockMode,
        timeout: Duration,
    ) -> StorageResult<LockGuard>;
}
