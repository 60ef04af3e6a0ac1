//! In-memory storage backend.

use crate::backend::{ChildEntry, NodeKind, StorageBackend};
use crate::error::{display_path, StorageError, StorageResult};
use crate::lock::{LockGuard, LockMode, LockTable};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct MemoryNode {
    /// `None` for the library root.
    kind: Option<NodeKind>,
    children: BTreeMap<String, NodeKind>,
    record: Option<Vec<u8>>,
}

/// Point-in-time copy of one node, as returned by [`InMemoryStorage::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Node kind; `None` for the library root.
    pub kind: Option<NodeKind>,
    /// Stored record bytes, for shelves that have one.
    pub record: Option<Vec<u8>>,
}

/// An in-memory storage backend.
///
/// This backend keeps the whole namespace in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Embedded stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use hylla_storage::{InMemoryStorage, NodeKind, StorageBackend};
///
/// let storage = InMemoryStorage::new();
/// let lib = vec!["lib".to_string()];
/// storage.create_node(&[], "lib", NodeKind::Section).unwrap();
/// storage.create_node(&lib, "book1", NodeKind::Shelf).unwrap();
///
/// let shelf = vec!["lib".to_string(), "book1".to_string()];
/// storage.write_record(&shelf, b"\xa0").unwrap();
/// assert_eq!(storage.read_record(&shelf).unwrap(), b"\xa0");
/// ```
pub struct InMemoryStorage {
    nodes: RwLock<HashMap<Vec<String>, MemoryNode>>,
    locks: Arc<LockTable>,
}

impl InMemoryStorage {
    /// Creates a storage holding only the library root.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(Vec::new(), MemoryNode::default());
        Self {
            nodes: RwLock::new(nodes),
            locks: Arc::new(LockTable::new()),
        }
    }

    /// Returns a copy of every node, ordered by path.
    ///
    /// Useful for asserting that a failed operation left state untouched.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Vec<String>, NodeSnapshot> {
        self.nodes
            .read()
            .iter()
            .map(|(path, node)| {
                (
                    path.clone(),
                    NodeSnapshot {
                        kind: node.kind,
                        record: node.record.clone(),
                    },
                )
            })
            .collect()
    }

    /// Number of nodes, the library root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of paths currently locked.
    #[must_use]
    pub fn active_locks(&self) -> usize {
        self.locks.active_locks()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("nodes", &self.node_count())
            .field("locks", &self.locks)
            .finish()
    }
}

fn expect_shelf<'a>(
    nodes: &'a HashMap<Vec<String>, MemoryNode>,
    shelf: &[String],
) -> StorageResult<&'a MemoryNode> {
    let node = nodes
        .get(shelf)
        .ok_or_else(|| StorageError::node_not_found(shelf))?;
    if node.kind != Some(NodeKind::Shelf) {
        return Err(StorageError::kind_mismatch(shelf, "expected a shelf"));
    }
    Ok(node)
}

impl StorageBackend for InMemoryStorage {
    fn read_record(&self, shelf: &[String]) -> StorageResult<Vec<u8>> {
        let nodes = self.nodes.read();
        expect_shelf(&nodes, shelf)?
            .record
            .clone()
            .ok_or_else(|| StorageError::RecordNotFound {
                path: display_path(shelf),
            })
    }

    fn write_record(&self, shelf: &[String], record: &[u8]) -> StorageResult<()> {
        let mut nodes = self.nodes.write();
        expect_shelf(&nodes, shelf)?;
        if let Some(node) = nodes.get_mut(shelf) {
            node.record = Some(record.to_vec());
        }
        Ok(())
    }

    fn list_children(&self, node: &[String]) -> StorageResult<Vec<ChildEntry>> {
        let nodes = self.nodes.read();
        let entry = nodes
            .get(node)
            .ok_or_else(|| StorageError::node_not_found(node))?;
        if entry.kind == Some(NodeKind::Shelf) {
            return Err(StorageError::kind_mismatch(node, "a shelf has no children"));
        }
        Ok(entry
            .children
            .iter()
            .map(|(name, kind)| ChildEntry {
                name: name.clone(),
                kind: *kind,
            })
            .collect())
    }

    fn create_node(&self, parent: &[String], name: &str, kind: NodeKind) -> StorageResult<()> {
        let mut nodes = self.nodes.write();
        let parent_node = nodes
            .get_mut(parent)
            .ok_or_else(|| StorageError::node_not_found(parent))?;
        if parent_node.kind == Some(NodeKind::Shelf) {
            return Err(StorageError::kind_mismatch(
                parent,
                "cannot create a node under a shelf",
            ));
        }
        let mut path = parent.to_vec();
        path.push(name.to_string());
        if parent_node.children.contains_key(name) {
            return Err(StorageError::node_exists(&path));
        }
        parent_node.children.insert(name.to_string(), kind);
        nodes.insert(
            path,
            MemoryNode {
                kind: Some(kind),
                ..MemoryNode::default()
            },
        );
        Ok(())
    }

    fn delete_node(&self, node: &[String]) -> StorageResult<()> {
        let Some((name, parent)) = node.split_last() else {
            return Err(StorageError::Backend(
                "the library root cannot be deleted".to_string(),
            ));
        };
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(node) {
            return Err(StorageError::node_not_found(node));
        }
        nodes.retain(|path, _| !path.starts_with(node));
        if let Some(parent_node) = nodes.get_mut(parent) {
            parent_node.children.remove(name);
        }
        Ok(())
    }

    fn acquire_lock(
        &self,
        path: &[String],
        mode: LockMode,
        timeout: Duration,
    ) -> StorageResult<LockGuard> {
        self.locks.acquire(path, mode, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(s: &str) -> Vec<String> {
        s.split('.').map(String::from).collect()
    }

    fn seeded() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.create_node(&[], "lib", NodeKind::Section).unwrap();
        storage
            .create_node(&path("lib"), "fiction", NodeKind::Section)
            .unwrap();
        storage
            .create_node(&path("lib.fiction"), "book1", NodeKind::Shelf)
            .unwrap();
        storage
            .create_node(&path("lib"), "index", NodeKind::Shelf)
            .unwrap();
        storage
    }

    #[test]
    fn memory_new_has_only_root() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.node_count(), 1);
        assert!(storage.list_children(&[]).unwrap().is_empty());
    }

    #[test]
    fn memory_children_are_ordered_by_name() {
        let storage = seeded();
        let names: Vec<_> = storage
            .list_children(&path("lib"))
            .unwrap()
            .into_iter()
            .map(|c| (c.name, c.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("fiction".to_string(), NodeKind::Section),
                ("index".to_string(), NodeKind::Shelf),
            ]
        );
    }

    proptest! {
        #[test]
        fn memory_children_list_sorted_whatever_the_creation_order(
            names in prop::collection::btree_set("[a-z]{1,6}", 1..12),
            seed in any::<u64>(),
        ) {
            let mut shuffled: Vec<_> = names.iter().cloned().collect();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 1 {
                shuffled.reverse();
            }

            let storage = InMemoryStorage::new();
            for name in &shuffled {
                storage.create_node(&[], name, NodeKind::Shelf).unwrap();
            }
            let listed: Vec<_> = storage
                .list_children(&[])
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            prop_assert_eq!(listed, names.into_iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn memory_record_roundtrip() {
        let storage = seeded();
        let shelf = path("lib.fiction.book1");
        storage.write_record(&shelf, b"one").unwrap();
        storage.write_record(&shelf, b"two").unwrap();
        assert_eq!(storage.read_record(&shelf).unwrap(), b"two");
    }

    #[test]
    fn memory_unwritten_shelf_has_no_record() {
        let storage = seeded();
        assert!(matches!(
            storage.read_record(&path("lib.index")),
            Err(StorageError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn memory_records_only_on_shelves() {
        let storage = seeded();
        assert!(matches!(
            storage.write_record(&path("lib"), b"x"),
            Err(StorageError::KindMismatch { .. })
        ));
        assert!(matches!(
            storage.read_record(&path("lib.missing")),
            Err(StorageError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn memory_duplicate_sibling_fails() {
        let storage = seeded();
        assert_eq!(
            storage.create_node(&path("lib"), "index", NodeKind::Section),
            Err(StorageError::NodeExists {
                path: "lib.index".to_string()
            })
        );
    }

    #[test]
    fn memory_no_children_under_shelf() {
        let storage = seeded();
        assert!(matches!(
            storage.create_node(&path("lib.index"), "x", NodeKind::Shelf),
            Err(StorageError::KindMismatch { .. })
        ));
        assert!(matches!(
            storage.list_children(&path("lib.index")),
            Err(StorageError::KindMismatch { .. })
        ));
    }

    #[test]
    fn memory_delete_removes_subtree() {
        let storage = seeded();
        storage.delete_node(&path("lib.fiction")).unwrap();
        assert_eq!(storage.node_count(), 3);
        assert!(storage.list_children(&path("lib.fiction")).is_err());
        assert_eq!(storage.list_children(&path("lib")).unwrap().len(), 1);
    }

    #[test]
    fn memory_delete_missing_or_root_fails() {
        let storage = seeded();
        assert!(matches!(
            storage.delete_node(&path("lib.nope")),
            Err(StorageError::NodeNotFound { .. })
        ));
        assert!(matches!(
            storage.delete_node(&[]),
            Err(StorageError::Backend(_))
        ));
    }

    #[test]
    fn memory_snapshot_tracks_records() {
        let storage = seeded();
        let before = storage.snapshot();
        storage.write_record(&path("lib.index"), b"r").unwrap();
        let after = storage.snapshot();
        assert_ne!(before, after);
        assert_eq!(
            after[&path("lib.index")].record.as_deref(),
            Some(&b"r"[..])
        );
    }

    #[test]
    fn memory_locks_are_released_on_drop() {
        let storage = InMemoryStorage::new();
        let guard = storage
            .acquire_lock(&path("lib"), LockMode::Exclusive, Duration::from_millis(10))
            .unwrap();
        assert_eq!(storage.active_locks(), 1);
        drop(guard);
        assert_eq!(storage.active_locks(), 0);
    }
}
