//! Planned mutations and the undo log that reverses them.

use crate::catalog::{Catalog, CatalogSubtree};
use crate::error::{CoreError, CoreResult};
use crate::namespace::{NodeType, Resolver};
use crate::path::Path;
use crate::schema::Schema;
use hylla_codec::{encode_record, Record};
use hylla_storage::{NodeKind, StorageBackend, StorageError};
use parking_lot::RwLock;
use tracing::{error, trace};

/// One change to the store, fully decided before it is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Overwrite a shelf record.
    PutRecord {
        /// Target shelf.
        shelf: Path,
        /// New record.
        record: Record,
    },
    /// Create a node.
    CreateNode {
        /// Parent container.
        parent: Path,
        /// Child name.
        name: String,
        /// Child kind.
        kind: NodeKind,
    },
    /// Delete a node with its subtree, schemas and metadata.
    DeleteNode {
        /// Node to delete.
        node: Path,
    },
    /// Assign a schema.
    SetSchema {
        /// Container, the root for the library.
        target: Path,
        /// The schema.
        schema: Schema,
    },
    /// Record node metadata.
    SetMetadata {
        /// The node.
        node: Path,
        /// The metadata.
        metadata: Record,
    },
}

#[derive(Debug)]
enum UndoEntry {
    RestoreRecord {
        shelf: Path,
        before: Option<Vec<u8>>,
    },
    RemoveNode {
        node: Path,
    },
    RestoreSubtree {
        /// The deleted node first, then its descendants in pre-order.
        nodes: Vec<(Path, NodeKind, Option<Vec<u8>>)>,
        catalog: CatalogSubtree,
    },
    RestoreSchema {
        target: Path,
        previous: Option<Schema>,
    },
    RestoreMetadata {
        node: Path,
        previous: Option<Record>,
    },
}

/// Applies mutations, remembering how to reverse each one.
///
/// A single operation and a whole transaction each use one log; on
/// failure the log is rolled back in reverse order.
#[derive(Debug, Default)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

impl UndoLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of applied mutations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was applied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies mutations in order, logging each one.
    ///
    /// Stops at the first failure. Everything applied so far stays in the
    /// log for the caller to roll back.
    ///
    /// # Errors
    ///
    /// Propagates storage and codec failures.
    pub fn apply_all(
        &mut self,
        storage: &dyn StorageBackend,
        catalog: &RwLock<Catalog>,
        mutations: Vec<Mutation>,
    ) -> CoreResult<()> {
        for mutation in mutations {
            self.apply(storage, catalog, mutation)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        storage: &dyn StorageBackend,
        catalog: &RwLock<Catalog>,
        mutation: Mutation,
    ) -> CoreResult<()> {
        match mutation {
            Mutation::PutRecord { shelf, record } => {
                let bytes = encode_record(&record)?;
                let before = read_raw(storage, &shelf)?;
                storage.write_record(shelf.segments(), &bytes)?;
                trace!(shelf = %shelf, "record written");
                self.entries.push(UndoEntry::RestoreRecord { shelf, before });
            }
            Mutation::CreateNode { parent, name, kind } => {
                storage.create_node(parent.segments(), &name, kind)?;
                let node = parent.child_trusted(&name);
                trace!(node = %node, %kind, "node created");
                self.entries.push(UndoEntry::RemoveNode { node });
            }
            Mutation::DeleteNode { node } => {
                let nodes = capture_subtree(storage, &node)?;
                storage.delete_node(node.segments())?;
                let taken = catalog.write().remove_subtree(&node);
                trace!(node = %node, nodes = nodes.len(), "subtree deleted");
                self.entries.push(UndoEntry::RestoreSubtree {
                    nodes,
                    catalog: taken,
                });
            }
            Mutation::SetSchema { target, schema } => {
                let previous = catalog.write().schemas_mut().insert(target.clone(), schema);
                self.entries.push(UndoEntry::RestoreSchema { target, previous });
            }
            Mutation::SetMetadata { node, metadata } => {
                let previous = catalog.write().set_metadata(node.clone(), metadata);
                self.entries.push(UndoEntry::RestoreMetadata { node, previous });
            }
        }
        Ok(())
    }

    /// Reverses every logged mutation, newest first.
    ///
    /// A step that fails is logged and skipped; the remaining steps still
    /// run. Returns the number of failed steps.
    pub fn rollback(self, storage: &dyn StorageBackend, catalog: &RwLock<Catalog>) -> usize {
        let mut failures = 0;
        for entry in self.entries.into_iter().rev() {
            if let Err(err) = undo(storage, catalog, entry) {
                error!(error = %err, "rollback step failed");
                failures += 1;
            }
        }
        failures
    }
}

fn undo(storage: &dyn StorageBackend, catalog: &RwLock<Catalog>, entry: UndoEntry) -> CoreResult<()> {
    match entry {
        UndoEntry::RestoreRecord { shelf, before } => match before {
            Some(bytes) => storage.write_record(shelf.segments(), &bytes)?,
            // Storage cannot clear a record, so the shelf is recreated bare.
            None => {
                let parent = shelf.parent().unwrap_or_default();
                let name = shelf
                    .name()
                    .ok_or_else(|| CoreError::type_mismatch(&shelf, "the library holds no record"))?;
                storage.delete_node(shelf.segments())?;
                storage.create_node(parent.segments(), name, NodeKind::Shelf)?;
            }
        },
        UndoEntry::RemoveNode { node } => storage.delete_node(node.segments())?,
        UndoEntry::RestoreSubtree { nodes, catalog: taken } => {
            for (path, kind, record) in nodes {
                let parent = path.parent().unwrap_or_default();
                let name = path
                    .name()
                    .ok_or_else(|| CoreError::type_mismatch(&path, "the library cannot be restored"))?;
                storage.create_node(parent.segments(), name, kind)?;
                if let Some(bytes) = record {
                    storage.write_record(path.segments(), &bytes)?;
                }
            }
            catalog.write().restore(taken);
        }
        UndoEntry::RestoreSchema { target, previous } => {
            let mut catalog = catalog.write();
            match previous {
                Some(schema) => catalog.schemas_mut().insert(target, schema),
                None => catalog.schemas_mut().remove(&target),
            };
        }
        UndoEntry::RestoreMetadata { node, previous } => {
            let mut catalog = catalog.write();
            match previous {
                Some(metadata) => catalog.set_metadata(node, metadata),
                None => catalog.clear_metadata(&node),
            };
        }
    }
    Ok(())
}

fn read_raw(storage: &dyn StorageBackend, shelf: &Path) -> CoreResult<Option<Vec<u8>>> {
    match storage.read_record(shelf.segments()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(StorageError::RecordNotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn capture_subtree(
    storage: &dyn StorageBackend,
    node: &Path,
) -> CoreResult<Vec<(Path, NodeKind, Option<Vec<u8>>)>> {
    let resolver = Resolver::new(storage);
    let root_kind = match resolver.resolve(node)?.node_type {
        NodeType::Section => NodeKind::Section,
        NodeType::Shelf => NodeKind::Shelf,
        NodeType::Library => {
            return Err(CoreError::type_mismatch(node, "the library cannot be deleted"));
        }
    };
    let mut nodes = vec![(node.clone(), root_kind, snapshot_record(storage, node, root_kind)?)];
    if root_kind == NodeKind::Section {
        for (path, node_type) in resolver.descendants(node)? {
            let kind = match node_type {
                NodeType::Shelf => NodeKind::Shelf,
                _ => NodeKind::Section,
            };
            let record = snapshot_record(storage, &path, kind)?;
            nodes.push((path, kind, record));
        }
    }
    Ok(nodes)
}

fn snapshot_record(
    storage: &dyn StorageBackend,
    path: &Path,
    kind: NodeKind,
) -> CoreResult<Option<Vec<u8>>> {
    match kind {
        NodeKind::Shelf => read_raw(storage, path),
        NodeKind::Section => Ok(None),
    }
}
