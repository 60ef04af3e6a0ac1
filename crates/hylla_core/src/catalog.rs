//! Process-scoped state kept beside the namespace: schema assignments and
//! node metadata.

use crate::path::Path;
use crate::schema::{Schema, SchemaRegistry};
use hylla_codec::Record;
use std::collections::HashMap;

/// Schemas and metadata for the nodes of one store.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: SchemaRegistry,
    metadata: HashMap<Path, Record>,
}

/// Catalog entries taken out with a removed subtree, kept so the removal
/// can be undone.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CatalogSubtree {
    pub schemas: Vec<(Path, Schema)>,
    pub metadata: Vec<(Path, Record)>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema registry.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub(crate) fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    /// Metadata recorded for `node` at build time.
    pub fn metadata(&self, node: &Path) -> Option<&Record> {
        self.metadata.get(node)
    }

    pub(crate) fn set_metadata(&mut self, node: Path, metadata: Record) -> Option<Record> {
        self.metadata.insert(node, metadata)
    }

    pub(crate) fn clear_metadata(&mut self, node: &Path) -> Option<Record> {
        self.metadata.remove(node)
    }

    /// Takes out every schema and metadata entry at or below `node`.
    pub(crate) fn remove_subtree(&mut self, node: &Path) -> CatalogSubtree {
        let schemas = self.schemas.remove_subtree(node);
        let doomed: Vec<Path> = self
            .metadata
            .keys()
            .filter(|path| path.starts_with(node))
            .cloned()
            .collect();
        let mut metadata: Vec<(Path, Record)> = doomed
            .into_iter()
            .filter_map(|path| self.metadata.remove(&path).map(|m| (path, m)))
            .collect();
        metadata.sort_by(|a, b| a.0.cmp(&b.0));
        CatalogSubtree { schemas, metadata }
    }

    /// Puts back what [`Catalog::remove_subtree`] took out.
    pub(crate) fn restore(&mut self, subtree: CatalogSubtree) {
        for (path, schema) in subtree.schemas {
            self.schemas.insert(path, schema);
        }
        self.metadata.extend(subtree.metadata);
    }
}
