//! Path resolution against the stored namespace.

use crate::error::{CoreError, CoreResult};
use crate::filter::PathSource;
use crate::path::Path;
use hylla_codec::{decode_record, encode_record, Record, Value};
use hylla_storage::{NodeKind, StorageBackend, StorageError};
use std::fmt;

/// Kind of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// The root.
    Library,
    /// An internal node.
    Section,
    /// A leaf holding one record.
    Shelf,
}

impl NodeType {
    /// True for nodes that hold children.
    pub fn is_container(self) -> bool {
        !matches!(self, NodeType::Shelf)
    }
}

impl From<NodeKind> for NodeType {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Section => NodeType::Section,
            NodeKind::Shelf => NodeType::Shelf,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeType::Library => "library",
            NodeType::Section => "section",
            NodeType::Shelf => "shelf",
        })
    }
}

/// Where a path landed: a node, plus the keys into the node's record if
/// the path continued past a shelf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// The deepest node on the path.
    pub node: Path,
    /// Kind of `node`.
    pub node_type: NodeType,
    /// Remaining segments, addressing keys inside the shelf's record.
    /// Always empty unless `node_type` is `Shelf`.
    pub key_path: Vec<String>,
}

impl Location {
    /// True if the path addressed the node itself rather than a key.
    pub fn is_node(&self) -> bool {
        self.key_path.is_empty()
    }

    /// The node path followed by the key path.
    pub fn full_path(&self) -> Path {
        let mut segments = self.node.segments().to_vec();
        segments.extend(self.key_path.iter().cloned());
        Path::from_trusted(segments)
    }
}

/// Walks paths through the namespace using only `list_children`.
pub struct Resolver<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over a storage backend.
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Resolves a path from the library root.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if a segment before the first shelf has no
    /// matching child.
    pub fn resolve(&self, path: &Path) -> CoreResult<Location> {
        self.resolve_from(&Path::root(), path)
    }

    /// Resolves `path` relative to the container `base`.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if a segment before the first shelf has no
    /// matching child, or `TypeMismatch` if `base` is a shelf.
    pub fn resolve_from(&self, base: &Path, path: &Path) -> CoreResult<Location> {
        let mut node = base.clone();
        let mut node_type = if base.is_root() {
            NodeType::Library
        } else {
            NodeType::Section
        };
        let segments = path.segments();
        for (i, segment) in segments.iter().enumerate() {
            if node_type == NodeType::Shelf {
                return Ok(Location {
                    node,
                    node_type,
                    key_path: segments[i..].to_vec(),
                });
            }
            let children = self.list(&node)?;
            let Some(child) = children.into_iter().find(|c| &c.name == segment) else {
                return Err(CoreError::path_not_found(base.join(&path.prefix(i + 1))));
            };
            node = node.child_trusted(&child.name);
            node_type = child.kind.into();
        }
        Ok(Location {
            node,
            node_type,
            key_path: Vec::new(),
        })
    }

    /// Resolves a path that must name a whole shelf.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the path names a container or a record key.
    pub fn resolve_shelf(&self, path: &Path) -> CoreResult<Path> {
        let location = self.resolve(path)?;
        match (location.node_type, location.is_node()) {
            (NodeType::Shelf, true) => Ok(location.node),
            (NodeType::Shelf, false) => Err(CoreError::type_mismatch(
                path,
                "expected a shelf, found a record key",
            )),
            (other, _) => Err(CoreError::type_mismatch(
                path,
                format!("expected a shelf, found a {other}"),
            )),
        }
    }

    /// Resolves an optional path that must name the library or a section.
    /// `None` is the library.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the path names a shelf or a record key.
    pub fn resolve_container(&self, path: Option<&Path>) -> CoreResult<Location> {
        let Some(path) = path else {
            return Ok(Location {
                node: Path::root(),
                node_type: NodeType::Library,
                key_path: Vec::new(),
            });
        };
        let location = self.resolve(path)?;
        if location.node_type.is_container() {
            Ok(location)
        } else {
            Err(CoreError::type_mismatch(
                path,
                "expected a library or section, found a shelf",
            ))
        }
    }

    /// Direct child shelves of a container, in name order.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn child_shelves(&self, container: &Path) -> CoreResult<Vec<Path>> {
        Ok(self
            .list(container)?
            .into_iter()
            .filter(|c| c.kind == NodeKind::Shelf)
            .map(|c| container.child_trusted(&c.name))
            .collect())
    }

    /// Every node strictly below `container`, pre-order, children in name order.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn descendants(&self, container: &Path) -> CoreResult<Vec<(Path, NodeType)>> {
        let mut out = Vec::new();
        self.collect_descendants(container, &mut out)?;
        Ok(out)
    }

    /// Every shelf strictly below `container`, pre-order.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn descendant_shelves(&self, container: &Path) -> CoreResult<Vec<Path>> {
        Ok(self
            .descendants(container)?
            .into_iter()
            .filter(|(_, node_type)| *node_type == NodeType::Shelf)
            .map(|(path, _)| path)
            .collect())
    }

    fn collect_descendants(
        &self,
        container: &Path,
        out: &mut Vec<(Path, NodeType)>,
    ) -> CoreResult<()> {
        for child in self.list(container)? {
            let path = container.child_trusted(&child.name);
            out.push((path.clone(), child.kind.into()));
            if child.kind == NodeKind::Section {
                self.collect_descendants(&path, out)?;
            }
        }
        Ok(())
    }

    fn list(&self, node: &Path) -> CoreResult<Vec<hylla_storage::ChildEntry>> {
        Ok(self.storage.list_children(node.segments())?)
    }
}

/// Reads and decodes a shelf record. A shelf that was never written reads
/// as an empty record.
///
/// # Errors
///
/// Propagates storage and codec failures.
pub fn load_record(storage: &dyn StorageBackend, shelf: &Path) -> CoreResult<Record> {
    match storage.read_record(shelf.segments()) {
        Ok(bytes) => Ok(decode_record(&bytes)?),
        Err(StorageError::RecordNotFound { .. }) => Ok(Record::new()),
        Err(err) => Err(err.into()),
    }
}

/// Encodes and writes a shelf record.
///
/// # Errors
///
/// Propagates storage and codec failures.
pub fn store_record(storage: &dyn StorageBackend, shelf: &Path, record: &Record) -> CoreResult<()> {
    let bytes = encode_record(record)?;
    storage.write_record(shelf.segments(), &bytes)?;
    Ok(())
}

/// Resolves absolute filter operands against live shelf records.
pub struct NamespaceSource<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> NamespaceSource<'a> {
    /// Creates a source over a storage backend.
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }
}

impl PathSource for NamespaceSource<'_> {
    fn lookup(&self, path: &Path) -> CoreResult<Value> {
        let location = Resolver::new(self.storage).resolve(path)?;
        if location.node_type != NodeType::Shelf {
            return Err(CoreError::type_mismatch(
                path,
                format!("filter operand addresses a {}", location.node_type),
            ));
        }
        let record = Value::Map(load_record(self.storage, &location.node)?);
        record
            .get_path(&location.key_path)
            .cloned()
            .ok_or_else(|| CoreError::path_not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hylla_storage::InMemoryStorage;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn seeded() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.create_node(&[], "lib", NodeKind::Section).unwrap();
        storage
            .create_node(p("lib").segments(), "fiction", NodeKind::Section)
            .unwrap();
        storage
            .create_node(p("lib.fiction").segments(), "dune", NodeKind::Shelf)
            .unwrap();
        storage
            .create_node(p("lib").segments(), "catalog", NodeKind::Shelf)
            .unwrap();
        let mut record = Record::new();
        record.insert(
            "author".into(),
            Value::map([("name", Value::from("Frank Herbert"))]),
        );
        store_record(&storage, &p("lib.fiction.dune"), &record).unwrap();
        storage
    }

    #[test]
    fn resolve_section_and_shelf() {
        let storage = seeded();
        let resolver = Resolver::new(&storage);
        let loc = resolver.resolve(&p("lib.fiction")).unwrap();
        assert_eq!(loc.node_type, NodeType::Section);
        assert!(loc.is_node());

        let loc = resolver.resolve(&p("lib.fiction.dune")).unwrap();
        assert_eq!(loc.node_type, NodeType::Shelf);
        assert_eq!(loc.node, p("lib.fiction.dune"));
    }

    #[test]
    fn segments_after_a_shelf_are_keys() {
        let storage = seeded();
        let loc = Resolver::new(&storage)
            .resolve(&p("lib.fiction.dune.author.name"))
            .unwrap();
        assert_eq!(loc.node, p("lib.fiction.dune"));
        assert_eq!(loc.key_path, vec!["author", "name"]);
        assert_eq!(loc.full_path(), p("lib.fiction.dune.author.name"));
    }

    #[test]
    fn missing_segment_reports_the_prefix() {
        let storage = seeded();
        let err = Resolver::new(&storage)
            .resolve(&p("lib.poetry.odes"))
            .unwrap_err();
        assert!(matches!(err, CoreError::PathNotFound { ref path } if path == "lib.poetry"));
    }

    #[test]
    fn resolution_is_repeatable() {
        let storage = seeded();
        let resolver = Resolver::new(&storage);
        let first = resolver.resolve(&p("lib.catalog.x")).unwrap();
        let second = resolver.resolve(&p("lib.catalog.x")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_from_a_section() {
        let storage = seeded();
        let loc = Resolver::new(&storage)
            .resolve_from(&p("lib"), &p("fiction.dune"))
            .unwrap();
        assert_eq!(loc.node, p("lib.fiction.dune"));
    }

    #[test]
    fn shelf_and_container_checks() {
        let storage = seeded();
        let resolver = Resolver::new(&storage);
        assert!(resolver.resolve_shelf(&p("lib.catalog")).is_ok());
        assert!(matches!(
            resolver.resolve_shelf(&p("lib.fiction")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            resolver.resolve_shelf(&p("lib.catalog.key")),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            resolver.resolve_container(Some(&p("lib.catalog"))),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert_eq!(
            resolver.resolve_container(None).unwrap().node_type,
            NodeType::Library
        );
    }

    #[test]
    fn enumerates_shelves() {
        let storage = seeded();
        let resolver = Resolver::new(&storage);
        assert_eq!(resolver.child_shelves(&p("lib")).unwrap(), vec![p("lib.catalog")]);
        assert_eq!(
            resolver.descendant_shelves(&Path::root()).unwrap(),
            vec![p("lib.catalog"), p("lib.fiction.dune")]
        );
        assert_eq!(resolver.descendants(&p("lib")).unwrap().len(), 3);
    }

    #[test]
    fn unwritten_shelf_loads_empty() {
        let storage = seeded();
        assert!(load_record(&storage, &p("lib.catalog")).unwrap().is_empty());
    }

    #[test]
    fn namespace_source_reads_other_records() {
        let storage = seeded();
        let source = NamespaceSource::new(&storage);
        assert_eq!(
            source.lookup(&p("lib.fiction.dune.author.name")).unwrap(),
            Value::from("Frank Herbert")
        );
        assert!(matches!(
            source.lookup(&p("lib.fiction.dune.title")),
            Err(CoreError::PathNotFound { .. })
        ));
        assert!(matches!(
            source.lookup(&p("lib.fiction")),
            Err(CoreError::TypeMismatch { .. })
        ));
    }
}
