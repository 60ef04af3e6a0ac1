//! Schema assignment per section and for the library.

use super::Schema;
use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use hylla_codec::Record;
use std::collections::HashMap;

/// Schemas keyed by the container they are assigned to. The library's
/// schema lives under the root path.
///
/// The registry is owned state threaded through the executor; it is not
/// global.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<Path, Schema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a schema to the library (`path = None, is_library = true`)
    /// or to the section at `path` (`is_library = false`). Returns the
    /// schema it replaces, if any.
    ///
    /// Existing records are not revalidated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for any other combination of `path` and
    /// `is_library`, or `InvalidSchema` if the schema is malformed.
    pub fn set_schema(
        &mut self,
        path: Option<&Path>,
        schema: Schema,
        is_library: bool,
    ) -> CoreResult<Option<Schema>> {
        let target = Self::target(path, is_library)?;
        schema.check()?;
        Ok(self.schemas.insert(target, schema))
    }

    /// Maps the SetSchema argument pair to the registry key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if `is_library` disagrees with `path`.
    pub fn target(path: Option<&Path>, is_library: bool) -> CoreResult<Path> {
        match (path, is_library) {
            (None, true) => Ok(Path::root()),
            (Some(path), false) if !path.is_root() => Ok(path.clone()),
            (Some(_), true) => Err(CoreError::invalid_query(
                "path must be empty when is_library is set",
            )),
            _ => Err(CoreError::invalid_query(
                "a section path is required unless is_library is set",
            )),
        }
    }

    /// The schema assigned directly to `container`.
    pub fn get(&self, container: &Path) -> Option<&Schema> {
        self.schemas.get(container)
    }

    /// Inserts or replaces the schema of `container` without checks.
    pub(crate) fn insert(&mut self, container: Path, schema: Schema) -> Option<Schema> {
        self.schemas.insert(container, schema)
    }

    /// Removes the schema of `container`.
    pub(crate) fn remove(&mut self, container: &Path) -> Option<Schema> {
        self.schemas.remove(container)
    }

    /// The schema governing children of `parent`: the nearest assignment
    /// at `parent` or above, with the container it is assigned to.
    pub fn governing(&self, parent: &Path) -> Option<(&Path, &Schema)> {
        std::iter::once(parent.clone())
            .chain(parent.ancestors().into_iter().rev())
            .find_map(|candidate| self.schemas.get_key_value(&candidate))
    }

    /// Validates a record destined for `shelf`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if no schema governs the shelf or the
    /// record does not conform.
    pub fn validate(&self, shelf: &Path, record: &Record) -> CoreResult<()> {
        let parent = shelf.parent().unwrap_or_default();
        match self.governing(&parent) {
            Some((_, schema)) => schema.validate(record),
            None => Err(CoreError::SchemaViolation {
                schema: "<none>".to_string(),
                violations: vec![format!("no schema governs {shelf}")],
            }),
        }
    }

    /// The reset record for `shelf`: the governing schema's defaults, or
    /// an empty record if no schema governs.
    pub fn defaults_for(&self, shelf: &Path) -> Record {
        let parent = shelf.parent().unwrap_or_default();
        self.governing(&parent)
            .map(|(_, schema)| schema.defaults())
            .unwrap_or_default()
    }

    /// Removes every assignment at or below `node`, returning them.
    pub(crate) fn remove_subtree(&mut self, node: &Path) -> Vec<(Path, Schema)> {
        let doomed: Vec<Path> = self
            .schemas
            .keys()
            .filter(|path| path.starts_with(node))
            .cloned()
            .collect();
        let mut removed: Vec<(Path, Schema)> = doomed
            .into_iter()
            .filter_map(|path| self.schemas.remove(&path).map(|s| (path, s)))
            .collect();
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        removed
    }

    /// Number of assignments.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use hylla_codec::Value;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn named(name: &str) -> Schema {
        Schema::new(name).field("title", FieldType::Str)
    }

    #[test]
    fn argument_combinations() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.set_schema(None, named("L"), true).is_ok());
        assert!(registry.set_schema(Some(&p("lib")), named("S"), false).is_ok());
        assert!(matches!(
            registry.set_schema(Some(&p("lib")), named("S"), true),
            Err(CoreError::InvalidQuery { .. })
        ));
        assert!(matches!(
            registry.set_schema(None, named("S"), false),
            Err(CoreError::InvalidQuery { .. })
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn set_schema_returns_replaced() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.set_schema(Some(&p("lib")), named("A"), false).unwrap().is_none());
        let old = registry.set_schema(Some(&p("lib")), named("B"), false).unwrap();
        assert_eq!(old.unwrap().name, "A");
        assert_eq!(registry.get(&p("lib")).unwrap().name, "B");
    }

    #[test]
    fn nearest_ancestor_governs() {
        let mut registry = SchemaRegistry::new();
        registry.set_schema(None, named("Root"), true).unwrap();
        registry.set_schema(Some(&p("lib")), named("Lib"), false).unwrap();

        let (at, schema) = registry.governing(&p("lib.fiction.classics")).unwrap();
        assert_eq!(at, &p("lib"));
        assert_eq!(schema.name, "Lib");
        assert_eq!(registry.governing(&p("other")).unwrap().1.name, "Root");
        assert_eq!(registry.governing(&Path::root()).unwrap().1.name, "Root");
    }

    #[test]
    fn validate_without_schema_fails() {
        let registry = SchemaRegistry::new();
        let err = registry.validate(&p("lib.book1"), &Record::new()).unwrap_err();
        assert!(matches!(err, CoreError::SchemaViolation { .. }));
    }

    #[test]
    fn validate_uses_the_parent_chain() {
        let mut registry = SchemaRegistry::new();
        registry.set_schema(Some(&p("lib")), named("Lib"), false).unwrap();
        let mut record = Record::new();
        record.insert("title".into(), Value::from("Dune"));
        assert!(registry.validate(&p("lib.fiction.dune"), &record).is_ok());
        record.insert("extra".into(), Value::Null);
        assert!(registry.validate(&p("lib.fiction.dune"), &record).is_err());
    }

    #[test]
    fn defaults_for_shelf() {
        let mut registry = SchemaRegistry::new();
        let schema = named("Lib").field_with_default("year", FieldType::Int, Value::Integer(0));
        registry.set_schema(Some(&p("lib")), schema, false).unwrap();
        assert_eq!(registry.defaults_for(&p("lib.b")).len(), 1);
        assert!(registry.defaults_for(&p("other.b")).is_empty());
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let mut registry = SchemaRegistry::new();
        registry.set_schema(Some(&p("lib")), named("A"), false).unwrap();
        registry.set_schema(Some(&p("lib.x")), named("B"), false).unwrap();
        registry.set_schema(Some(&p("libx")), named("C"), false).unwrap();
        let removed = registry.remove_subtree(&p("lib"));
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].0, p("lib"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&p("libx")).is_some());
    }
}
