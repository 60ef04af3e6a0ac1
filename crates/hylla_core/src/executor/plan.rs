//! Turning queries into mutation lists.
//!
//! Planning does every resolution, validation and filter evaluation up
//! front. Nothing is written until a plan is complete, so a query that
//! fails here leaves the store untouched.

use crate::catalog::Catalog;
use crate::error::{CoreError, CoreResult};
use crate::filter::{EvalContext, Filter};
use crate::namespace::{load_record, Location, NamespaceSource, NodeType, Resolver};
use crate::path::{is_valid_name, Path};
use crate::query::{
    BuildSection, BuildShelf, Query, QueryOutput, Remove, Reset, Revise, SetSchema, Write,
};
use crate::schema::SchemaRegistry;
use crate::transaction::Mutation;
use hylla_codec::{Record, Value};
use hylla_storage::{NodeKind, StorageBackend};
use tracing::trace;

/// What a query will change, and what it answers once the changes land.
#[derive(Debug)]
pub(crate) struct Plan {
    pub mutations: Vec<Mutation>,
    pub output: QueryOutput,
}

impl Plan {
    fn new(mutations: Vec<Mutation>, affected: usize) -> Self {
        Self {
            mutations,
            output: QueryOutput::ack(affected),
        }
    }

    fn read(output: QueryOutput) -> Self {
        Self {
            mutations: Vec::new(),
            output,
        }
    }
}

pub(crate) struct Planner<'a> {
    storage: &'a dyn StorageBackend,
    catalog: &'a Catalog,
}

impl<'a> Planner<'a> {
    pub fn new(storage: &'a dyn StorageBackend, catalog: &'a Catalog) -> Self {
        Self { storage, catalog }
    }

    pub fn plan(&self, query: Query) -> CoreResult<Plan> {
        match query {
            Query::SetSchema(q) => self.set_schema(q),
            Query::BuildSection(q) => self.build_section(q),
            Query::BuildShelf(q) => self.build_shelf(q),
            Query::Write(q) => self.write(q),
            Query::CheckOut(q) => self.check_out(q).map(|entries| Plan::read(QueryOutput::Records(entries))),
            Query::Revise(q) => self.revise(q),
            Query::Remove(q) => self.remove(q),
            Query::Reset(q) => self.reset(q),
            Query::Transaction(_) => Err(CoreError::invalid_query(
                "transactions cannot be nested",
            )),
        }
    }

    pub(super) fn storage(&self) -> &'a dyn StorageBackend {
        self.storage
    }

    pub(super) fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.storage)
    }

    fn schemas(&self) -> &SchemaRegistry {
        self.catalog.schemas()
    }

    /// Evaluates `filter` on `record`. Absolute operands read live shelves.
    pub(super) fn passes(&self, filter: &Filter, record: &Record, subject: &Path) -> CoreResult<bool> {
        if filter.is_empty() {
            return Ok(true);
        }
        let namespace = NamespaceSource::new(self.storage);
        let matched = filter.evaluate(&EvalContext::new(record, &namespace))?;
        trace!(subject = %subject, matched, "filter evaluated");
        Ok(matched)
    }

    /// Resolves the target of a mutating query. A target that does not
    /// exist is `NotFound`.
    fn target(&self, path: &Path) -> CoreResult<Location> {
        self.resolver().resolve(path).map_err(CoreError::into_not_found)
    }

    /// Checks that a build target is free: a valid name under an existing
    /// container with no sibling of that name.
    fn new_child(&self, parent: Option<&Path>, name: &str) -> CoreResult<(Path, Path)> {
        if !is_valid_name(name) {
            return Err(CoreError::invalid_path(
                name,
                "names are alphanumeric segments joined by single underscores",
            ));
        }
        let location = self.resolver().resolve_container(parent)?;
        let parent = location.node;
        let child = parent.child_trusted(name);
        if self
            .storage
            .list_children(parent.segments())?
            .iter()
            .any(|entry| entry.name == name)
        {
            return Err(CoreError::already_exists(&child));
        }
        Ok((parent, child))
    }

    fn set_schema(&self, q: SetSchema) -> CoreResult<Plan> {
        let target = SchemaRegistry::target(q.path.as_ref(), q.is_library)?;
        q.schema.check()?;
        if !target.is_root() {
            let location = self.resolver().resolve(&target)?;
            if location.node_type != NodeType::Section || !location.is_node() {
                return Err(CoreError::type_mismatch(
                    &target,
                    format!("schemas attach to sections, found a {}", describe(&location)),
                ));
            }
        }
        Ok(Plan::new(
            vec![Mutation::SetSchema {
                target,
                schema: q.schema,
            }],
            1,
        ))
    }

    fn build_section(&self, q: BuildSection) -> CoreResult<Plan> {
        let (parent, child) = self.new_child(q.path.as_ref(), &q.name)?;
        let mut mutations = vec![Mutation::CreateNode {
            parent,
            name: q.name,
            kind: NodeKind::Section,
        }];
        if let Some(schema) = q.schema {
            schema.check()?;
            mutations.push(Mutation::SetSchema {
                target: child.clone(),
                schema,
            });
        }
        if let Some(metadata) = q.metadata {
            mutations.push(Mutation::SetMetadata {
                node: child,
                metadata,
            });
        }
        Ok(Plan::new(mutations, 1))
    }

    fn build_shelf(&self, q: BuildShelf) -> CoreResult<Plan> {
        let (parent, child) = self.new_child(q.path.as_ref(), &q.name)?;
        if parent.is_root() && self.schemas().get(&parent).is_none() {
            return Err(CoreError::SchemaViolation {
                schema: "<none>".to_string(),
                violations: vec![format!(
                    "the library has no schema, so {child} cannot be built directly under it"
                )],
            });
        }
        let record = match q.data {
            Some(data) => {
                self.schemas().validate(&child, &data)?;
                data
            }
            None => self.schemas().defaults_for(&child),
        };
        let mut mutations = vec![
            Mutation::CreateNode {
                parent,
                name: q.name,
                kind: NodeKind::Shelf,
            },
            Mutation::PutRecord {
                shelf: child.clone(),
                record,
            },
        ];
        if let Some(metadata) = q.metadata {
            mutations.push(Mutation::SetMetadata {
                node: child,
                metadata,
            });
        }
        Ok(Plan::new(mutations, 1))
    }

    fn write(&self, q: Write) -> CoreResult<Plan> {
        let location = self.target(&q.path)?;
        let shelf = expect_shelf(&q.path, &location)?;
        let mut record = load_record(self.storage, &shelf)?;
        let target = map_at(&mut record, &location.key_path, &q.path)?;
        if q.data.is_empty() {
            return Ok(Plan::new(Vec::new(), 0));
        }
        let taken: Vec<String> = q
            .data
            .keys()
            .filter(|key| target.contains_key(*key))
            .cloned()
            .collect();
        target.extend(q.data);
        // Schema violations take precedence over collisions.
        self.schemas().validate(&shelf, &record)?;
        if let Some(key) = taken.first() {
            return Err(CoreError::already_exists(format!("{}.{key}", q.path)));
        }
        Ok(Plan::new(vec![Mutation::PutRecord { shelf, record }], 1))
    }

    fn revise(&self, q: Revise) -> CoreResult<Plan> {
        let location = self.target(&q.path)?;
        let shelf = expect_shelf(&q.path, &location)?;
        let record = load_record(self.storage, &shelf)?;
        if !self.passes(&q.filters, &record, &shelf)? {
            return Ok(Plan::new(Vec::new(), 0));
        }
        let record = if location.is_node() {
            q.data
        } else {
            let mut record = record;
            let slot = value_at(&mut record, &location.key_path, &q.path)?;
            *slot = revised_value(slot, q.data, &q.path)?;
            record
        };
        self.schemas().validate(&shelf, &record)?;
        Ok(Plan::new(vec![Mutation::PutRecord { shelf, record }], 1))
    }

    fn remove(&self, q: Remove) -> CoreResult<Plan> {
        if q.remove_shelf && q.remove_section {
            return Err(CoreError::invalid_query(
                "remove_shelf and remove_section are mutually exclusive",
            ));
        }
        let location = self.target(&q.path)?;

        if q.remove_shelf || q.remove_section {
            let wanted = if q.remove_shelf {
                NodeType::Shelf
            } else {
                NodeType::Section
            };
            if location.node_type != wanted || !location.is_node() {
                return Err(CoreError::type_mismatch(
                    &q.path,
                    format!("expected a {wanted}, found a {}", describe(&location)),
                ));
            }
            return Ok(Plan::new(
                vec![Mutation::DeleteNode {
                    node: location.node,
                }],
                1,
            ));
        }

        match location.node_type {
            NodeType::Shelf => {
                let shelf = location.node;
                let mut record = load_record(self.storage, &shelf)?;
                let removed = if q.filters.is_empty() {
                    let Some((last, parent_keys)) = location.key_path.split_last() else {
                        return Err(CoreError::invalid_query(
                            "removing a shelf's entries needs a filter or remove_shelf",
                        ));
                    };
                    let parent = map_at(&mut record, parent_keys, &q.path)?;
                    if parent.remove(last).is_none() {
                        return Err(CoreError::not_found(&q.path));
                    }
                    1
                } else {
                    let entries = map_at(&mut record, &location.key_path, &q.path)?;
                    self.remove_matching(&q.filters, entries, &q.path)?
                };
                let mutations = if removed > 0 {
                    vec![Mutation::PutRecord { shelf, record }]
                } else {
                    Vec::new()
                };
                Ok(Plan::new(mutations, removed))
            }
            NodeType::Section | NodeType::Library => {
                if q.filters.is_empty() {
                    return Err(CoreError::invalid_query(
                        "removing from a section needs a filter or remove_section",
                    ));
                }
                // Entries go; the shelves themselves stay.
                let mut mutations = Vec::new();
                let mut removed = 0;
                for shelf in self.resolver().child_shelves(&location.node)? {
                    let mut record = load_record(self.storage, &shelf)?;
                    let n = self.remove_matching(&q.filters, &mut record, &shelf)?;
                    if n > 0 {
                        removed += n;
                        mutations.push(Mutation::PutRecord { shelf, record });
                    }
                }
                Ok(Plan::new(mutations, removed))
            }
        }
    }

    /// Deletes the map-valued entries of `entries` that pass `filter`.
    fn remove_matching(&self, filter: &Filter, entries: &mut Record, path: &Path) -> CoreResult<usize> {
        let mut doomed = Vec::new();
        for (key, value) in entries.iter() {
            if let Value::Map(entry) = value {
                if self.passes(filter, entry, path)? {
                    doomed.push(key.clone());
                }
            }
        }
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len())
    }

    fn reset(&self, q: Reset) -> CoreResult<Plan> {
        if q.reset_shelf && q.reset_section {
            return Err(CoreError::invalid_query(
                "reset_shelf and reset_section are mutually exclusive",
            ));
        }
        let location = self.target(&q.path)?;
        if !location.is_node() {
            return Err(CoreError::type_mismatch(
                &q.path,
                "reset targets a shelf or a section, found a record key",
            ));
        }
        let node = location.node;
        let shelves = match (location.node_type, q.reset_shelf, q.reset_section) {
            (NodeType::Shelf, _, false) if q.reset_shelf || self.shelf_passes(&q.filters, &node)? => {
                vec![node]
            }
            (NodeType::Shelf, false, false) => Vec::new(),
            (NodeType::Shelf, _, true) => {
                return Err(CoreError::type_mismatch(
                    &q.path,
                    "reset_section needs a section, found a shelf",
                ));
            }
            (_, true, _) => {
                return Err(CoreError::type_mismatch(
                    &q.path,
                    format!("reset_shelf needs a shelf, found a {}", location.node_type),
                ));
            }
            (_, false, true) => self.resolver().descendant_shelves(&node)?,
            (_, false, false) => {
                let mut selected = Vec::new();
                for shelf in self.resolver().child_shelves(&node)? {
                    if self.shelf_passes(&q.filters, &shelf)? {
                        selected.push(shelf);
                    }
                }
                selected
            }
        };
        let mutations: Vec<Mutation> = shelves
            .into_iter()
            .map(|shelf| Mutation::PutRecord {
                record: self.schemas().defaults_for(&shelf),
                shelf,
            })
            .collect();
        let affected = mutations.len();
        Ok(Plan::new(mutations, affected))
    }

    fn shelf_passes(&self, filter: &Filter, shelf: &Path) -> CoreResult<bool> {
        if filter.is_empty() {
            return Ok(true);
        }
        let record = load_record(self.storage, shelf)?;
        self.passes(filter, &record, shelf)
    }
}

fn describe(location: &Location) -> String {
    if location.is_node() {
        location.node_type.to_string()
    } else {
        "record key".to_string()
    }
}

fn expect_shelf(path: &Path, location: &Location) -> CoreResult<Path> {
    if location.node_type == NodeType::Shelf {
        Ok(location.node.clone())
    } else {
        Err(CoreError::type_mismatch(
            path,
            format!("expected a shelf or a key inside one, found a {}", location.node_type),
        ))
    }
}

/// The value Revise stores at a record key.
///
/// A dict is replaced by `data` as a whole. Any other value is replaced by
/// the single entry of `data` named like the key.
fn revised_value(current: &Value, mut data: Record, path: &Path) -> CoreResult<Value> {
    if matches!(current, Value::Map(_)) {
        return Ok(Value::Map(data));
    }
    let key = path.name().unwrap_or_default();
    match data.remove(key) {
        Some(value) if data.is_empty() => Ok(value),
        _ => Err(CoreError::invalid_query(format!(
            "{path} holds a {}, so data must be the single entry {key:?}",
            current.kind()
        ))),
    }
}

/// The value at `keys` inside `record`. `keys` must be non-empty.
fn value_at<'r>(record: &'r mut Record, keys: &[String], path: &Path) -> CoreResult<&'r mut Value> {
    let (head, tail) = keys
        .split_first()
        .ok_or_else(|| CoreError::type_mismatch(path, "expected a record key"))?;
    record
        .get_mut(head)
        .and_then(|value| value.get_path_mut(tail))
        .ok_or_else(|| CoreError::not_found(path))
}

/// The map at `keys` inside `record`; the record itself for no keys.
fn map_at<'r>(record: &'r mut Record, keys: &[String], path: &Path) -> CoreResult<&'r mut Record> {
    if keys.is_empty() {
        return Ok(record);
    }
    match value_at(record, keys, path)? {
        Value::Map(map) => Ok(map),
        other => Err(CoreError::type_mismatch(
            path,
            format!("expected a dict, found {}", other.kind()),
        )),
    }
}
