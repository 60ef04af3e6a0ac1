//! Query objects and their results.
//!
//! Queries are plain data. Any front end can build them directly or
//! deserialize them; the wire form is an internally tagged object:
//!
//! ```json
//! {"op": "check_out", "checkout": [{"path": "lib", "checkout": ["*all"]}], "limit": 10}
//! ```

use crate::filter::Filter;
use crate::path::Path;
use crate::schema::Schema;
use hylla_codec::Record;
use serde::{Deserialize, Serialize};

/// The checkout entry selecting every direct child shelf of a container.
pub const CHECKOUT_ALL: &str = "*all";

/// A single request against the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Query {
    /// Assign a schema to the library or a section.
    SetSchema(SetSchema),
    /// Create a section.
    BuildSection(BuildSection),
    /// Create a shelf.
    BuildShelf(BuildShelf),
    /// Insert fields without overwriting.
    Write(Write),
    /// Select records.
    CheckOut(CheckOut),
    /// Replace a record or a value inside one.
    Revise(Revise),
    /// Delete nodes or record entries.
    Remove(Remove),
    /// Reset records to their schema defaults.
    Reset(Reset),
    /// Run an ordered batch atomically.
    Transaction(Transaction),
}

impl Query {
    /// Snake-case name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Query::SetSchema(_) => "set_schema",
            Query::BuildSection(_) => "build_section",
            Query::BuildShelf(_) => "build_shelf",
            Query::Write(_) => "write",
            Query::CheckOut(_) => "check_out",
            Query::Revise(_) => "revise",
            Query::Remove(_) => "remove",
            Query::Reset(_) => "reset",
            Query::Transaction(_) => "transaction",
        }
    }

    /// The path the query is addressed to, for diagnostics. Library-level
    /// queries and checkouts report the root.
    pub fn target(&self) -> Path {
        let path = match self {
            Query::SetSchema(q) => q.path.as_ref(),
            Query::BuildSection(q) => q.path.as_ref(),
            Query::BuildShelf(q) => q.path.as_ref(),
            Query::Write(q) => Some(&q.path),
            Query::Revise(q) => Some(&q.path),
            Query::Remove(q) => Some(&q.path),
            Query::Reset(q) => Some(&q.path),
            Query::CheckOut(_) | Query::Transaction(_) => None,
        };
        path.cloned().unwrap_or_default()
    }

    /// The filter carried by the query, if its kind takes one.
    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Query::CheckOut(q) => Some(&q.filters),
            Query::Revise(q) => Some(&q.filters),
            Query::Remove(q) => Some(&q.filters),
            Query::Reset(q) => Some(&q.filters),
            _ => None,
        }
    }
}

/// Assigns `schema` to the library (`path = None, is_library = true`) or
/// to the section at `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSchema {
    /// Section path, `None` for the library.
    #[serde(default)]
    pub path: Option<Path>,
    /// The schema.
    pub schema: Schema,
    /// Targets the library.
    #[serde(default)]
    pub is_library: bool,
}

impl SetSchema {
    /// Assigns a schema to a section.
    pub fn section(path: Path, schema: Schema) -> Self {
        Self {
            path: Some(path),
            schema,
            is_library: false,
        }
    }

    /// Assigns the library schema.
    pub fn library(schema: Schema) -> Self {
        Self {
            path: None,
            schema,
            is_library: true,
        }
    }
}

/// Creates section `name` under `path` (the library if `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Parent container.
    #[serde(default)]
    pub path: Option<Path>,
    /// New section name.
    pub name: String,
    /// Schema for the section's shelves.
    #[serde(default)]
    pub schema: Option<Schema>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Option<Record>,
}

impl BuildSection {
    /// A section with no schema or metadata.
    pub fn new(parent: Option<Path>, name: impl Into<String>) -> Self {
        Self {
            path: parent,
            name: name.into(),
            schema: None,
            metadata: None,
        }
    }

    /// Attaches a schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Record) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Creates shelf `name` under `path` (the library if `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildShelf {
    /// Parent container.
    #[serde(default)]
    pub path: Option<Path>,
    /// New shelf name.
    pub name: String,
    /// Initial record. Validated when present; otherwise the shelf starts
    /// with its schema defaults.
    #[serde(default)]
    pub data: Option<Record>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Option<Record>,
}

impl BuildShelf {
    /// A shelf with no initial data or metadata.
    pub fn new(parent: Option<Path>, name: impl Into<String>) -> Self {
        Self {
            path: parent,
            name: name.into(),
            data: None,
            metadata: None,
        }
    }

    /// Sets the initial record.
    #[must_use]
    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Record) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Inserts the fields of `data` into the map at `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Write {
    /// Shelf or key path of a map.
    pub path: Path,
    /// Fields to insert. None may already exist.
    pub data: Record,
}

impl Write {
    /// Creates a write.
    pub fn new(path: Path, data: Record) -> Self {
        Self { path, data }
    }
}

/// Which shelves one checkout item covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutItem {
    /// A container or shelf. `None` is the library.
    #[serde(default)]
    pub path: Option<Path>,
    /// Shelf names or relative shelf paths under `path`, or the single
    /// entry [`CHECKOUT_ALL`].
    pub checkout: Vec<String>,
}

impl CheckOutItem {
    /// Every direct child shelf of `path`.
    pub fn all(path: Option<Path>) -> Self {
        Self {
            path,
            checkout: vec![CHECKOUT_ALL.to_string()],
        }
    }

    /// The named shelves under `path`.
    pub fn named<I, S>(path: Option<Path>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path,
            checkout: names.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the item is the `*all` form.
    pub fn is_all(&self) -> bool {
        self.checkout.len() == 1 && self.checkout[0] == CHECKOUT_ALL
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// One sort key: a path inside each matched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortItem {
    /// Record key path.
    pub path: Path,
    /// Direction.
    #[serde(default)]
    pub order: SortOrder,
}

impl SortItem {
    /// Ascending on `path`.
    pub fn asc(path: Path) -> Self {
        Self {
            path,
            order: SortOrder::Asc,
        }
    }

    /// Descending on `path`.
    pub fn desc(path: Path) -> Self {
        Self {
            path,
            order: SortOrder::Desc,
        }
    }
}

/// Selects whole records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckOut {
    /// Candidate sets. Empty covers every shelf in the namespace.
    #[serde(default)]
    pub checkout: Vec<CheckOutItem>,
    /// Filter applied to each candidate.
    #[serde(default)]
    pub filters: Filter,
    /// Sort keys, most significant first.
    #[serde(default)]
    pub sort: Vec<SortItem>,
    /// Maximum number of results. Must be at least 1.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of matches to skip.
    #[serde(default)]
    pub offset: usize,
}

impl CheckOut {
    /// A checkout of every shelf.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate set.
    #[must_use]
    pub fn item(mut self, item: CheckOutItem) -> Self {
        self.checkout.push(item);
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters = filter.into();
        self
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort(mut self, item: SortItem) -> Self {
        self.sort.push(item);
        self
    }

    /// Caps the result count.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips matches.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Replaces the record at a shelf path, or the value at a key path, if
/// the filter passes on the shelf record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revise {
    /// Shelf or key path.
    pub path: Path,
    /// Guard evaluated on the shelf record.
    #[serde(default)]
    pub filters: Filter,
    /// Replacement.
    pub data: Record,
}

impl Revise {
    /// An unconditional revise.
    pub fn new(path: Path, data: Record) -> Self {
        Self {
            path,
            filters: Filter::all(),
            data,
        }
    }

    /// Sets the guard filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters = filter.into();
        self
    }
}

/// Deletes a node, a key, or the entries that match a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remove {
    /// Node or key path.
    pub path: Path,
    /// Selects entries to delete. Ignored when a flag is set.
    #[serde(default)]
    pub filters: Filter,
    /// Delete the shelf at `path`.
    #[serde(default)]
    pub remove_shelf: bool,
    /// Delete the section at `path` and everything under it.
    #[serde(default)]
    pub remove_section: bool,
}

impl Remove {
    /// Removes a key, or filtered entries once a filter is set.
    pub fn new(path: Path) -> Self {
        Self {
            path,
            filters: Filter::all(),
            remove_shelf: false,
            remove_section: false,
        }
    }

    /// Deletes the shelf at `path`.
    pub fn shelf(path: Path) -> Self {
        Self {
            remove_shelf: true,
            ..Self::new(path)
        }
    }

    /// Deletes the section at `path`.
    pub fn section(path: Path) -> Self {
        Self {
            remove_section: true,
            ..Self::new(path)
        }
    }

    /// Sets the selection filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters = filter.into();
        self
    }
}

/// Resets records to the governing schema's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reset {
    /// Shelf or container path.
    pub path: Path,
    /// Selects shelves to reset. Ignored when a flag is set.
    #[serde(default)]
    pub filters: Filter,
    /// Reset the shelf at `path`.
    #[serde(default)]
    pub reset_shelf: bool,
    /// Reset every shelf below the container at `path`.
    #[serde(default)]
    pub reset_section: bool,
}

impl Reset {
    /// Resets the shelf at `path`, or the filtered direct child shelves of
    /// the container at `path`.
    pub fn new(path: Path) -> Self {
        Self {
            path,
            filters: Filter::all(),
            reset_shelf: false,
            reset_section: false,
        }
    }

    /// Resets the shelf at `path`.
    pub fn shelf(path: Path) -> Self {
        Self {
            reset_shelf: true,
            ..Self::new(path)
        }
    }

    /// Resets every shelf under `path`.
    pub fn section(path: Path) -> Self {
        Self {
            reset_section: true,
            ..Self::new(path)
        }
    }

    /// Sets the selection filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters = filter.into();
        self
    }
}

/// An ordered batch applied all-or-nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// The batch. May not contain transactions.
    pub queries: Vec<Query>,
}

macro_rules! impl_into_query {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for Query {
                fn from(query: $name) -> Self {
                    Query::$name(query)
                }
            }
        )*
    };
}

impl_into_query!(
    SetSchema,
    BuildSection,
    BuildShelf,
    Write,
    CheckOut,
    Revise,
    Remove,
    Reset,
    Transaction,
);

/// A matched record and where it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfEntry {
    /// Shelf path.
    pub path: Path,
    /// The whole record.
    pub record: Record,
}

/// What a query returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutput {
    /// CheckOut results, in result order.
    Records(Vec<ShelfEntry>),
    /// Number of nodes, shelves or entries the query changed.
    Ack {
        /// Count of affected items.
        affected: usize,
    },
    /// One output per transaction query, in order.
    Batch(Vec<QueryOutput>),
}

impl QueryOutput {
    /// The records of a CheckOut output.
    pub fn records(&self) -> Option<&[ShelfEntry]> {
        match self {
            QueryOutput::Records(entries) => Some(entries),
            _ => None,
        }
    }

    /// The count of an acknowledgement.
    pub fn affected(&self) -> Option<usize> {
        match self {
            QueryOutput::Ack { affected } => Some(*affected),
            _ => None,
        }
    }

    pub(crate) fn ack(affected: usize) -> Self {
        QueryOutput::Ack { affected }
    }
}
