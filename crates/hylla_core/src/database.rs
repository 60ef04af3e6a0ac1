//! Store facade.

use crate::config::Config;
use crate::error::CoreResult;
use crate::executor::Executor;
use crate::namespace::{Location, Resolver};
use crate::path::Path;
use crate::query::{CheckOut, Query, QueryOutput, ShelfEntry};
use crate::schema::Schema;
use hylla_codec::Record;
use hylla_storage::{InMemoryStorage, StorageBackend};
use std::sync::Arc;

/// The main store handle.
///
/// `Database` wraps an [`Executor`] over a storage backend and is the
/// single entry point front ends submit queries to.
///
/// ```
/// use hylla_core::{BuildSection, BuildShelf, CheckOut, CheckOutItem, Database, FieldType, Path, Schema};
/// use hylla_codec::{Record, Value};
///
/// let db = Database::open_in_memory();
/// let schema = Schema::new("Book")
///     .field("title", FieldType::Str)
///     .field("year", FieldType::Int);
/// db.execute(BuildSection::new(None, "lib").with_schema(schema).into())?;
///
/// let mut data = Record::new();
/// data.insert("title".into(), Value::from("Dune"));
/// data.insert("year".into(), Value::Integer(1965));
/// let lib = Path::parse("lib")?;
/// db.execute(BuildShelf::new(Some(lib.clone()), "book1").with_data(data.clone()).into())?;
///
/// let found = db.checkout(CheckOut::new().item(CheckOutItem::named(Some(lib), ["book1"])))?;
/// assert_eq!(found[0].record, data);
/// # Ok::<(), hylla_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct Database {
    executor: Executor,
}

impl Database {
    /// Opens a store over `storage`.
    ///
    /// Schemas and metadata live in the returned handle, not in storage.
    pub fn open(storage: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            executor: Executor::new(storage, config),
        }
    }

    /// Opens an empty in-memory store with default configuration.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open(Arc::new(InMemoryStorage::new()), Config::default())
    }

    /// Executes one query.
    ///
    /// # Errors
    ///
    /// Returns the query's typed failure; the store is unchanged.
    pub fn execute(&self, query: Query) -> CoreResult<QueryOutput> {
        self.executor.execute(query)
    }

    /// Runs a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAborted` with the failing query's index; the
    /// store is unchanged.
    pub fn transaction(&self, queries: Vec<Query>) -> CoreResult<Vec<QueryOutput>> {
        self.executor.transaction(queries)
    }

    /// Runs a CheckOut and returns its entries.
    ///
    /// # Errors
    ///
    /// See [`Database::execute`].
    pub fn checkout(&self, query: CheckOut) -> CoreResult<Vec<ShelfEntry>> {
        match self.executor.execute(Query::CheckOut(query))? {
            QueryOutput::Records(entries) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    /// The schema assigned directly to a section, or to the library for
    /// `None`.
    pub fn schema(&self, section: Option<&Path>) -> Option<Schema> {
        let root = Path::root();
        let key = section.unwrap_or(&root);
        self.executor.catalog().read().schemas().get(key).cloned()
    }

    /// The schema that governs a shelf, with the container it is assigned
    /// to.
    pub fn governing_schema(&self, shelf: &Path) -> Option<(Path, Schema)> {
        let parent = shelf.parent().unwrap_or_default();
        self.executor
            .catalog()
            .read()
            .schemas()
            .governing(&parent)
            .map(|(at, schema)| (at.clone(), schema.clone()))
    }

    /// Metadata given to a node when it was built.
    pub fn metadata(&self, node: &Path) -> Option<Record> {
        self.executor.catalog().read().metadata(node).cloned()
    }

    /// Resolves a path against the current namespace.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if the path leaves the namespace before
    /// reaching a shelf.
    pub fn resolve(&self, path: &Path) -> CoreResult<Location> {
        Resolver::new(self.executor.storage().as_ref()).resolve(path)
    }

    /// The executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        self.executor.storage()
    }
}
