//! Test fixtures and store helpers.
//!
//! Provides ready-made libraries, a storage backend that fails on demand,
//! and tracing setup for test runs.

use hylla_codec::{Record, Value};
use hylla_core::{BuildSection, BuildShelf, Config, Database, FieldType, Path, Schema};
use hylla_storage::{
    ChildEntry, InMemoryStorage, LockGuard, LockMode, NodeKind, NodeSnapshot, StorageBackend,
    StorageError, StorageResult,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to the test harness.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Parses a path, panicking on invalid input.
pub fn path(s: &str) -> Path {
    Path::parse(s).expect("invalid test path")
}

/// The schema of the sample `lib` section.
pub fn book_schema() -> Schema {
    Schema::new("Book")
        .field("title", FieldType::Str)
        .field("year", FieldType::Int)
        .field_with_default("tags", FieldType::list(FieldType::Str), Value::Array(Vec::new()))
}

/// A record conforming to [`book_schema`].
pub fn book(title: &str, year: i64) -> Record {
    let mut record = Record::new();
    record.insert("title".into(), Value::from(title));
    record.insert("year".into(), Value::Integer(year));
    record
}

/// Shelves of the sample library: `(name, title, year)`.
pub const SAMPLE_BOOKS: [(&str, &str, i64); 4] = [
    ("dune", "Dune", 1965),
    ("emma", "Emma", 1815),
    ("solaris", "Solaris", 1961),
    ("ubik", "Ubik", 1969),
];

/// A database over in-memory storage, with access to the raw storage for
/// state comparisons.
pub struct TestLibrary {
    /// The database instance.
    pub db: Database,
    storage: Arc<InMemoryStorage>,
}

impl TestLibrary {
    /// An empty library.
    pub fn empty() -> Self {
        Self::with_config(Config::default())
    }

    /// An empty library with custom configuration.
    pub fn with_config(config: Config) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self {
            db: Database::open(storage.clone(), config),
            storage,
        }
    }

    /// A library with section `lib` under [`book_schema`] holding the
    /// [`SAMPLE_BOOKS`].
    pub fn with_books() -> Self {
        let library = Self::empty();
        library.seed_books();
        library
    }

    /// Builds `lib` and the sample shelves.
    pub fn seed_books(&self) {
        self.db
            .execute(BuildSection::new(None, "lib").with_schema(book_schema()).into())
            .expect("failed to build lib");
        for (name, title, year) in SAMPLE_BOOKS {
            self.db
                .execute(
                    BuildShelf::new(Some(path("lib")), name)
                        .with_data(book(title, year))
                        .into(),
                )
                .expect("failed to build sample shelf");
        }
    }

    /// The underlying storage.
    pub fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }

    /// A copy of every stored node.
    pub fn snapshot(&self) -> BTreeMap<Vec<String>, NodeSnapshot> {
        self.storage.snapshot()
    }
}

impl std::ops::Deref for TestLibrary {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with the sample library.
pub fn with_books<F, R>(f: F) -> R
where
    F: FnOnce(&TestLibrary) -> R,
{
    let library = TestLibrary::with_books();
    f(&library)
}

/// The sample library over [`FaultyStorage`], built while healthy.
pub fn faulty_library() -> (Database, Arc<FaultyStorage>) {
    let storage = Arc::new(FaultyStorage::new());
    let db = Database::open(storage.clone(), Config::default());
    db.execute(BuildSection::new(None, "lib").with_schema(book_schema()).into())
        .expect("failed to build lib");
    for (name, title, year) in SAMPLE_BOOKS {
        db.execute(
            BuildShelf::new(Some(path("lib")), name)
                .with_data(book(title, year))
                .into(),
        )
        .expect("failed to build sample shelf");
    }
    (db, storage)
}

/// In-memory storage that fails one mutating call on request.
///
/// Counts `write_record`, `create_node` and `delete_node` calls. After
/// [`FaultyStorage::fail_after`]`(n)`, the call after the next `n` fails
/// with [`StorageError::Backend`] without touching the data. Later calls
/// run normally. [`FaultyStorage::slow_writes`] stretches every record
/// write, which keeps a writer's locks held long enough to race against.
#[derive(Debug, Default)]
pub struct FaultyStorage {
    inner: InMemoryStorage,
    remaining: Mutex<Option<usize>>,
    write_delay: Mutex<Duration>,
}

impl FaultyStorage {
    /// Healthy storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a fault after `n` more successful mutating calls.
    pub fn fail_after(&self, n: usize) {
        *self.remaining.lock() = Some(n);
    }

    /// Disarms a pending fault.
    pub fn heal(&self) {
        *self.remaining.lock() = None;
    }

    /// Sleeps for `delay` before each `write_record`. Zero turns it off.
    pub fn slow_writes(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// True while a fault is armed and has not fired.
    pub fn is_armed(&self) -> bool {
        self.remaining.lock().is_some()
    }

    /// A copy of every stored node.
    pub fn snapshot(&self) -> BTreeMap<Vec<String>, NodeSnapshot> {
        self.inner.snapshot()
    }

    fn tick(&self, op: &str) -> StorageResult<()> {
        let mut remaining = self.remaining.lock();
        match *remaining {
            Some(0) => {
                *remaining = None;
                tracing::debug!(op, "injecting storage fault");
                Err(StorageError::Backend(format!("injected fault in {op}")))
            }
            Some(n) => {
                *remaining = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StorageBackend for FaultyStorage {
    fn read_record(&self, shelf: &[String]) -> StorageResult<Vec<u8>> {
        self.inner.read_record(shelf)
    }

    fn write_record(&self, shelf: &[String], record: &[u8]) -> StorageResult<()> {
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.tick("write_record")?;
        self.inner.write_record(shelf, record)
    }

    fn list_children(&self, node: &[String]) -> StorageResult<Vec<ChildEntry>> {
        self.inner.list_children(node)
    }

    fn create_node(&self, parent: &[String], name: &str, kind: NodeKind) -> StorageResult<()> {
        self.tick("create_node")?;
        self.inner.create_node(parent, name, kind)
    }

    fn delete_node(&self, node: &[String]) -> StorageResult<()> {
        self.tick("delete_node")?;
        self.inner.delete_node(node)
    }

    fn acquire_lock(
        &self,
        path: &[String],
        mode: LockMode,
        timeout: Duration,
    ) -> StorageResult<LockGuard> {
        self.inner.acquire_lock(path, mode, timeout)
    }
}
