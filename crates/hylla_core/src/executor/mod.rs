//! Query execution.
//!
//! Every query runs in three steps: its lock footprint is acquired, a plan
//! of mutations is computed against the locked namespace, and the plan is
//! applied through an [`UndoLog`]. A failure while applying rolls the
//! query back, so single queries are atomic.

mod checkout;
mod plan;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::namespace::{NodeType, Resolver};
use crate::path::{is_valid_name, Path};
use crate::query::{Query, QueryOutput};
use crate::schema::SchemaRegistry;
use crate::transaction::{footprint, Footprint, TransactionCoordinator, UndoLog};
use hylla_storage::{LockMode, StorageBackend};
use parking_lot::RwLock;
use plan::Planner;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Runs queries against a storage backend.
///
/// The executor owns the catalog (schemas and metadata) and is safe to
/// share between threads. Queries on disjoint parts of the namespace run
/// concurrently.
pub struct Executor {
    storage: Arc<dyn StorageBackend>,
    catalog: RwLock<Catalog>,
    config: Config,
}

impl Executor {
    /// Creates an executor with an empty catalog.
    pub fn new(storage: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            storage,
            catalog: RwLock::new(Catalog::new()),
            config,
        }
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// The catalog.
    pub fn catalog(&self) -> &RwLock<Catalog> {
        &self.catalog
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Executes one query. Transactions are handed to a
    /// [`TransactionCoordinator`].
    ///
    /// # Errors
    ///
    /// Returns the typed failure of the query. A failed query leaves the
    /// store as it was.
    pub fn execute(&self, query: Query) -> CoreResult<QueryOutput> {
        if let Query::Transaction(transaction) = query {
            return TransactionCoordinator::new(self)
                .run(transaction.queries)
                .map(QueryOutput::Batch);
        }
        self.check(&query)?;
        debug!(op = query.kind(), path = %query.target(), "executing query");

        let _locks = footprint::acquire(self.storage.as_ref(), self.config.lock_timeout, || {
            self.footprint(&query, false)
        })?;
        let mut undo = UndoLog::new();
        match self.run_locked(query, &mut undo) {
            Ok(output) => Ok(output),
            Err(err) => {
                if !undo.is_empty() {
                    warn!(error = %err, applied = undo.len(), "query failed while applying, rolling back");
                    let failures = undo.rollback(self.storage.as_ref(), &self.catalog);
                    if failures > 0 {
                        error!(failures, "rollback incomplete");
                    }
                }
                Err(err)
            }
        }
    }

    /// Static checks that need no namespace access.
    pub(crate) fn check(&self, query: &Query) -> CoreResult<()> {
        if let Some(filter) = query.filter() {
            if filter.depth() > self.config.max_filter_depth {
                return Err(CoreError::malformed_filter(format!(
                    "filter nesting depth {} exceeds the limit of {}",
                    filter.depth(),
                    self.config.max_filter_depth
                )));
            }
        }
        if let Query::CheckOut(q) = query {
            checkout::check_shape(q)?;
        }
        Ok(())
    }

    /// Plans and applies a query. The caller must hold its footprint.
    pub(crate) fn run_locked(&self, query: Query, undo: &mut UndoLog) -> CoreResult<QueryOutput> {
        let plan = {
            let catalog = self.catalog.read();
            Planner::new(self.storage.as_ref(), &catalog).plan(query)?
        };
        undo.apply_all(self.storage.as_ref(), &self.catalog, plan.mutations)?;
        Ok(plan.output)
    }

    /// The locks a query needs, computed from the namespace as it is now.
    ///
    /// Mutations lock their target node exclusively; builds also lock the
    /// parent, since they change its children. A target that does not
    /// resolve is locked by its full path. Inside a transaction CheckOut
    /// items are locked exclusively as well. Shelves that filter operands
    /// read from outside the record under test are locked shared.
    pub(crate) fn footprint(&self, query: &Query, in_transaction: bool) -> Footprint {
        let mut footprint = Footprint::new();
        let resolver = Resolver::new(self.storage.as_ref());
        let node_of = |path: &Path| {
            resolver
                .resolve(path)
                .map_or_else(|_| path.clone(), |location| location.node)
        };
        match query {
            Query::SetSchema(q) => {
                if let Ok(target) = SchemaRegistry::target(q.path.as_ref(), q.is_library) {
                    footprint.exclusive(&target);
                }
            }
            Query::BuildSection(q) => build(&mut footprint, q.path.as_ref(), &q.name),
            Query::BuildShelf(q) => build(&mut footprint, q.path.as_ref(), &q.name),
            Query::Write(q) => footprint.exclusive(&node_of(&q.path)),
            Query::Revise(q) => footprint.exclusive(&node_of(&q.path)),
            Query::Remove(q) => footprint.exclusive(&node_of(&q.path)),
            Query::Reset(q) => footprint.exclusive(&node_of(&q.path)),
            Query::CheckOut(q) => {
                let mode = if in_transaction {
                    LockMode::Exclusive
                } else {
                    LockMode::Shared
                };
                if q.checkout.is_empty() {
                    footprint.lock(&Path::root(), mode);
                }
                for item in &q.checkout {
                    let path = item.path.clone().unwrap_or_default();
                    footprint.lock(&node_of(&path), mode);
                }
                for shelf in checkout::candidates(&resolver, &q.checkout).unwrap_or_default() {
                    footprint.shared(&shelf);
                }
            }
            Query::Transaction(q) => {
                for query in &q.queries {
                    footprint.merge(self.footprint(query, true));
                }
            }
        }
        if let Some(filter) = query.filter() {
            for operand in filter.operand_paths() {
                if let Ok(location) = resolver.resolve(operand) {
                    if location.node_type == NodeType::Shelf {
                        footprint.shared(&location.node);
                    }
                }
            }
        }
        footprint
    }

    /// Runs a batch atomically. Shorthand for
    /// [`TransactionCoordinator::run`].
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::run`].
    pub fn transaction(&self, queries: Vec<Query>) -> CoreResult<Vec<QueryOutput>> {
        TransactionCoordinator::new(self).run(queries)
    }
}

fn build(footprint: &mut Footprint, parent: Option<&Path>, name: &str) {
    let parent = parent.cloned().unwrap_or_default();
    footprint.exclusive(&parent);
    if is_valid_name(name) {
        footprint.exclusive(&parent.child_trusted(name));
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
