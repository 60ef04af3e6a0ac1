//! Atomic batches.

use super::footprint::{self, Footprint};
use super::undo::UndoLog;
use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::query::{Query, QueryOutput};
use tracing::{debug, error, warn};

/// Runs an ordered batch of queries all-or-nothing.
///
/// The union of every query's lock footprint is acquired up front, in
/// canonical path order, and held until the batch commits or rolls back.
/// Queries then run one after another. Later queries see the effects of
/// earlier ones. If any query fails, everything the batch applied is
/// undone and the failure is reported with the query's zero-based index.
pub struct TransactionCoordinator<'a> {
    executor: &'a Executor,
}

impl<'a> TransactionCoordinator<'a> {
    /// Creates a coordinator over an executor.
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Runs the batch, returning one output per query.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` if the batch is too long or contains a transaction.
    /// - `LockTimeout` if the footprint cannot be acquired.
    /// - `TransactionAborted` wrapping the first query failure; the store
    ///   is restored to its state before the batch.
    pub fn run(&self, queries: Vec<Query>) -> CoreResult<Vec<QueryOutput>> {
        let max = self.executor.config().max_transaction_len;
        if queries.len() > max {
            return Err(CoreError::invalid_query(format!(
                "transaction has {} queries, the limit is {max}",
                queries.len()
            )));
        }
        if queries.iter().any(|q| matches!(q, Query::Transaction(_))) {
            return Err(CoreError::invalid_query("transactions cannot be nested"));
        }
        for (index, query) in queries.iter().enumerate() {
            self.executor
                .check(query)
                .map_err(|err| CoreError::transaction_aborted(index, err))?;
        }
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        debug!(len = queries.len(), "beginning transaction");
        let storage = self.executor.storage().as_ref();
        let _locks = footprint::acquire(storage, self.executor.config().lock_timeout, || {
            let mut footprint = Footprint::new();
            for query in &queries {
                footprint.merge(self.executor.footprint(query, true));
            }
            footprint
        })?;

        let mut undo = UndoLog::new();
        let mut outputs = Vec::with_capacity(queries.len());
        for (index, query) in queries.into_iter().enumerate() {
            let kind = query.kind();
            match self.executor.run_locked(query, &mut undo) {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    warn!(index, op = kind, error = %err, applied = undo.len(), "transaction failed, rolling back");
                    let failures = undo.rollback(storage, self.executor.catalog());
                    if failures > 0 {
                        error!(index, failures, "transaction rollback incomplete");
                    }
                    return Err(CoreError::transaction_aborted(index, err));
                }
            }
        }
        debug!(len = outputs.len(), mutations = undo.len(), "transaction committed");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::path::Path;
    use crate::query::{BuildSection, BuildShelf, CheckOut, CheckOutItem, Revise, Transaction, Write};
    use crate::schema::{FieldType, Schema};
    use hylla_codec::{Record, Value};
    use hylla_storage::InMemoryStorage;
    use std::sync::Arc;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn note(text: &str) -> Record {
        let mut r = Record::new();
        r.insert("text".into(), Value::from(text));
        r
    }

    fn executor() -> (Arc<InMemoryStorage>, Executor) {
        let storage = Arc::new(InMemoryStorage::new());
        let executor = Executor::new(storage.clone(), Config::default().max_transaction_len(4));
        (storage, executor)
    }

    fn notes() -> Query {
        BuildSection::new(None, "notes")
            .with_schema(Schema::new("Note").field("text", FieldType::Str))
            .into()
    }

    #[test]
    fn later_queries_see_earlier_ones() {
        let (_, executor) = executor();
        let outputs = TransactionCoordinator::new(&executor)
            .run(vec![
                notes(),
                BuildShelf::new(Some(p("notes")), "a").with_data(note("first")).into(),
                Revise::new(p("notes.a"), note("second")).into(),
                CheckOut::new().item(CheckOutItem::all(Some(p("notes")))).into(),
            ])
            .unwrap();
        assert_eq!(outputs.len(), 4);
        let records = outputs[3].records().unwrap();
        assert_eq!(records[0].record, note("second"));
    }

    #[test]
    fn failure_rolls_back_and_reports_index() {
        let (storage, executor) = executor();
        executor.execute(notes()).unwrap();
        let before = storage.snapshot();

        let err = executor
            .transaction(vec![
                BuildShelf::new(Some(p("notes")), "a").with_data(note("x")).into(),
                BuildShelf::new(Some(p("notes")), "b").with_data(note("y")).into(),
                Write::new(p("notes.a"), note("again")).into(),
            ])
            .unwrap_err();
        match err {
            CoreError::TransactionAborted { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, CoreError::AlreadyExists { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(storage.snapshot(), before);
        assert_eq!(storage.active_locks(), 0);
    }

    #[test]
    fn catalog_changes_roll_back() {
        let (_, executor) = executor();
        let err = executor
            .transaction(vec![notes(), Write::new(p("missing"), Record::new()).into()])
            .unwrap_err();
        assert!(matches!(err, CoreError::TransactionAborted { index: 1, .. }));
        assert!(executor.catalog().read().schemas().is_empty());
    }

    #[test]
    fn batch_shape_checks() {
        let (_, executor) = executor();
        assert!(executor.transaction(Vec::new()).unwrap().is_empty());

        let nested = Query::Transaction(Transaction { queries: vec![notes()] });
        assert!(matches!(
            executor.transaction(vec![nested]),
            Err(CoreError::InvalidQuery { .. })
        ));

        let too_long = (0..5).map(|_| Query::from(CheckOut::new())).collect();
        assert!(matches!(
            executor.transaction(too_long),
            Err(CoreError::InvalidQuery { .. })
        ));

        let bad = vec![notes(), CheckOut::new().limit(0).into()];
        assert!(matches!(
            executor.transaction(bad),
            Err(CoreError::TransactionAborted { index: 1, .. })
        ));
        assert!(executor.catalog().read().schemas().is_empty());
    }

    #[test]
    fn execute_routes_transactions() {
        let (_, executor) = executor();
        let output = executor
            .execute(Query::Transaction(Transaction { queries: vec![notes()] }))
            .unwrap();
        assert_eq!(output, QueryOutput::Batch(vec![QueryOutput::ack(1)]));
    }
}
