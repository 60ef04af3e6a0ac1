//! Atomicity of transactions and single operations under failures.

use hylla_codec::{Record, Value};
use hylla_core::{
    BuildSection, BuildShelf, CheckOut, Config, CoreError, FieldType, Query, Remove,
    Reset, Revise, Schema, SetSchema, Transaction, Write,
};
use hylla_testkit::prelude::*;

fn mixed_batch() -> Vec<Query> {
    let mut meta = Record::new();
    meta.insert("shelf".into(), Value::from("B3"));
    vec![
        Revise::new(path("lib.dune"), book("Dune", 1966)).into(),
        BuildShelf::new(Some(path("lib")), "neuromancer")
            .with_data(book("Neuromancer", 1984))
            .with_metadata(meta)
            .into(),
        Remove::shelf(path("lib.emma")).into(),
        BuildSection::new(None, "archive")
            .with_schema(Schema::new("Box").field("label", FieldType::Str))
            .into(),
        Reset::section(path("lib")).into(),
        SetSchema::section(path("lib"), Schema::new("Loose").allow_extra()).into(),
        Remove::section(path("archive")).into(),
    ]
}

#[test]
fn a_failing_query_undoes_the_batch() {
    init_tracing();
    let library = TestLibrary::with_books();
    let before = library.snapshot();

    let err = library
        .transaction(vec![
            Revise::new(path("lib.dune"), book("Dune", 1966)).into(),
            Remove::shelf(path("lib.emma")).into(),
            Write::new(path("lib.ubik"), book("Ubik", 1969)).into(),
        ])
        .unwrap_err();
    match err {
        CoreError::TransactionAborted { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(*source, CoreError::AlreadyExists { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(library.snapshot(), before);
    assert_eq!(library.storage().active_locks(), 0);
}

#[test]
fn invalid_queries_fail_before_anything_runs() {
    let library = TestLibrary::with_books();
    let before = library.snapshot();
    let err = library
        .transaction(vec![
            Remove::shelf(path("lib.emma")).into(),
            CheckOut::new().limit(0).into(),
        ])
        .unwrap_err();
    assert!(matches!(err, CoreError::TransactionAborted { index: 1, .. }));
    assert_eq!(library.snapshot(), before);
}

#[test]
fn storage_faults_at_every_step_roll_back() {
    init_tracing();
    let mut succeeded = false;
    for k in 0..64 {
        let (db, storage) = faulty_library();
        let before = storage.snapshot();
        let schema_before = db.schema(Some(&path("lib")));

        storage.fail_after(k);
        match db.transaction(mixed_batch()) {
            Ok(outputs) => {
                assert_eq!(outputs.len(), mixed_batch().len());
                assert!(storage.is_armed(), "fault {k} fired but the batch succeeded");
                succeeded = true;
                break;
            }
            Err(CoreError::TransactionAborted { source, .. }) => {
                assert!(matches!(*source, CoreError::Storage(_)), "fault {k}: {source}");
                assert_eq!(storage.snapshot(), before, "fault {k} left changes behind");
                assert_eq!(db.schema(Some(&path("lib"))), schema_before);
                assert!(db.schema(Some(&path("archive"))).is_none());
                assert!(db.metadata(&path("lib.neuromancer")).is_none());
            }
            Err(other) => panic!("fault {k}: unexpected error: {other}"),
        }
    }
    assert!(succeeded, "the batch never ran to completion");
}

#[test]
fn single_operations_roll_back_partial_work() {
    let (db, storage) = faulty_library();
    let before = storage.snapshot();

    // Resetting four shelves fails on the third write.
    storage.fail_after(2);
    let err = db.execute(Reset::section(path("lib")).into()).unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert_eq!(storage.snapshot(), before);

    // The shelf node is created, then its record write fails.
    storage.fail_after(1);
    let err = db
        .execute(
            BuildShelf::new(Some(path("lib")), "neuromancer")
                .with_data(book("Neuromancer", 1984))
                .into(),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert_eq!(storage.snapshot(), before);

    // Healthy again.
    assert!(!storage.is_armed());
    db.execute(Reset::section(path("lib")).into()).unwrap();
}

#[test]
fn successful_batches_apply_in_order() {
    let library = TestLibrary::with_books();
    let outputs = library
        .transaction(vec![
            BuildShelf::new(Some(path("lib")), "neuromancer")
                .with_data(book("Neuromancer", 1984))
                .into(),
            Revise::new(path("lib.neuromancer"), book("Neuromancer", 1985)).into(),
            CheckOut::new()
                .item(hylla_core::CheckOutItem::named(Some(path("lib")), ["neuromancer"]))
                .into(),
        ])
        .unwrap();
    let records = outputs[2].records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record["year"], Value::Integer(1985));
}

#[test]
fn oversized_and_nested_batches_are_rejected() {
    let library = TestLibrary::with_config(Config::default().max_transaction_len(2));
    let reads = || -> Query { CheckOut::new().into() };
    let err = library
        .transaction(vec![reads(), reads(), reads()])
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery { .. }));

    let nested = Query::Transaction(Transaction {
        queries: vec![reads()],
    });
    let err = library.transaction(vec![nested]).unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery { .. }));
}
