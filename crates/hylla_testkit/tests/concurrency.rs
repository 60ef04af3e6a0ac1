//! Concurrent access through the lock table.

use hylla_codec::Value;
use hylla_core::{
    BuildSection, BuildShelf, CheckOut, CheckOutItem, Condition, Config, CoreError, Database,
    Operand, Operator, Revise,
};
use hylla_storage::{LockMode, StorageBackend};
use hylla_testkit::prelude::*;
use std::time::Duration;

fn segments(s: &str) -> Vec<String> {
    path(s).segments().to_vec()
}

/// Adds section `other` with shelves `old` (1965) and `new` (1).
fn seed_other(db: &Database) {
    db.execute(BuildSection::new(None, "other").with_schema(book_schema()).into())
        .unwrap();
    for (name, year) in [("old", 1965), ("new", 1)] {
        db.execute(
            BuildShelf::new(Some(path("other")), name)
                .with_data(book(name, year))
                .into(),
        )
        .unwrap();
    }
}

/// `year == lib.dune.year`, read from every shelf of `other`.
fn same_year_as_dune() -> CheckOut {
    let same = Condition::new(
        Operand::Path(path("year")),
        Operator::Eq,
        Operand::Path(path("lib.dune.year")),
    )
    .unwrap();
    CheckOut::new()
        .item(CheckOutItem::all(Some(path("other"))))
        .filter(same)
}

#[test]
fn builds_on_disjoint_shelves() {
    init_tracing();
    let library = TestLibrary::with_books();
    let result = run_concurrent(&library, 4, 25, |db, thread, i| {
        let name = format!("t{thread}_{i}");
        db.execute(
            BuildShelf::new(Some(path("lib")), name.as_str())
                .with_data(book(&name, 2000 + i as i64))
                .into(),
        )?;
        Ok(())
    });
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, 100);

    let all = library
        .checkout(CheckOut::new().item(CheckOutItem::all(Some(path("lib")))))
        .unwrap();
    assert_eq!(all.len(), 100 + SAMPLE_BOOKS.len());
    assert_eq!(library.storage().active_locks(), 0);
}

#[test]
fn revisions_of_one_shelf_serialize() {
    let library = TestLibrary::with_books();
    let result = run_concurrent(&library, 8, 20, |db, thread, i| {
        db.execute(Revise::new(path("lib.dune"), book("Dune", (thread * 100 + i) as i64)).into())?;
        let found = db.checkout(
            CheckOut::new().item(CheckOutItem::named(Some(path("lib")), ["dune"])),
        )?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record["title"], Value::from("Dune"));
        Ok(())
    });
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.total_ops(), 160);
    assert_eq!(library.storage().active_locks(), 0);
}

#[test]
fn contended_locks_time_out() {
    let library =
        TestLibrary::with_config(Config::default().lock_timeout(Duration::from_millis(50)));
    library.seed_books();

    let guard = library
        .storage()
        .acquire_lock(&segments("lib.dune"), LockMode::Exclusive, Duration::from_secs(1))
        .unwrap();

    let err = library
        .execute(Revise::new(path("lib.dune"), book("Dune", 1966)).into())
        .unwrap_err();
    assert!(matches!(err, CoreError::LockTimeout { ref path } if path == "lib.dune"));

    let err = library
        .checkout(CheckOut::new().item(CheckOutItem::all(Some(path("lib")))))
        .unwrap_err();
    assert!(matches!(err, CoreError::LockTimeout { .. }));

    // Other shelves stay available.
    library
        .execute(Revise::new(path("lib.emma"), book("Emma", 1816)).into())
        .unwrap();

    drop(guard);
    library
        .execute(Revise::new(path("lib.dune"), book("Dune", 1966)).into())
        .unwrap();
}

#[test]
fn readers_share() {
    let library =
        TestLibrary::with_config(Config::default().lock_timeout(Duration::from_millis(50)));
    library.seed_books();
    let _guard = library
        .storage()
        .acquire_lock(&segments("lib.dune"), LockMode::Shared, Duration::from_secs(1))
        .unwrap();

    let found = library
        .checkout(CheckOut::new().item(CheckOutItem::named(Some(path("lib")), ["dune"])))
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn filters_never_see_rolled_back_writes() {
    init_tracing();
    let (db, storage) = faulty_library();
    seed_other(&db);

    // Dune is rewritten to year 1 about 200ms in, the Emma write fails,
    // and the rollback lands about 400ms later.
    storage.slow_writes(Duration::from_millis(200));
    storage.fail_after(1);

    let (aborted, found) = std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            db.transaction(vec![
                Revise::new(path("lib.dune"), book("Dune", 1)).into(),
                Revise::new(path("lib.emma"), book("Emma", 1816)).into(),
            ])
        });
        let reader = scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(300));
            db.checkout(same_year_as_dune())
        });
        (writer.join().unwrap(), reader.join().unwrap())
    });
    storage.slow_writes(Duration::ZERO);

    assert!(matches!(aborted, Err(CoreError::TransactionAborted { index: 1, .. })));
    let names: Vec<_> = found.unwrap().iter().map(|e| e.path.to_string()).collect();
    assert_eq!(names, ["other.old"]);

    let dune = db
        .checkout(CheckOut::new().item(CheckOutItem::named(Some(path("lib")), ["dune"])))
        .unwrap();
    assert_eq!(dune[0].record["year"], Value::Integer(1965));
}

#[test]
fn filter_operand_shelves_are_locked() {
    let library =
        TestLibrary::with_config(Config::default().lock_timeout(Duration::from_millis(50)));
    library.seed_books();
    seed_other(&library);

    let guard = library
        .storage()
        .acquire_lock(&segments("lib.dune"), LockMode::Exclusive, Duration::from_secs(1))
        .unwrap();
    let err = library.checkout(same_year_as_dune()).unwrap_err();
    assert!(matches!(err, CoreError::LockTimeout { ref path } if path == "lib.dune"));

    drop(guard);
    let found = library.checkout(same_year_as_dune()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(library.storage().active_locks(), 0);
}
