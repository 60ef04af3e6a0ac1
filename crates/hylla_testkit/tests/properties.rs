//! Property tests over generated paths, records and filters.

use hylla_codec::Value;
use hylla_core::{
    BuildSection, BuildShelf, CheckOut, CheckOutItem, Condition, Database, NodeType, Operand,
    Operator, Path, Predicate, Schema, SetSchema, SortItem,
};
use hylla_testkit::prelude::*;
use proptest::prelude::*;

fn open_library(db: &Database) {
    db.execute(SetSchema::library(Schema::new("Open").allow_extra()).into())
        .unwrap();
}

fn year(op: Operator, bound: i64) -> Condition {
    Condition::new(
        Operand::Path(path("year")),
        op,
        Operand::Literal(Value::Integer(bound)),
    )
    .unwrap()
}

fn names(db: &Database, query: CheckOut) -> Vec<String> {
    db.checkout(query)
        .unwrap()
        .into_iter()
        .map(|entry| entry.path.to_string())
        .collect()
}

fn every_book() -> CheckOut {
    CheckOut::new().item(CheckOutItem::all(Some(path("lib"))))
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn resolution_is_deterministic(shelf in path_strategy(4), extra in name_strategy()) {
        let library = TestLibrary::empty();
        open_library(&library);
        let segments = shelf.segments();
        let mut parent: Option<Path> = None;
        for name in &segments[..segments.len() - 1] {
            library.execute(BuildSection::new(parent.clone(), name.as_str()).into()).unwrap();
            parent = Some(parent.map_or_else(|| path(name), |p| p.join(&path(name))));
        }
        let name = &segments[segments.len() - 1];
        library.execute(BuildShelf::new(parent, name.as_str()).into()).unwrap();

        let first = library.resolve(&shelf).unwrap();
        prop_assert_eq!(first.node_type, NodeType::Shelf);
        prop_assert!(first.key_path.is_empty());
        prop_assert_eq!(&library.resolve(&shelf).unwrap(), &first);

        // Past a shelf, segments become record keys.
        let deeper = shelf.join(&path(&extra));
        let located = library.resolve(&deeper).unwrap();
        prop_assert_eq!(located.node, shelf);
        prop_assert_eq!(located.key_path, vec![extra]);
    }

    #[test]
    fn records_come_back_unchanged(record in record_strategy(), name in name_strategy()) {
        let library = TestLibrary::empty();
        open_library(&library);
        library
            .execute(BuildShelf::new(None, name.as_str()).with_data(record.clone()).into())
            .unwrap();
        let found = library
            .checkout(CheckOut::new().item(CheckOutItem::named(None, [name.as_str()])))
            .unwrap();
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(&found[0].record, &record);
    }

    #[test]
    fn pages_are_slices(offset in 0usize..6, limit in 1usize..6) {
        let library = TestLibrary::with_books();
        let sorted = || every_book().sort(SortItem::asc(path("year")));
        let full = names(&library, sorted());
        let page = names(&library, sorted().offset(offset).limit(limit));
        let expected: Vec<_> = full.iter().skip(offset).take(limit).cloned().collect();
        prop_assert_eq!(page, expected);
    }

    #[test]
    fn and_is_intersection(low in 1800i64..2000, high in 1800i64..2000) {
        let library = TestLibrary::with_books();
        let above = names(&library, every_book().filter(year(Operator::Gt, low)));
        let below = names(&library, every_book().filter(year(Operator::Lt, high)));
        let both = names(
            &library,
            every_book().filter(
                Predicate::leaf(year(Operator::Gt, low)).and(Predicate::leaf(year(Operator::Lt, high))),
            ),
        );
        let expected: Vec<_> = above.into_iter().filter(|n| below.contains(n)).collect();
        prop_assert_eq!(both, expected);
    }

    #[test]
    fn generated_books_pass_validation(record in book_strategy()) {
        let schema = book_schema();
        prop_assert!(schema.validate(&record).is_ok());

        let mut untitled = record.clone();
        untitled.remove("title");
        prop_assert!(schema.validate(&untitled).is_err());

        let mut extra = record;
        extra.insert("isbn".into(), Value::from("0-441-17271-7"));
        prop_assert!(schema.validate(&extra).is_err());
    }
}
