//! Property-based test generators using proptest.
//!
//! Strategies produce valid names, paths, values and records, so
//! properties can assume their inputs pass the store's own checks.

use chrono::{DateTime, Utc};
use hylla_codec::{Opaque, Record, Value};
use hylla_core::Path;
use proptest::prelude::*;

/// Strategy for valid node and field names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,6}(_[a-z0-9]{1,3})?").expect("Invalid regex")
}

/// Strategy for valid paths of 1 to `max_len` segments.
pub fn path_strategy(max_len: usize) -> impl Strategy<Value = Path> {
    prop::collection::vec(name_strategy(), 1..=max_len.max(1))
        .prop_map(|segments| Path::from_segments(segments).expect("generated names are valid"))
}

/// Strategy for UTC timestamps between 1970 and 2100.
pub fn datetime_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        DateTime::from_timestamp(secs, nanos).expect("timestamp in range")
    })
}

/// Strategy for scalar values of every kind. Floats are finite.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("finite floats only", |f| f.is_finite())
            .prop_map(Value::Float),
        "[ -~]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        datetime_strategy().prop_map(Value::DateTime),
        ("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..8))
            .prop_map(|(tag, payload)| Value::Opaque(Opaque::new(tag, payload))),
    ]
}

/// Strategy for nested values: scalars, lists and dicts up to a small
/// depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(name_strategy(), inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for records with arbitrary contents.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(name_strategy(), value_strategy(), 0..6)
}

/// Strategy for records conforming to
/// [`book_schema`](crate::fixtures::book_schema).
pub fn book_strategy() -> impl Strategy<Value = Record> {
    (
        "[A-Za-z ]{1,12}",
        1000i64..2100,
        prop::option::of(prop::collection::vec("[a-z]{1,6}", 0..3)),
    )
        .prop_map(|(title, year, tags)| {
            let mut record = crate::fixtures::book(&title, year);
            if let Some(tags) = tags {
                record.insert(
                    "tags".into(),
                    Value::Array(tags.into_iter().map(Value::Text).collect()),
                );
            }
            record
        })
}

/// Proptest configuration for testing.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hylla_core::is_valid_name;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn names_are_valid(name in name_strategy()) {
            prop_assert!(is_valid_name(&name));
        }

        #[test]
        fn paths_reparse(path in path_strategy(5)) {
            prop_assert_eq!(Path::parse(&path.to_string()).unwrap(), path);
        }

        #[test]
        fn books_match_the_schema(record in book_strategy()) {
            prop_assert!(crate::fixtures::book_schema().validate(&record).is_ok());
        }
    }
}
