//! Dynamic record value type.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A shelf record: string keys mapped to values, ordered by key.
pub type Record = BTreeMap<String, Value>;

/// An object stored as a type tag plus a binary payload.
///
/// The payload is never interpreted by the store; only the owner of the
/// type tag knows how to rebuild the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Opaque {
    /// Name of the payload's type.
    pub type_tag: String,
    /// Serialized object.
    pub payload: Vec<u8>,
}

impl Opaque {
    /// Create an opaque value.
    pub fn new(type_tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_tag: type_tag.into(),
            payload: payload.into(),
        }
    }
}

/// A dynamic record value.
///
/// Every value a shelf record can hold is one of these variants, including
/// nested maps, which are themselves records.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// 64-bit float. NaN cannot be encoded.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Array of values.
    Array(Vec<Value>),
    /// Nested record.
    Map(Record),
    /// Opaque binary-serializable object.
    Opaque(Opaque),
}

/// The variant of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `bool`
    Bool,
    /// `int`
    Integer,
    /// `float`
    Float,
    /// `str`
    Text,
    /// `bytes`
    Bytes,
    /// `datetime`
    DateTime,
    /// `list`
    Array,
    /// `dict`
    Map,
    /// `opaque`
    Opaque,
}

impl ValueKind {
    /// All kinds, in display order.
    pub const ALL: [ValueKind; 10] = [
        ValueKind::Null,
        ValueKind::Bool,
        ValueKind::Integer,
        ValueKind::Float,
        ValueKind::Text,
        ValueKind::Bytes,
        ValueKind::DateTime,
        ValueKind::Array,
        ValueKind::Map,
        ValueKind::Opaque,
    ];

    /// The short type name used in schemas and filters.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::DateTime => "datetime",
            ValueKind::Array => "list",
            ValueKind::Map => "dict",
            ValueKind::Opaque => "opaque",
        }
    }

    /// Look up a kind by its short type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Create a map value from key-value pairs.
    ///
    /// Later pairs overwrite earlier pairs with the same key.
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The variant of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Array(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Map,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is an integer or a float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get this value as a nested record, if it is a map.
    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Get this value as a mutable nested record, if it is a map.
    pub fn as_map_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Follow a sequence of map keys into nested values.
    ///
    /// An empty key sequence returns `self`.
    pub fn get_path<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Value> {
        keys.iter()
            .try_fold(self, |current, key| current.get(key.as_ref()))
    }

    /// Follow a sequence of map keys into nested values, mutably.
    pub fn get_path_mut<S: AsRef<str>>(&mut self, keys: &[S]) -> Option<&mut Value> {
        keys.iter().try_fold(self, |current, key| {
            current.as_map_mut().and_then(|map| map.get_mut(key.as_ref()))
        })
    }

    /// Total ordering across all values, used for sorting.
    ///
    /// Values of different kinds order by kind, except that integers and
    /// floats compare numerically with each other. Floats use IEEE total
    /// ordering.
    #[allow(clippy::cast_precision_loss)]
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.cmp_total(bv);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let ord = ak.cmp(bk).then_with(|| av.cmp_total(bv));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Opaque(a), Value::Opaque(b)) => a
                .type_tag
                .cmp(&b.type_tag)
                .then_with(|| a.payload.cmp(&b.payload)),
            _ => self.sort_rank().cmp(&other.sort_rank()),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Bytes(_) => 4,
            Value::DateTime(_) => 5,
            Value::Array(_) => 6,
            Value::Map(_) => 7,
            Value::Opaque(_) => 8,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Record> for Value {
    fn from(map: Record) -> Self {
        Value::Map(map)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
