//! Field types and field definitions.

use super::Schema;
use hylla_codec::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The type a schema field requires.
///
/// Matching is strict: an `Int` field does not accept a float and a
/// `Str` field does not accept a number. `Number` accepts either numeric
/// kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Any value.
    Any,
    /// Only null.
    Null,
    /// A boolean.
    Bool,
    /// An integer.
    Int,
    /// A float.
    Float,
    /// An integer or a float.
    Number,
    /// Text.
    Str,
    /// A byte string.
    Bytes,
    /// A timestamp.
    #[serde(rename = "datetime")]
    DateTime,
    /// A list whose elements all have the inner type.
    List(Box<FieldType>),
    /// A map whose values all have the inner type. Keys are free.
    Dict(Box<FieldType>),
    /// Null or the inner type.
    Optional(Box<FieldType>),
    /// An opaque object of any type tag.
    Opaque,
    /// An opaque object with the given type tag.
    OpaqueOf(String),
    /// A nested record validated against another schema.
    Schema(Box<Schema>),
}

impl FieldType {
    /// A list of `inner`.
    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    /// A map with `inner` values.
    pub fn dict(inner: FieldType) -> Self {
        FieldType::Dict(Box::new(inner))
    }

    /// Null or `inner`.
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// A nested record governed by `schema`.
    pub fn schema(schema: Schema) -> Self {
        FieldType::Schema(Box::new(schema))
    }

    /// Checks `value` against this type, appending one message per
    /// violation to `out`. `path` names the value in messages.
    pub(crate) fn check(&self, value: &Value, path: &str, out: &mut Vec<String>) {
        let mismatch = |out: &mut Vec<String>| {
            out.push(format!(
                "field {path}: expected {}, found {}",
                self,
                value.kind()
            ));
        };
        match self {
            FieldType::Any => {}
            FieldType::Null => expect_kind(value, ValueKind::Null, || mismatch(out)),
            FieldType::Bool => expect_kind(value, ValueKind::Bool, || mismatch(out)),
            FieldType::Int => expect_kind(value, ValueKind::Integer, || mismatch(out)),
            FieldType::Float => expect_kind(value, ValueKind::Float, || mismatch(out)),
            FieldType::Str => expect_kind(value, ValueKind::Text, || mismatch(out)),
            FieldType::Bytes => expect_kind(value, ValueKind::Bytes, || mismatch(out)),
            FieldType::DateTime => expect_kind(value, ValueKind::DateTime, || mismatch(out)),
            FieldType::Number => {
                if !value.is_number() {
                    mismatch(out);
                }
            }
            FieldType::List(inner) => match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        inner.check(item, &format!("{path}[{i}]"), out);
                    }
                }
                _ => mismatch(out),
            },
            FieldType::Dict(inner) => match value {
                Value::Map(map) => {
                    for (key, item) in map {
                        inner.check(item, &format!("{path}.{key}"), out);
                    }
                }
                _ => mismatch(out),
            },
            FieldType::Optional(inner) => {
                if !value.is_null() {
                    inner.check(value, path, out);
                }
            }
            FieldType::Opaque => expect_kind(value, ValueKind::Opaque, || mismatch(out)),
            FieldType::OpaqueOf(tag) => match value {
                Value::Opaque(opaque) if &opaque.type_tag == tag => {}
                Value::Opaque(opaque) => out.push(format!(
                    "field {path}: expected opaque {tag}, found opaque {}",
                    opaque.type_tag
                )),
                _ => mismatch(out),
            },
            FieldType::Schema(schema) => match value {
                Value::Map(map) => schema.collect_violations(map, &format!("{path}."), out),
                _ => mismatch(out),
            },
        }
    }
}

fn expect_kind(value: &Value, kind: ValueKind, on_mismatch: impl FnOnce()) {
    if value.kind() != kind {
        on_mismatch();
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => f.write_str("any"),
            FieldType::Null => f.write_str("null"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Number => f.write_str("number"),
            FieldType::Str => f.write_str("str"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::DateTime => f.write_str("datetime"),
            FieldType::List(inner) => write!(f, "list[{inner}]"),
            FieldType::Dict(inner) => write!(f, "dict[{inner}]"),
            FieldType::Optional(inner) => write!(f, "optional[{inner}]"),
            FieldType::Opaque => f.write_str("opaque"),
            FieldType::OpaqueOf(tag) => write!(f, "opaque[{tag}]"),
            FieldType::Schema(schema) => write!(f, "schema {}", schema.name),
        }
    }
}

/// One named field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name; a valid path segment.
    pub name: String,
    /// Required type.
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Value used when the field is absent. A field with a default may be
    /// omitted from records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// A required field.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    /// A field that may be omitted.
    pub fn with_default(name: impl Into<String>, ty: FieldType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(ty: &FieldType, value: &Value) -> Vec<String> {
        let mut out = Vec::new();
        ty.check(value, "f", &mut out);
        out
    }

    #[test]
    fn scalar_types_are_strict() {
        assert!(violations(&FieldType::Int, &Value::Integer(1)).is_empty());
        assert_eq!(
            violations(&FieldType::Int, &Value::Float(1.0)),
            vec!["field f: expected int, found float"]
        );
        assert!(!violations(&FieldType::Float, &Value::Integer(1)).is_empty());
        assert!(!violations(&FieldType::Str, &Value::Integer(1)).is_empty());
        assert!(violations(&FieldType::Number, &Value::Float(1.0)).is_empty());
        assert!(violations(&FieldType::Number, &Value::Integer(1)).is_empty());
        assert!(violations(&FieldType::Any, &Value::Null).is_empty());
    }

    #[test]
    fn containers_check_every_element() {
        let ty = FieldType::list(FieldType::Str);
        let value = Value::from(vec![Value::from("a"), Value::Integer(2), Value::Null]);
        assert_eq!(
            violations(&ty, &value),
            vec![
                "field f[1]: expected str, found int",
                "field f[2]: expected str, found null"
            ]
        );

        let ty = FieldType::dict(FieldType::Int);
        let value = Value::map([("a", Value::Integer(1)), ("b", Value::from("x"))]);
        assert_eq!(
            violations(&ty, &value),
            vec!["field f.b: expected int, found str"]
        );
    }

    #[test]
    fn optional_accepts_null() {
        let ty = FieldType::optional(FieldType::Int);
        assert!(violations(&ty, &Value::Null).is_empty());
        assert!(violations(&ty, &Value::Integer(3)).is_empty());
        assert_eq!(
            violations(&ty, &Value::from("3")),
            vec!["field f: expected int, found str"]
        );
    }

    #[test]
    fn opaque_tags() {
        let value = Value::Opaque(hylla_codec::Opaque::new("Point", vec![]));
        assert!(violations(&FieldType::Opaque, &value).is_empty());
        assert!(violations(&FieldType::OpaqueOf("Point".into()), &value).is_empty());
        assert_eq!(
            violations(&FieldType::OpaqueOf("Line".into()), &value),
            vec!["field f: expected opaque Line, found opaque Point"]
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(
            FieldType::optional(FieldType::list(FieldType::DateTime)).to_string(),
            "optional[list[datetime]]"
        );
    }

    #[test]
    fn serde_forms() {
        let ty: FieldType = serde_json::from_str(r#"{"list": "int"}"#).unwrap();
        assert_eq!(ty, FieldType::list(FieldType::Int));
        let ty: FieldType = serde_json::from_str(r#""datetime""#).unwrap();
        assert_eq!(ty, FieldType::DateTime);
        let field: FieldDef =
            serde_json::from_str(r#"{"name": "year", "type": "int", "default": 0}"#).unwrap();
        assert_eq!(field.default, Some(Value::Integer(0)));
    }
}
