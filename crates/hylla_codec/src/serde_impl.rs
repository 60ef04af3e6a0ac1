//! serde support for [`Value`].
//!
//! Variants without a native serde counterpart are written as single-key
//! marker objects, so they survive formats such as JSON:
//!
//! | variant  | form                                           |
//! |----------|------------------------------------------------|
//! | Bytes    | `{"$bytes": [1, 2, 3]}`                        |
//! | DateTime | `{"$datetime": "1965-08-01T00:00:00Z"}`        |
//! | Opaque   | `{"$opaque": {"type_tag": "t", "payload": [..]}}` |
//!
//! A map whose only key is itself a marker is escaped as
//! `{"$map": [[key, value]]}`, so it reads back as a map.

use crate::value::{Opaque, Record, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const BYTES_MARKER: &str = "$bytes";
const DATETIME_MARKER: &str = "$datetime";
const OPAQUE_MARKER: &str = "$opaque";
const MAP_MARKER: &str = "$map";

fn is_marker(key: &str) -> bool {
    matches!(key, BYTES_MARKER | DATETIME_MARKER | OPAQUE_MARKER | MAP_MARKER)
}

struct ByteList<'a>(&'a [u8]);

impl Serialize for ByteList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0)
    }
}

#[derive(Serialize)]
struct OpaqueRepr<'a> {
    type_tag: &'a str,
    payload: ByteList<'a>,
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BYTES_MARKER, &ByteList(b))?;
                map.end()
            }
            Value::DateTime(dt) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    DATETIME_MARKER,
                    &dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                )?;
                map.end()
            }
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(record) => match record.first_key_value() {
                Some((key, value)) if record.len() == 1 && is_marker(key) => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry(MAP_MARKER, &[(key, value)])?;
                    map.end()
                }
                _ => serializer.collect_map(record),
            },
            Value::Opaque(opaque) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    OPAQUE_MARKER,
                    &OpaqueRepr {
                        type_tag: &opaque.type_tag,
                        payload: ByteList(&opaque.payload),
                    },
                )?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a record value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        i64::try_from(v)
            .map(Value::Integer)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut record = Record::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            record.insert(key, value);
        }
        if record.len() == 1 {
            if let Some((key, value)) = record.pop_first() {
                return match key.as_str() {
                    BYTES_MARKER => byte_list(&value).map(Value::Bytes),
                    DATETIME_MARKER => datetime(&value).map(Value::DateTime),
                    OPAQUE_MARKER => opaque(&value).map(Value::Opaque),
                    MAP_MARKER => escaped_map(value).map(Value::Map),
                    _ => {
                        record.insert(key, value);
                        Ok(Value::Map(record))
                    }
                };
            }
        }
        Ok(Value::Map(record))
    }
}

fn byte_list<E: de::Error>(value: &Value) -> Result<Vec<u8>, E> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_integer()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| E::custom("byte list entries must be integers 0-255"))
            })
            .collect(),
        other => Err(E::custom(format!("expected a byte list, found {}", other.kind()))),
    }
}

fn escaped_map<E: de::Error>(value: Value) -> Result<Record, E> {
    let Value::Array(entries) = value else {
        return Err(E::custom("map marker must hold a list of [key, value] pairs"));
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Array(pair) => match <[Value; 2]>::try_from(pair) {
                Ok([Value::Text(key), value]) => Ok((key, value)),
                _ => Err(E::custom("map marker entries must be [text, value] pairs")),
            },
            _ => Err(E::custom("map marker entries must be [text, value] pairs")),
        })
        .collect()
}

fn datetime<E: de::Error>(value: &Value) -> Result<DateTime<Utc>, E> {
    let text = value
        .as_text()
        .ok_or_else(|| E::custom("datetime marker must hold an RFC 3339 string"))?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| E::custom(format!("invalid datetime {text:?}: {e}")))
}

fn opaque<E: de::Error>(value: &Value) -> Result<Opaque, E> {
    let type_tag = value
        .get("type_tag")
        .and_then(Value::as_text)
        .ok_or_else(|| E::custom("opaque marker requires a text type_tag"))?;
    let payload = value
        .get("payload")
        .ok_or_else(|| E::custom("opaque marker requires a payload"))?;
    Ok(Opaque::new(type_tag, byte_list::<E>(payload)?))
}
