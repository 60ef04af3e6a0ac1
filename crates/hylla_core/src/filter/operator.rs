//! Condition operators and their semantics.

use crate::error::{CoreError, CoreResult};
use hylla_codec::{Value, ValueKind};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// A comparison operator usable in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `contains`: substring, list element, or map key.
    Contains,
    /// `starts_with`
    StartsWith,
    /// `ends_with`
    EndsWith,
    /// `matches`: regular expression search.
    Matches,
    /// `in`: left is an element, substring, or key of right.
    In,
    /// `not in`
    NotIn,
    /// `any`: some element of the left list is in right.
    Any,
    /// `all`: every element of the left list is in right.
    All,
    /// `none`: no element of the left list is in right.
    None,
    /// `length_eq`
    LengthEq,
    /// `length_gt`
    LengthGt,
    /// `length_lt`
    LengthLt,
    /// `is`: same kind and same value.
    Is,
    /// `is not`
    IsNot,
    /// `isinstance`: right names a value kind.
    IsInstance,
    /// `abs_eq`: |left| == right.
    AbsEq,
    /// `abs_gt`: |left| > right.
    AbsGt,
    /// `abs_lt`: |left| < right.
    AbsLt,
    /// `date_eq`
    DateEq,
    /// `date_before`
    DateBefore,
    /// `date_after`
    DateAfter,
    /// `date_within`: right is an inclusive `[start, end]` pair.
    DateWithin,
}

const OPERATORS: [(Operator, &str); 28] = [
    (Operator::Eq, "=="),
    (Operator::Ne, "!="),
    (Operator::Gt, ">"),
    (Operator::Lt, "<"),
    (Operator::Ge, ">="),
    (Operator::Le, "<="),
    (Operator::Contains, "contains"),
    (Operator::StartsWith, "starts_with"),
    (Operator::EndsWith, "ends_with"),
    (Operator::Matches, "matches"),
    (Operator::In, "in"),
    (Operator::NotIn, "not in"),
    (Operator::Any, "any"),
    (Operator::All, "all"),
    (Operator::None, "none"),
    (Operator::LengthEq, "length_eq"),
    (Operator::LengthGt, "length_gt"),
    (Operator::LengthLt, "length_lt"),
    (Operator::Is, "is"),
    (Operator::IsNot, "is not"),
    (Operator::IsInstance, "isinstance"),
    (Operator::AbsEq, "abs_eq"),
    (Operator::AbsGt, "abs_gt"),
    (Operator::AbsLt, "abs_lt"),
    (Operator::DateEq, "date_eq"),
    (Operator::DateBefore, "date_before"),
    (Operator::DateAfter, "date_after"),
    (Operator::DateWithin, "date_within"),
];

/// The extra type name `isinstance` accepts besides the value kinds.
const NUMBER_TYPE: &str = "number";

/// Returns true if `name` is a type name `isinstance` understands.
pub fn is_type_name(name: &str) -> bool {
    name == NUMBER_TYPE || ValueKind::from_name(name).is_some()
}

impl Operator {
    /// Parses an operator token.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` for unknown tokens, including the logical
    /// `and`/`or`/`not` words, which are connectives rather than operators.
    pub fn parse(token: &str) -> CoreResult<Self> {
        OPERATORS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(op, _)| *op)
            .ok_or_else(|| CoreError::malformed_filter(format!("unknown operator {token:?}")))
    }

    /// The operator's token.
    pub fn as_str(self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(op, _)| *op == self)
            .map_or("?", |(_, t)| *t)
    }

    /// Applies the operator. `pattern` is the precompiled regex for
    /// `matches` with a literal right operand.
    ///
    /// # Errors
    ///
    /// Returns `OperatorTypeError` if the operands cannot be compared
    /// with this operator.
    pub fn apply(self, left: &Value, right: &Value, pattern: Option<&Regex>) -> CoreResult<bool> {
        let type_error = || self.type_error(left, right);
        match self {
            Operator::Eq => equals(left, right).ok_or_else(type_error),
            Operator::Ne => equals(left, right).map(|eq| !eq).ok_or_else(type_error),
            Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
                let ord = order(left, right).ok_or_else(type_error)?;
                Ok(match self {
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Lt => ord == Ordering::Less,
                    Operator::Ge => ord != Ordering::Less,
                    _ => ord != Ordering::Greater,
                })
            }
            Operator::Contains => contains(left, right).ok_or_else(type_error),
            Operator::StartsWith => match (left, right) {
                (Value::Text(l), Value::Text(r)) => Ok(l.starts_with(r.as_str())),
                _ => Err(type_error()),
            },
            Operator::EndsWith => match (left, right) {
                (Value::Text(l), Value::Text(r)) => Ok(l.ends_with(r.as_str())),
                _ => Err(type_error()),
            },
            Operator::Matches => match (left, right, pattern) {
                (Value::Text(l), _, Some(re)) => Ok(re.is_match(l)),
                (Value::Text(l), Value::Text(r), None) => Regex::new(r)
                    .map(|re| re.is_match(l))
                    .map_err(|e| CoreError::malformed_filter(format!("invalid pattern: {e}"))),
                _ => Err(type_error()),
            },
            Operator::In => contains(right, left).ok_or_else(type_error),
            Operator::NotIn => contains(right, left).map(|c| !c).ok_or_else(type_error),
            Operator::Any | Operator::All | Operator::None => {
                let Value::Array(items) = left else {
                    return Err(type_error());
                };
                let hit = |item: &Value| match right {
                    Value::Array(candidates) => candidates.iter().any(|c| loose_eq(item, c)),
                    scalar => loose_eq(item, scalar),
                };
                Ok(match self {
                    Operator::Any => items.iter().any(hit),
                    Operator::All => items.iter().all(hit),
                    _ => !items.iter().any(hit),
                })
            }
            Operator::LengthEq | Operator::LengthGt | Operator::LengthLt => {
                let (Some(len), Value::Integer(n)) = (length(left), right) else {
                    return Err(type_error());
                };
                let len = i64::try_from(len).unwrap_or(i64::MAX);
                Ok(match self {
                    Operator::LengthEq => len == *n,
                    Operator::LengthGt => len > *n,
                    _ => len < *n,
                })
            }
            Operator::Is => Ok(identical(left, right)),
            Operator::IsNot => Ok(!identical(left, right)),
            Operator::IsInstance => {
                let Value::Text(name) = right else {
                    return Err(type_error());
                };
                if name == NUMBER_TYPE {
                    return Ok(left.is_number());
                }
                ValueKind::from_name(name)
                    .map(|kind| left.kind() == kind)
                    .ok_or_else(type_error)
            }
            Operator::AbsEq | Operator::AbsGt | Operator::AbsLt => {
                let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                    return Err(type_error());
                };
                let ord = l.abs().partial_cmp(&r).ok_or_else(type_error)?;
                Ok(match self {
                    Operator::AbsEq => ord == Ordering::Equal,
                    Operator::AbsGt => ord == Ordering::Greater,
                    _ => ord == Ordering::Less,
                })
            }
            Operator::DateEq | Operator::DateBefore | Operator::DateAfter => {
                let (Value::DateTime(l), Value::DateTime(r)) = (left, right) else {
                    return Err(type_error());
                };
                Ok(match self {
                    Operator::DateEq => l == r,
                    Operator::DateBefore => l < r,
                    _ => l > r,
                })
            }
            Operator::DateWithin => match (left, right) {
                (Value::DateTime(at), Value::Array(range)) => match range.as_slice() {
                    [Value::DateTime(start), Value::DateTime(end)] => Ok(start <= at && at <= end),
                    _ => Err(type_error()),
                },
                _ => Err(type_error()),
            },
        }
    }

    fn type_error(self, left: &Value, right: &Value) -> CoreError {
        CoreError::OperatorTypeError {
            operator: self.as_str().to_string(),
            left: left.kind().to_string(),
            right: right.kind().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

/// `==` semantics: numbers compare across int/float, null compares with
/// anything, and otherwise both sides must be the same kind.
fn equals(left: &Value, right: &Value) -> Option<bool> {
    if left.is_number() && right.is_number() {
        return Some(numeric_cmp(left, right) == Some(Ordering::Equal));
    }
    if left.is_null() || right.is_null() || left.kind() == right.kind() {
        return Some(left == right);
    }
    None
}

/// Equality used for membership: never a type error.
fn loose_eq(a: &Value, b: &Value) -> bool {
    equals(a, b).unwrap_or(false)
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (l, r) if l.is_number() && r.is_number() => numeric_cmp(l, r),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Does `haystack` contain `needle`? `None` if the pairing is meaningless.
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::Text(h), Value::Text(n)) => Some(h.contains(n.as_str())),
        (Value::Array(items), n) => Some(items.iter().any(|item| loose_eq(item, n))),
        (Value::Map(map), Value::Text(key)) => Some(map.contains_key(key)),
        (Value::Bytes(h), Value::Bytes(n)) => {
            Some(n.is_empty() || h.windows(n.len()).any(|w| w == n.as_slice()))
        }
        _ => None,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::Text(s) => Some(s.chars().count()),
        Value::Bytes(b) => Some(b.len()),
        Value::Array(a) => Some(a.len()),
        Value::Map(m) => Some(m.len()),
        _ => None,
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    left.kind() == right.kind() && left == right
}
