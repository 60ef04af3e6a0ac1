//! The flat element-list form filters travel in.
//!
//! ```json
//! [
//!   {"condition": {"left": "year", "operator": ">", "right": 1960}},
//!   "AND",
//!   {"group": [
//!     {"condition": {"left": "genre", "operator": "==", "right": "scifi"}},
//!     "OR",
//!     {"condition": {"left": "awards", "operator": "length_gt", "right": 0}}
//!   ]}
//! ]
//! ```

use super::ast::{group_elements, Condition, Operand, Predicate};
use super::operator::Operator;
use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use hylla_codec::Value;
use serde::{Deserialize, Serialize};

/// One element of a filter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterElement {
    /// A leaf condition.
    Condition {
        /// The condition body.
        condition: ConditionSpec,
    },
    /// A parenthesized sub-list.
    Group {
        /// The nested elements.
        group: Vec<FilterElement>,
    },
    /// `"AND"` or `"OR"`.
    Connective(String),
}

impl FilterElement {
    pub(super) fn from_predicate(predicate: Predicate) -> Self {
        match predicate {
            Predicate::Leaf(condition) => FilterElement::Condition {
                condition: ConditionSpec::from(&condition),
            },
            Predicate::Group(group) => FilterElement::Group {
                group: group_elements(group),
            },
        }
    }
}

/// Uncompiled condition. Operands are values; `left_is_path` and
/// `right_is_path` say which ones are paths to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Left operand.
    pub left: Value,
    /// Operator token.
    pub operator: String,
    /// Right operand.
    pub right: Value,
    /// Whether `left` is a path. Defaults to true.
    #[serde(default = "default_true")]
    pub left_is_path: bool,
    /// Whether `right` is a path. Defaults to false.
    #[serde(default)]
    pub right_is_path: bool,
}

fn default_true() -> bool {
    true
}

impl ConditionSpec {
    /// Compiles into a [`Condition`].
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` for an unknown operator, a path operand
    /// that is not a valid dotted path, or an invalid condition.
    pub fn into_condition(self) -> CoreResult<Condition> {
        let operator = Operator::parse(&self.operator)?;
        let left = operand(self.left, self.left_is_path)?;
        let right = operand(self.right, self.right_is_path)?;
        Condition::new(left, operator, right)
    }
}

fn operand(value: Value, is_path: bool) -> CoreResult<Operand> {
    if !is_path {
        return Ok(Operand::Literal(value));
    }
    match value {
        Value::Text(text) => Path::parse(&text).map(Operand::Path).map_err(|e| {
            CoreError::malformed_filter(format!("invalid operand path {text:?}: {e}"))
        }),
        other => Err(CoreError::malformed_filter(format!(
            "path operand must be a string, found {}",
            other.kind()
        ))),
    }
}

impl From<&Condition> for ConditionSpec {
    fn from(condition: &Condition) -> Self {
        fn split(operand: &Operand) -> (Value, bool) {
            match operand {
                Operand::Path(path) => (Value::Text(path.to_string()), true),
                Operand::Literal(value) => (value.clone(), false),
            }
        }
        let (left, left_is_path) = split(condition.left());
        let (right, right_is_path) = split(condition.right());
        Self {
            left,
            operator: condition.operator().as_str().to_string(),
            right,
            left_is_path,
            right_is_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::Filter;
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> CoreResult<Filter> {
        let elements: Vec<FilterElement> = serde_json::from_value(value).unwrap();
        Filter::from_elements(elements)
    }

    fn leaf(left: &str, op: &str, right: serde_json::Value) -> serde_json::Value {
        json!({"condition": {"left": left, "operator": op, "right": right}})
    }

    #[test]
    fn empty_list_is_the_empty_filter() {
        assert!(parse(json!([])).unwrap().is_empty());
    }

    #[test]
    fn single_condition() {
        let filter = parse(json!([leaf("year", ">", json!(1960))])).unwrap();
        assert_eq!(filter.depth(), 0);
    }

    #[test]
    fn nested_groups() {
        let filter = parse(json!([
            leaf("year", ">", json!(1960)),
            "AND",
            {"group": [leaf("genre", "==", json!("scifi")), "OR", leaf("genre", "==", json!("fantasy"))]}
        ]))
        .unwrap();
        assert_eq!(filter.depth(), 2);
    }

    #[test]
    fn grammar_errors() {
        let bad = [
            json!(["AND", leaf("a", "==", json!(1))]),
            json!([leaf("a", "==", json!(1)), "AND"]),
            json!([leaf("a", "==", json!(1)), "AND", "OR", leaf("b", "==", json!(1))]),
            json!([leaf("a", "==", json!(1)), leaf("b", "==", json!(1))]),
            json!([leaf("a", "==", json!(1)), "XOR", leaf("b", "==", json!(1))]),
            json!([{"group": []}]),
            json!([leaf("a", "~=", json!(1))]),
            json!([leaf("not..valid", "==", json!(1))]),
        ];
        for value in bad {
            let err = parse(value.clone()).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedFilter { .. }),
                "{value}: {err:?}"
            );
        }
    }

    #[test]
    fn path_operands_must_be_text() {
        let err = parse(json!([{"condition": {"left": 3, "operator": "==", "right": 1}}])).unwrap_err();
        assert!(matches!(err, CoreError::MalformedFilter { .. }));
    }

    #[test]
    fn right_paths_and_literal_lefts() {
        let filter = parse(json!([{"condition": {
            "left": 1960, "left_is_path": false,
            "operator": "<",
            "right": "year", "right_is_path": true
        }}]))
        .unwrap();
        assert!(!filter.is_empty());
    }

    #[test]
    fn serializes_back_to_elements() {
        let source = json!([
            leaf("year", ">", json!(1960)),
            "OR",
            {"group": [leaf("title", "starts_with", json!("D")), "AND", leaf("year", "<", json!(2000))]}
        ]);
        let filter: Filter = serde_json::from_value(source).unwrap();
        let back = serde_json::to_value(&filter).unwrap();
        let again: Filter = serde_json::from_value(back.clone()).unwrap();
        assert_eq!(serde_json::to_value(&again).unwrap(), back);
        assert_eq!(back[1], json!("OR"));
        assert_eq!(back[0]["condition"]["left_is_path"], json!(true));
    }
}
