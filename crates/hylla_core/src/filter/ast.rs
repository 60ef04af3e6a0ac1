//! Structural filter trees and their evaluation.

use super::operator::{is_type_name, Operator};
use super::wire::FilterElement;
use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use hylla_codec::{Record, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical connective between two predicates of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connective {
    /// Both sides must hold.
    And,
    /// Either side must hold.
    Or,
}

impl Connective {
    /// Parses `AND` or `OR`. Matching is exact.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` for any other token.
    pub fn parse(token: &str) -> CoreResult<Self> {
        match token {
            "AND" => Ok(Connective::And),
            "OR" => Ok(Connective::Or),
            other => Err(CoreError::malformed_filter(format!(
                "invalid connective {other:?}, expected \"AND\" or \"OR\""
            ))),
        }
    }

    /// The connective's token.
    pub fn as_str(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Resolved against the record under test, or the namespace.
    Path(Path),
    /// Used as is.
    Literal(Value),
}

impl Operand {
    /// True for path operands.
    pub fn is_path(&self) -> bool {
        matches!(self, Operand::Path(_))
    }
}

/// A leaf predicate `left operator right`.
#[derive(Debug, Clone)]
pub struct Condition {
    left: Operand,
    operator: Operator,
    right: Operand,
    pattern: Option<Regex>,
}

impl Condition {
    /// Builds a condition, checking what can be checked statically.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` if neither operand is a path, if a literal
    /// `matches` pattern does not compile, or if a literal `isinstance`
    /// type name is unknown.
    pub fn new(left: Operand, operator: Operator, right: Operand) -> CoreResult<Self> {
        if !left.is_path() && !right.is_path() {
            return Err(CoreError::malformed_filter(
                "a condition needs at least one path operand",
            ));
        }
        let mut pattern = None;
        if let Operand::Literal(literal) = &right {
            match (operator, literal) {
                (Operator::Matches, Value::Text(source)) => {
                    pattern = Some(Regex::new(source).map_err(|e| {
                        CoreError::malformed_filter(format!("invalid pattern {source:?}: {e}"))
                    })?);
                }
                (Operator::Matches, _) => {
                    return Err(CoreError::malformed_filter("matches needs a text pattern"));
                }
                (Operator::IsInstance, Value::Text(name)) if !is_type_name(name) => {
                    return Err(CoreError::malformed_filter(format!(
                        "unknown type name {name:?}"
                    )));
                }
                _ => {}
            }
        }
        Ok(Self {
            left,
            operator,
            right,
            pattern,
        })
    }

    /// Shorthand for the common `path operator literal` form.
    ///
    /// # Errors
    ///
    /// See [`Condition::new`].
    pub fn compare(path: Path, operator: Operator, literal: impl Into<Value>) -> CoreResult<Self> {
        Self::new(Operand::Path(path), operator, Operand::Literal(literal.into()))
    }

    /// Left operand.
    pub fn left(&self) -> &Operand {
        &self.left
    }

    /// Operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Right operand.
    pub fn right(&self) -> &Operand {
        &self.right
    }

    /// Evaluates the condition.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if a path operand does not resolve, or
    /// `OperatorTypeError` if the resolved operands are incomparable.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> CoreResult<bool> {
        let left = ctx.operand(&self.left)?;
        let right = ctx.operand(&self.right)?;
        self.operator.apply(&left, &right, self.pattern.as_ref())
    }
}

/// A node of the filter tree.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// A single condition.
    Leaf(Condition),
    /// A left-to-right chain of predicates.
    Group(Group),
}

/// A chain `first c1 p1 c2 p2 ...`, evaluated strictly left to right with
/// no precedence between `AND` and `OR`.
///
/// The shape makes the condition/connective alternation impossible to
/// violate.
#[derive(Debug, Clone)]
pub struct Group {
    first: Box<Predicate>,
    rest: Vec<(Connective, Predicate)>,
}

impl Group {
    /// A group holding a single predicate.
    pub fn new(first: Predicate) -> Self {
        Self {
            first: Box::new(first),
            rest: Vec::new(),
        }
    }

    /// Appends `connective predicate` at the end of the chain.
    #[must_use]
    pub fn then(mut self, connective: Connective, predicate: Predicate) -> Self {
        self.rest.push((connective, predicate));
        self
    }

    /// First predicate of the chain.
    pub fn first(&self) -> &Predicate {
        &self.first
    }

    /// Remaining `(connective, predicate)` links.
    pub fn rest(&self) -> &[(Connective, Predicate)] {
        &self.rest
    }

    /// Folds the chain left to right. `AND`/`OR` short-circuit, so a
    /// skipped predicate is never evaluated.
    ///
    /// # Errors
    ///
    /// Propagates the first evaluation error.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> CoreResult<bool> {
        let mut acc = self.first.evaluate(ctx)?;
        for (connective, predicate) in &self.rest {
            acc = match connective {
                Connective::And => acc && predicate.evaluate(ctx)?,
                Connective::Or => acc || predicate.evaluate(ctx)?,
            };
        }
        Ok(acc)
    }
}

impl Predicate {
    /// Wraps a condition.
    pub fn leaf(condition: Condition) -> Self {
        Predicate::Leaf(condition)
    }

    /// `self AND other`, appended to `self`'s chain if it is a group.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        self.chain(Connective::And, other)
    }

    /// `self OR other`, appended to `self`'s chain if it is a group.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        self.chain(Connective::Or, other)
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            Predicate::Leaf(condition) => {
                for operand in [&condition.left, &condition.right] {
                    if let Operand::Path(path) = operand {
                        out.push(path);
                    }
                }
            }
            Predicate::Group(group) => {
                group.first.collect_paths(out);
                for (_, predicate) in &group.rest {
                    predicate.collect_paths(out);
                }
            }
        }
    }

    fn chain(self, connective: Connective, other: Predicate) -> Self {
        match self {
            Predicate::Group(group) => Predicate::Group(group.then(connective, other)),
            leaf => Predicate::Group(Group::new(leaf).then(connective, other)),
        }
    }

    /// Nesting depth: 0 for a leaf, one more than the deepest child for a
    /// group.
    pub fn depth(&self) -> usize {
        match self {
            Predicate::Leaf(_) => 0,
            Predicate::Group(group) => {
                1 + std::iter::once(group.first.as_ref())
                    .chain(group.rest.iter().map(|(_, p)| p))
                    .map(Predicate::depth)
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    /// Evaluates the predicate.
    ///
    /// # Errors
    ///
    /// Propagates condition evaluation errors.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> CoreResult<bool> {
        match self {
            Predicate::Leaf(condition) => condition.evaluate(ctx),
            Predicate::Group(group) => group.evaluate(ctx),
        }
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Predicate::Leaf(condition)
    }
}

/// A complete filter. The empty filter accepts every record.
///
/// On the wire a filter is the flat element list of conditions, groups and
/// connective strings; it is compiled into a [`Predicate`] tree on
/// deserialization, so grammar errors surface before any query runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<FilterElement>", into = "Vec<FilterElement>")]
pub struct Filter {
    root: Option<Predicate>,
}

impl Filter {
    /// The filter that accepts everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// True for the filter that accepts everything.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The predicate tree, if any.
    pub fn root(&self) -> Option<&Predicate> {
        self.root.as_ref()
    }

    /// Nesting depth of the tree.
    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Predicate::depth)
    }

    /// Compiles a wire element list.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` for dangling or doubled connectives,
    /// adjacent predicates without a connective, empty groups, and
    /// invalid conditions.
    pub fn from_elements(elements: Vec<FilterElement>) -> CoreResult<Self> {
        Ok(Self {
            root: compile_sequence(elements)?,
        })
    }

    /// Evaluates the filter.
    ///
    /// # Errors
    ///
    /// Propagates condition evaluation errors.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> CoreResult<bool> {
        match &self.root {
            Some(predicate) => predicate.evaluate(ctx),
            None => Ok(true),
        }
    }

    /// Every path operand in the tree, left to right.
    pub fn operand_paths(&self) -> Vec<&Path> {
        let mut paths = Vec::new();
        if let Some(predicate) = &self.root {
            predicate.collect_paths(&mut paths);
        }
        paths
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Self {
            root: Some(predicate),
        }
    }
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Self::from(Predicate::Leaf(condition))
    }
}

impl TryFrom<Vec<FilterElement>> for Filter {
    type Error = CoreError;

    fn try_from(elements: Vec<FilterElement>) -> CoreResult<Self> {
        Self::from_elements(elements)
    }
}

impl From<Filter> for Vec<FilterElement> {
    fn from(filter: Filter) -> Self {
        match filter.root {
            None => Vec::new(),
            Some(Predicate::Group(group)) => group_elements(group),
            Some(leaf) => vec![FilterElement::from_predicate(leaf)],
        }
    }
}

pub(super) fn group_elements(group: Group) -> Vec<FilterElement> {
    let mut out = Vec::with_capacity(1 + group.rest.len() * 2);
    out.push(FilterElement::from_predicate(*group.first));
    for (connective, predicate) in group.rest {
        out.push(FilterElement::Connective(connective.as_str().to_string()));
        out.push(FilterElement::from_predicate(predicate));
    }
    out
}

fn compile_sequence(elements: Vec<FilterElement>) -> CoreResult<Option<Predicate>> {
    let mut first: Option<Predicate> = None;
    let mut rest = Vec::new();
    let mut pending: Option<Connective> = None;

    for (position, element) in elements.into_iter().enumerate() {
        let predicate = match element {
            FilterElement::Connective(token) => {
                let connective = Connective::parse(&token)?;
                if first.is_none() {
                    return Err(CoreError::malformed_filter(format!(
                        "filter starts with connective {connective}"
                    )));
                }
                if pending.is_some() {
                    return Err(CoreError::malformed_filter(format!(
                        "consecutive connectives at position {position}"
                    )));
                }
                pending = Some(connective);
                continue;
            }
            FilterElement::Condition { condition } => Predicate::Leaf(condition.into_condition()?),
            FilterElement::Group { group } => compile_sequence(group)?
                .ok_or_else(|| CoreError::malformed_filter("empty group"))?,
        };
        match (first.is_some(), pending.take()) {
            (false, _) => first = Some(predicate),
            (true, Some(connective)) => rest.push((connective, predicate)),
            (true, None) => {
                return Err(CoreError::malformed_filter(format!(
                    "missing connective before position {position}"
                )));
            }
        }
    }

    if let Some(connective) = pending {
        return Err(CoreError::malformed_filter(format!(
            "filter ends with connective {connective}"
        )));
    }
    Ok(first.map(|first| {
        if rest.is_empty() {
            first
        } else {
            Predicate::Group(Group {
                first: Box::new(first),
                rest,
            })
        }
    }))
}

/// Resolves absolute paths for operands that do not start inside the
/// record under test.
pub trait PathSource {
    /// Returns the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if nothing lives at `path`.
    fn lookup(&self, path: &Path) -> CoreResult<Value>;
}

/// A [`PathSource`] with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNamespace;

impl PathSource for NoNamespace {
    fn lookup(&self, path: &Path) -> CoreResult<Value> {
        Err(CoreError::path_not_found(path))
    }
}

/// What a filter is evaluated against.
///
/// A path operand whose first segment is a top-level key of `record`
/// resolves inside `record`. Any other path is absolute and goes to
/// `namespace`.
pub struct EvalContext<'a> {
    record: &'a Record,
    namespace: &'a dyn PathSource,
}

impl<'a> EvalContext<'a> {
    /// Creates a context.
    pub fn new(record: &'a Record, namespace: &'a dyn PathSource) -> Self {
        Self { record, namespace }
    }

    fn operand(&self, operand: &Operand) -> CoreResult<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Path(path) => {
                let segments = path.segments();
                match segments.split_first() {
                    Some((head, tail)) if self.record.contains_key(head) => self
                        .record
                        .get(head)
                        .and_then(|value| value.get_path(tail))
                        .cloned()
                        .ok_or_else(|| CoreError::path_not_found(path)),
                    _ => self.namespace.lookup(path),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn cond(path: &str, op: &str, literal: impl Into<Value>) -> Predicate {
        Condition::compare(p(path), Operator::parse(op).unwrap(), literal)
            .unwrap()
            .into()
    }

    fn book() -> Record {
        let mut r = Record::new();
        r.insert("title".into(), Value::from("Dune"));
        r.insert("year".into(), Value::Integer(1965));
        r.insert(
            "author".into(),
            Value::map([("name", Value::from("Frank Herbert"))]),
        );
        r
    }

    fn eval(filter: &Filter, record: &Record) -> CoreResult<bool> {
        filter.evaluate(&EvalContext::new(record, &NoNamespace))
    }

    #[test]
    fn empty_filter_is_true() {
        assert!(eval(&Filter::all(), &Record::new()).unwrap());
        assert!(eval(&Filter::all(), &book()).unwrap());
    }

    #[test]
    fn nested_record_paths() {
        let filter = Filter::from(cond("author.name", "starts_with", "Frank"));
        assert!(eval(&filter, &book()).unwrap());
    }

    #[test]
    fn missing_key_inside_record_is_path_not_found() {
        let filter = Filter::from(cond("author.born", "==", 1920));
        assert!(matches!(
            eval(&filter, &book()),
            Err(CoreError::PathNotFound { .. })
        ));
    }

    #[test]
    fn unknown_head_goes_to_namespace() {
        struct Fixed;
        impl PathSource for Fixed {
            fn lookup(&self, path: &Path) -> CoreResult<Value> {
                if path.to_string() == "lib.settings.min_year" {
                    Ok(Value::Integer(1960))
                } else {
                    Err(CoreError::path_not_found(path))
                }
            }
        }
        let condition = Condition::new(
            Operand::Path(p("year")),
            Operator::Gt,
            Operand::Path(p("lib.settings.min_year")),
        )
        .unwrap();
        let filter = Filter::from(condition);
        let record = book();
        assert!(filter.evaluate(&EvalContext::new(&record, &Fixed)).unwrap());
    }

    #[test]
    fn left_to_right_without_precedence() {
        // false OR true AND false == (false OR true) AND false == false
        let f = cond("year", "<", 0)
            .or(cond("year", "==", 1965))
            .and(cond("title", "==", "Emma"));
        assert!(!eval(&Filter::from(f), &book()).unwrap());

        // false OR (true AND false) with explicit nesting is also false,
        // but true OR (false AND x) differs from (true OR false) AND x
        let chained = cond("year", "==", 1965)
            .or(cond("year", "<", 0))
            .and(cond("title", "==", "Emma"));
        let nested = cond("year", "==", 1965)
            .or(cond("year", "<", 0).and(cond("title", "==", "Emma")));
        assert!(!eval(&Filter::from(chained), &book()).unwrap());
        assert!(eval(&Filter::from(nested), &book()).unwrap());
    }

    #[test]
    fn short_circuit_skips_errors() {
        let f = cond("year", "==", 1965).or(cond("missing", "==", 1));
        assert!(eval(&Filter::from(f), &book()).unwrap());
        let f = cond("year", "==", 1).and(cond("missing", "==", 1));
        assert!(!eval(&Filter::from(f), &book()).unwrap());
    }

    #[test]
    fn conditions_need_a_path() {
        let err = Condition::new(
            Operand::Literal(Value::Integer(1)),
            Operator::Eq,
            Operand::Literal(Value::Integer(1)),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::MalformedFilter { .. }));
    }

    #[test]
    fn literal_patterns_compile_up_front() {
        assert!(Condition::compare(p("title"), Operator::Matches, "(").is_err());
        assert!(Condition::compare(p("title"), Operator::Matches, 3).is_err());
        assert!(Condition::compare(p("title"), Operator::IsInstance, "thing").is_err());
        assert!(Condition::compare(p("title"), Operator::Matches, "^D").is_ok());
    }

    #[test]
    fn depth_counts_groups() {
        assert_eq!(Filter::all().depth(), 0);
        assert_eq!(Filter::from(cond("year", "==", 1)).depth(), 0);
        let nested = cond("a", "==", 1).and(cond("b", "==", 1).or(cond("c", "==", 1)));
        assert_eq!(Filter::from(nested).depth(), 2);
    }

    #[test]
    fn operand_paths_cover_every_leaf() {
        let cross = Condition::new(
            Operand::Path(p("year")),
            Operator::Ge,
            Operand::Path(p("settings.cutoff.year")),
        )
        .unwrap();
        let f = cond("title", "==", "Dune").and(Predicate::leaf(cross).or(cond("tags", "contains", "x")));
        let paths: Vec<String> = Filter::from(f)
            .operand_paths()
            .into_iter()
            .map(Path::to_string)
            .collect();
        assert_eq!(paths, ["title", "year", "settings.cutoff.year", "tags"]);
        assert!(Filter::all().operand_paths().is_empty());
    }

    #[test]
    fn connective_tokens_are_exact() {
        assert_eq!(Connective::parse("AND").unwrap(), Connective::And);
        assert_eq!(Connective::parse("OR").unwrap(), Connective::Or);
        assert!(Connective::parse("and").is_err());
        assert!(Connective::parse("XOR").is_err());
    }
}
