//! Structural filters.
//!
//! A filter is a flat list of conditions and groups joined by `AND` / `OR`.
//! Chains evaluate strictly left to right; there is no operator
//! precedence, nesting is expressed with groups only. The empty filter is
//! true for every record.

mod ast;
mod operator;
mod wire;

pub use ast::{
    Condition, Connective, EvalContext, Filter, Group, NoNamespace, Operand, PathSource,
    Predicate,
};
pub use operator::Operator;
pub use wire::{ConditionSpec, FilterElement};
