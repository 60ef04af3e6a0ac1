//! # Hylla Core
//!
//! Query, schema and transaction core for Hylla, a hierarchical record
//! store.
//!
//! The namespace is a tree rooted at the library. Sections are internal
//! nodes that can carry a schema; shelves are leaves that each hold one
//! record. Paths address nodes with dotted names (`lib.fiction.dune`) and
//! continue into a shelf's record (`lib.fiction.dune.author.name`).
//!
//! This crate provides:
//! - Path resolution over any [`hylla_storage::StorageBackend`]
//! - Schemas inherited from the nearest ancestor, with closed field sets
//! - Structural filters evaluated strictly left to right
//! - The eight query operations and atomic transactions over them
//! - Hierarchical locking with bounded waits and undo-log rollback

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod database;
mod error;
mod executor;
pub mod filter;
mod namespace;
mod path;
mod query;
pub mod schema;
pub mod transaction;

pub use catalog::Catalog;
pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use executor::Executor;
pub use filter::{Condition, Connective, Filter, Operand, Operator, Predicate};
pub use namespace::{load_record, store_record, Location, NamespaceSource, NodeType, Resolver};
pub use path::{is_valid_name, Path};
pub use query::{
    BuildSection, BuildShelf, CheckOut, CheckOutItem, Query, QueryOutput, Remove, Reset, Revise,
    SetSchema, ShelfEntry, SortItem, SortOrder, Transaction, Write, CHECKOUT_ALL,
};
pub use schema::{FieldDef, FieldType, Schema, SchemaRegistry};
pub use transaction::TransactionCoordinator;
