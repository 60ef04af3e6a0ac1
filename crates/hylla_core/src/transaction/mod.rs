//! Transactions, lock footprints and rollback.
//!
//! Locking is hierarchical. Touching a node takes a lock on it and shared
//! locks on every ancestor up to the library, so an exclusive lock on a
//! section excludes all work below it. Locks are always taken in
//! ascending path order.

mod coordinator;
pub(crate) mod footprint;
mod undo;

pub use coordinator::TransactionCoordinator;
pub use footprint::{Footprint, HeldLocks};
pub use undo::{Mutation, UndoLog};
