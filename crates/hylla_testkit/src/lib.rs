//! # Hylla Testkit
//!
//! Test utilities for Hylla.
//!
//! This crate provides:
//! - Sample libraries and store helpers
//! - A storage backend with injectable faults
//! - Property-based test generators using proptest
//! - Concurrent workload helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hylla_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_books() {
//!     with_books(|library| {
//!         let found = library.checkout(CheckOut::new()).unwrap();
//!         assert_eq!(found.len(), SAMPLE_BOOKS.len());
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
