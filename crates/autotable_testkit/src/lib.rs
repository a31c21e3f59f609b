//! # AutoTable Testkit
//!
//! Test utilities for AutoTable.
//!
//! This crate provides:
//! - Record fixtures covering every field type
//! - A database wired to an instrumented in-memory backend
//! - Property-based test generators using proptest
//! - Concurrent load helpers
//!
//! ## Usage
//!
//! ```rust
//! use autotable_testkit::prelude::*;
//!
//! let t = TestDatabase::memory();
//! t.seed(3);
//! assert_eq!(t.backend.row_count("Test"), Some(3));
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
