//! # RidgeDB Testkit
//!
//! Test utilities for RidgeDB.
//!
//! This crate provides:
//! - Table schemas, rows and index managers ready for tests
//! - Property-based test generators using proptest
//! - Concurrent stress harnesses for index fan-out and lock contention
//! - Test-scoped tracing output
//!
//! ## Usage
//!
//! ```rust
//! use ridgedb_testkit::prelude::*;
//!
//! let manager = TestManager::memory();
//! manager.create_table("app", users_schema()).unwrap();
//! manager.insert_row("app", "users", &user_row(1, "ada", "oslo", None)).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stress::*;
