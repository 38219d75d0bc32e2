//! Shared helpers for the RidgeDB benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
