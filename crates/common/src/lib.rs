//! Shared runtime utilities for sgsync crates.
//!
//! Currently this is the resilience layer: a bounded retry executor that
//! the core reconciliation code wraps around remote writes.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;
