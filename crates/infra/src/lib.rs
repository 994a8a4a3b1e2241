//! # sgsync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The reqwest-backed [`HttpTransport`]
//! - Configuration loading from environment and files
//! - Tracing subscriber setup
//! - [`SendgridApi`], which wires configuration into lifecycle controllers
//!
//! ## Architecture
//! - Implements traits defined in `sgsync-core`
//! - Contains all "impure" code (network, files, process environment)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use api::SendgridApi;
pub use errors::InfraError;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use observability::init_tracing;
