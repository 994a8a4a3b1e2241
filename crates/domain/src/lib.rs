//! # sgsync Domain
//!
//! Domain types and models for sgsync.
//!
//! This crate contains:
//! - Remote entity types (subusers, API keys) and their write payloads
//! - The request result/error model shared by every remote operation
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other sgsync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
