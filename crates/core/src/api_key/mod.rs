//! API key reconciliation.

pub mod lifecycle;
pub mod operations;

pub use lifecycle::ApiKeyLifecycle;
pub use operations::validate_spec;
