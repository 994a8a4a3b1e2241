//! Subuser reconciliation: resource operations and the lifecycle
//! controller built on them.

pub mod lifecycle;
pub mod operations;

pub use lifecycle::SubuserLifecycle;
pub use operations::validate_spec;
