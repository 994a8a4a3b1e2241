//! # sgsync Core
//!
//! Reconciliation logic for remote SendGrid entities - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - The [`Transport`] port the infra layer implements
//! - Resource operations for subusers and API keys
//! - The [`ResourceLifecycle`] controllers that compose those operations
//!   with the retry executor
//!
//! ## Architecture Principles
//! - Only depends on `sgsync-common` and `sgsync-domain`
//! - No HTTP or platform code
//! - All external access via the [`Transport`] trait

pub mod api_key;
pub mod client;
pub mod lifecycle;
pub mod ports;
pub mod subuser;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api_key::ApiKeyLifecycle;
pub use client::SendgridClient;
pub use lifecycle::{
    CreatedState, LifecycleError, OperationContext, ReadOutcome, ResourceLifecycle,
};
pub use ports::Transport;
pub use subuser::SubuserLifecycle;
