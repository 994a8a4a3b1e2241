//! Port interfaces for remote access
//!
//! These traits define the boundary between reconciliation logic and the
//! HTTP implementation in the infra crate.

use async_trait::async_trait;
use sgsync_domain::{HttpMethod, RawResponse, TransportError};

/// Issues requests against the remote API.
///
/// Implementations return a [`RawResponse`] for every HTTP status and only
/// fail with [`TransportError`] when no response was received. They must
/// not retry on their own and must be safe to share across concurrent
/// calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `body` (if any) as JSON to `path`, relative to the API root.
    async fn issue_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse, TransportError>;
}
