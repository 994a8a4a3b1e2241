//! Typed client over the [`Transport`] port.
//!
//! Resource operations live next to their entity (`subuser::operations`,
//! `api_key::operations`) as inherent methods on [`SendgridClient`]; this
//! module holds the shared request plumbing they use.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sgsync_domain::{HttpMethod, Operation, RawResponse, RequestError, RequestResult};
use tracing::debug;

use crate::ports::Transport;

/// Handle to the remote API. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct SendgridClient {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for SendgridClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendgridClient").finish_non_exhaustive()
    }
}

impl SendgridClient {
    /// Client issuing every request through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a request and wrap transport failures with operation context.
    /// Every HTTP status is returned as-is.
    pub(crate) async fn send(
        &self,
        operation: Operation,
        target: &str,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> RequestResult<RawResponse> {
        debug!(operation = operation.label(), target, %method, path, "Issuing request");

        let response = self
            .transport
            .issue_request(method, path, body)
            .await
            .map_err(|source| RequestError::transport(operation, target, source))?;

        debug!(
            operation = operation.label(),
            target,
            status = response.status,
            "Received response"
        );
        Ok(response)
    }

    /// Like [`Self::send`], but any status of 300 or above becomes a
    /// [`RequestError::Rejected`] carrying the raw body.
    pub(crate) async fn send_checked(
        &self,
        operation: Operation,
        target: &str,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> RequestResult<RawResponse> {
        let response = self.send(operation, target, method, path, body).await?;
        reject_unless_success(operation, target, response)
    }
}

pub(crate) fn reject_unless_success(
    operation: Operation,
    target: &str,
    response: RawResponse,
) -> RequestResult<RawResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(RequestError::rejected(operation, target, response.status, &response.body))
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    operation: Operation,
    target: &str,
    response: &RawResponse,
) -> RequestResult<T> {
    serde_json::from_str(&response.body).map_err(|e| RequestError::decode(operation, target, e))
}

pub(crate) fn encode<T: Serialize>(
    operation: Operation,
    target: &str,
    value: &T,
) -> RequestResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RequestError::encode(operation, target, e))
}
