//! Lifecycle controller contract
//!
//! A [`ResourceLifecycle`] turns the single-shot resource operations into
//! the create/read/update/delete/import contract a host reconciles
//! against. Writes run under the retry executor and are retried only when
//! the remote rate-limits them; reads are single attempts.

use std::time::Duration;

use async_trait::async_trait;
use sgsync_common::resilience::{AttemptOutcome, RetryError, RetryExecutor, RetryableOperation};
use serde::Serialize;
use sgsync_domain::{
    ApiKeyState, DeleteOutcome, Operation, RequestError, RequestResult, SubuserState,
};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of a read or import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<S> {
    /// The entity exists; its freshly read state.
    Present(S),
    /// The entity no longer exists remotely. The host should drop it from
    /// tracked state rather than treat this as a failure.
    Gone,
}

impl<S> ReadOutcome<S> {
    /// `Some` for a present entity, `None` when it is gone.
    pub fn into_option(self) -> Option<S> {
        match self {
            Self::Present(state) => Some(state),
            Self::Gone => None,
        }
    }

    /// Whether the entity no longer exists remotely.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone)
    }
}

impl<S> From<Option<S>> for ReadOutcome<S> {
    fn from(value: Option<S>) -> Self {
        value.map_or(Self::Gone, Self::Present)
    }
}

/// Host-supplied budget and cancellation for one lifecycle call.
#[derive(Debug, Clone)]
pub struct OperationContext {
    timeout: Duration,
    cancellation: CancellationToken,
    started: Instant,
}

impl OperationContext {
    /// Context with a fresh, uncancelled token and a clock starting now.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, cancellation: CancellationToken::new(), started: Instant::now() }
    }

    /// Share an existing token, typically one the host cancels on shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Total budget given by the host.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token observed by every retried write.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left for the next retried write.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }
}

/// What is known about an entity that exists remotely although its create
/// call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CreatedState {
    /// A created subuser.
    Subuser(SubuserState),
    /// A created API key, with its one-time secret.
    ApiKey(ApiKeyState),
}

impl CreatedState {
    /// Identifier to read or import the entity by.
    pub fn id(&self) -> &str {
        match self {
            Self::Subuser(state) => &state.username,
            Self::ApiKey(state) => &state.api_key_id,
        }
    }
}

/// Failure of a lifecycle call.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A remote operation failed and was not retried.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Rate limiting outlasted the time budget.
    #[error(
        "timed out {operation} '{target}' after {elapsed:?} and {attempts} attempts{}",
        describe_last(.last_error.as_ref())
    )]
    TimedOut {
        operation: Operation,
        target: String,
        elapsed: Duration,
        attempts: u32,
        last_error: Option<RequestError>,
    },

    /// The host cancelled the call.
    #[error("cancelled {operation} '{target}' after {attempts} attempts")]
    Cancelled { operation: Operation, target: String, attempts: u32 },

    /// The entity was not found right after a successful write.
    #[error("{resource} '{id}' not found after write")]
    Gone { resource: &'static str, id: String },

    /// The desired state changes a field that cannot be updated in place.
    #[error("changing {field} of {resource} '{id}' requires replacing it")]
    ReplacementRequired { resource: &'static str, id: String, field: &'static str },

    /// The create request succeeded but a later step of the create did
    /// not. The host should record `state` instead of creating again.
    #[error("{resource} '{id}' was created but the create did not complete")]
    PartiallyCreated {
        resource: &'static str,
        id: String,
        state: Box<CreatedState>,
        #[source]
        source: Box<LifecycleError>,
    },
}

fn describe_last(last_error: Option<&RequestError>) -> String {
    last_error.map(|err| format!(", last error: {err}")).unwrap_or_default()
}

impl LifecycleError {
    pub(crate) fn from_retry(
        operation: Operation,
        target: &str,
        error: RetryError<RequestError>,
    ) -> Self {
        match error {
            RetryError::Fatal { source } => Self::Request(source),
            RetryError::TimedOut { elapsed, attempts, last_error } => Self::TimedOut {
                operation,
                target: target.to_string(),
                elapsed,
                attempts,
                last_error,
            },
            RetryError::Cancelled { attempts, .. } => {
                Self::Cancelled { operation, target: target.to_string(), attempts }
            }
        }
    }

    pub(crate) fn partially_created(
        resource: &'static str,
        state: CreatedState,
        source: LifecycleError,
    ) -> Self {
        Self::PartiallyCreated {
            resource,
            id: state.id().to_string(),
            state: Box::new(state),
            source: Box::new(source),
        }
    }

    /// The underlying request failure, if this error wraps one.
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            Self::Request(err) => Some(err),
            Self::TimedOut { last_error, .. } => last_error.as_ref(),
            Self::PartiallyCreated { source, .. } => source.request_error(),
            _ => None,
        }
    }
}

/// Create/read/update/delete/import contract for one entity type.
///
/// `read` and `import` take a string identifier whose meaning is fixed per
/// entity type (username for subusers, remote id for API keys).
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Declared fields supplied by the host.
    type Desired: Send + Sync;
    /// Everything tracked between runs, declared and system-assigned.
    type State: Send + Sync;

    /// Name used in errors and log fields.
    const RESOURCE: &'static str;

    /// Create the entity, apply deferred changes, and return fresh state.
    async fn create(
        &self,
        desired: &Self::Desired,
        ctx: &OperationContext,
    ) -> Result<Self::State, LifecycleError>;

    /// Read current state. `prior` supplies fields the remote never
    /// returns.
    async fn read(
        &self,
        id: &str,
        prior: Option<&Self::State>,
    ) -> Result<ReadOutcome<Self::State>, LifecycleError>;

    /// Apply the difference between `prior` and `desired`, then refresh.
    async fn update(
        &self,
        prior: &Self::State,
        desired: &Self::Desired,
        ctx: &OperationContext,
    ) -> Result<Self::State, LifecycleError>;

    /// Delete the entity. Deleting an absent entity succeeds.
    async fn delete(&self, id: &str, ctx: &OperationContext)
        -> Result<DeleteOutcome, LifecycleError>;

    /// Adopt an existing entity given only its identifier.
    async fn import(&self, id: &str) -> Result<ReadOutcome<Self::State>, LifecycleError> {
        self.read(id, None).await
    }
}

/// Only a rate-limited rejection is worth another attempt.
pub(crate) fn classify<T>(result: RequestResult<T>) -> AttemptOutcome<T, RequestError> {
    match result {
        Ok(value) => AttemptOutcome::Success(value),
        Err(err) if err.is_rate_limited() => AttemptOutcome::Retryable(err),
        Err(err) => AttemptOutcome::Fatal(err),
    }
}

/// Run one write under the executor with whatever budget the context has
/// left.
pub(crate) async fn run_write<O>(
    executor: &RetryExecutor,
    attempt: &O,
    operation: Operation,
    target: &str,
    ctx: &OperationContext,
) -> Result<O::Output, LifecycleError>
where
    O: RetryableOperation<Error = RequestError>,
{
    let outcome = executor.run(attempt, ctx.remaining(), ctx.cancellation()).await;
    debug!(
        operation = operation.label(),
        target,
        attempts = outcome.attempts,
        total_delay = ?outcome.total_delay,
        success = outcome.result.is_ok(),
        "Write finished"
    );
    outcome.result.map_err(|err| LifecycleError::from_retry(operation, target, err))
}

#[cfg(test)]
mod tests {
    use sgsync_domain::{Precondition, TransportError};

    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        let limited: RequestResult<()> =
            Err(RequestError::rejected(Operation::CreateSubuser, "alice", 429, "slow down"));
        assert!(matches!(classify(limited), AttemptOutcome::Retryable(_)));

        let rejected: RequestResult<()> =
            Err(RequestError::rejected(Operation::CreateSubuser, "alice", 400, "bad"));
        assert!(matches!(classify(rejected), AttemptOutcome::Fatal(_)));

        let transport: RequestResult<()> = Err(RequestError::transport(
            Operation::CreateSubuser,
            "alice",
            TransportError::timeout("timed out"),
        ));
        assert!(matches!(classify(transport), AttemptOutcome::Fatal(_)));

        let precondition: RequestResult<()> = Err(Precondition::NameRequired.into());
        assert!(matches!(classify(precondition), AttemptOutcome::Fatal(_)));
    }

    #[test]
    fn timed_out_message_names_last_error() {
        let err = LifecycleError::from_retry(
            Operation::DeleteApiKey,
            "k1",
            RetryError::TimedOut {
                elapsed: Duration::from_secs(5),
                attempts: 3,
                last_error: Some(RequestError::rejected(
                    Operation::DeleteApiKey,
                    "k1",
                    429,
                    "slow",
                )),
            },
        );
        let text = err.to_string();
        assert!(text.starts_with("timed out deleting API key 'k1'"));
        assert!(text.contains("3 attempts"));
        assert!(text.contains("status: 429"));
        assert_eq!(err.request_error().map(RequestError::status_code), Some(429));
    }

    #[test]
    fn fatal_retry_error_unwraps_to_request_error() {
        let source = RequestError::rejected(Operation::CreateApiKey, "deploy", 400, "bad scope");
        let err = LifecycleError::from_retry(
            Operation::CreateApiKey,
            "deploy",
            RetryError::Fatal { source: source.clone() },
        );
        assert!(matches!(err, LifecycleError::Request(ref inner) if *inner == source));
    }

    #[tokio::test(start_paused = true)]
    async fn context_budget_shrinks_with_time() {
        let ctx = OperationContext::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(ctx.remaining(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[test]
    fn read_outcome_from_option() {
        assert_eq!(ReadOutcome::from(Some(1)), ReadOutcome::Present(1));
        assert!(ReadOutcome::<i32>::from(None).is_gone());
    }
}
